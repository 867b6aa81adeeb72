use std::path::PathBuf;

use anyhow::Context;
use tracing::{info, warn};

use profilecrawl::batch::{self, CancelFlag};
use profilecrawl::core::config::Config;
use profilecrawl::output::{self, CsvSink};
use profilecrawl::pacing::RunMode;
use profilecrawl::server;
use profilecrawl::session::{login, SessionStore};

const DEFAULT_INPUT: &str = "profile_url.txt";
const DEFAULT_OUTPUT: &str = "linkedin_profiles_data.csv";

fn arg_value(args: &[String], name: &str) -> Option<String> {
    let mut iter = args.iter();
    while let Some(a) = iter.next() {
        if a == name {
            if let Some(v) = iter.next() {
                return Some(v.clone());
            }
        } else if let Some(rest) = a.strip_prefix(&format!("{name}=")) {
            return Some(rest.to_string());
        }
    }
    None
}

fn print_usage() {
    println!("profilecrawl - LinkedIn profile scraper");
    println!();
    println!("USAGE:");
    println!("  profilecrawl login");
    println!("      Open a visible browser, sign in, and save the session.");
    println!("      Reads LINKEDIN_EMAIL/LINKEDIN_PASSWORD to auto-fill the form.");
    println!();
    println!("  profilecrawl [--input <file>] [--urls <list>] [--output <file>]");
    println!("      Scrape every profile URL in order using the saved session.");
    println!();
    println!("OPTIONS:");
    println!("  --input <file>    URL list, comma/newline separated (default: {DEFAULT_INPUT})");
    println!("  --urls <list>     inline comma-separated URLs, overrides --input");
    println!("  --output <file>   .csv appends rows as profiles finish; .json writes");
    println!("                    the whole batch at the end (default: {DEFAULT_OUTPUT})");
}

async fn load_urls(args: &[String]) -> anyhow::Result<Vec<String>> {
    if let Some(list) = arg_value(args, "--urls") {
        return Ok(batch::parse_url_list(&list));
    }
    let path = arg_value(args, "--input").unwrap_or_else(|| DEFAULT_INPUT.to_string());
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("could not read URL list '{}'", path))?;
    Ok(batch::parse_url_list(&raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let config = Config::from_env();
    let store = SessionStore::new(config.state_file.clone());

    if args.iter().any(|a| a == "login") {
        login::run(&config, &store).await?;
        return Ok(());
    }

    let urls = load_urls(&args).await?;
    if urls.is_empty() {
        anyhow::bail!(
            "no profile URLs found. Put them in {} (comma or newline separated) or pass --urls.",
            DEFAULT_INPUT
        );
    }

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            server::shutdown_signal().await;
            info!("interrupt received; finishing the current profile then stopping");
            cancel.cancel();
        });
    }

    let output_path =
        PathBuf::from(arg_value(&args, "--output").unwrap_or_else(|| DEFAULT_OUTPUT.to_string()));
    let json_mode = output_path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let outcome = if json_mode {
        batch::run_batch(&config, &store, urls, RunMode::Cli, &cancel, |_| {}).await?
    } else {
        let mut sink = CsvSink::create(&output_path)?;
        batch::run_batch(&config, &store, urls, RunMode::Cli, &cancel, |row| {
            if let Err(e) = sink.append(row) {
                warn!("output: could not append row for {}: {}", row.url, e);
            }
        })
        .await?
    };

    if json_mode {
        output::write_json(&output_path, &outcome.profiles)?;
    }

    let failed = outcome.profiles.iter().filter(|p| p.is_failed()).count();
    if outcome.cancelled {
        warn!(
            "run cancelled early: {} profiles written to {}",
            outcome.profiles.len(),
            output_path.display()
        );
    } else {
        info!(
            "done: {} profiles ({} failed) written to {}",
            outcome.profiles.len(),
            failed,
            output_path.display()
        );
    }
    Ok(())
}
