//! Sequential profile pipeline.
//!
//! One browser, one page, one profile at a time. Profiles are visited in
//! input order and every input URL gets exactly one result row in that
//! order; a URL that fails still occupies its slot. Cancellation is
//! cooperative and lands on the gap between profiles, so the profile in
//! flight always runs to completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, PageDriver};
use crate::core::config::Config;
use crate::core::error::ScrapeError;
use crate::core::types::{BatchOutcome, ProfileRequest, ProfileResult};
use crate::extract;
use crate::pacing::{Pacing, RunMode};
use crate::session::SessionStore;

/// Cooperative stop signal checked between profiles.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Split a raw URL list on newlines and commas. Blank entries vanish, order
/// is preserved, duplicates are kept: one input URL is one result row.
pub fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(['\n', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn to_requests(urls: Vec<String>) -> Vec<ProfileRequest> {
    urls.into_iter()
        .enumerate()
        .map(|(index, url)| ProfileRequest { index, url })
        .collect()
}

/// End-to-end batch: load the saved session, launch the browser, walk the
/// URL list, close the browser whatever happened in between. Fatal errors
/// (no session, no browser) surface before any profile is visited.
pub async fn run_batch<F>(
    config: &Config,
    store: &SessionStore,
    urls: Vec<String>,
    mode: RunMode,
    cancel: &CancelFlag,
    on_result: F,
) -> Result<BatchOutcome, ScrapeError>
where
    F: FnMut(&ProfileResult),
{
    let state = store.load()?;
    let session = BrowserSession::open(&state, config).await?;
    let pacing = Pacing::from_config(config);
    let requests = to_requests(urls);

    let outcome = run_profiles(session.driver(), &pacing, &requests, mode, cancel, on_result).await;
    session.close().await;
    Ok(outcome)
}

/// Walk the request list against an already-open page.
///
/// `on_result` fires once per finished profile, before the inter-profile
/// delay, so sinks can persist rows while the batch is still running.
pub async fn run_profiles<D, F>(
    driver: &D,
    pacing: &Pacing,
    requests: &[ProfileRequest],
    mode: RunMode,
    cancel: &CancelFlag,
    mut on_result: F,
) -> BatchOutcome
where
    D: PageDriver + ?Sized,
    F: FnMut(&ProfileResult),
{
    let started = Instant::now();
    let total = requests.len();
    info!("🌐 batch: scraping {} profiles", total);

    let mut profiles = Vec::with_capacity(total);
    let mut cancelled = false;

    for request in requests {
        if cancel.is_cancelled() {
            cancelled = true;
            info!(
                "🛑 batch: cancelled after {} of {} profiles",
                profiles.len(),
                total
            );
            break;
        }

        let n = request.index + 1;
        info!("batch: [{}/{}] visiting {}", n, total, request.url);
        let result = scrape_profile(driver, pacing, &request.url).await;
        if let Some(err) = &result.error {
            warn!("batch: [{}/{}] {} failed: {}", n, total, request.url, err);
        }
        on_result(&result);
        profiles.push(result);

        if profiles.len() < total && !cancel.is_cancelled() {
            pacing.between_profiles(mode).await;
        }
    }

    let failed = profiles.iter().filter(|p| p.is_failed()).count();
    info!(
        "✅ batch: finished {}/{} profiles ({} failed) in {:.1}s",
        profiles.len(),
        total,
        failed,
        started.elapsed().as_secs_f64()
    );
    BatchOutcome {
        profiles,
        cancelled,
    }
}

/// Visit one profile and read both surfaces. Only a page that never became
/// readable produces a failed row; everything past that point degrades
/// field by field inside the extractors.
pub async fn scrape_profile<D: PageDriver + ?Sized>(
    driver: &D,
    pacing: &Pacing,
    url: &str,
) -> ProfileResult {
    debug!("profile: navigating to {}", url);
    if let Err(e) = driver.navigate(url).await {
        return ProfileResult::failed(url, e.to_string());
    }
    debug!("profile: settling {}", url);
    if let Err(e) = pacing.settle(driver).await {
        return ProfileResult::failed(url, e.to_string());
    }

    let mut result = ProfileResult::new(url);
    debug!("profile: reading biography on {}", url);
    result.about = extract::extract_biography(driver).await;
    debug!("profile: reading contact info on {}", url);
    result.contact_details = extract::extract_contact_info(driver).await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newlines_and_commas() {
        let raw = "https://a.example/in/one\nhttps://a.example/in/two, https://a.example/in/three\r\n\n";
        assert_eq!(
            parse_url_list(raw),
            vec![
                "https://a.example/in/one",
                "https://a.example/in/two",
                "https://a.example/in/three",
            ]
        );
    }

    #[test]
    fn keeps_duplicates_and_order() {
        let raw = "u1,u2,u1";
        assert_eq!(parse_url_list(raw), vec!["u1", "u2", "u1"]);
        let requests = to_requests(parse_url_list(raw));
        assert_eq!(requests[2].index, 2);
        assert_eq!(requests[2].url, "u1");
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let other = flag.clone();
        assert!(!other.is_cancelled());
        flag.cancel();
        assert!(other.is_cancelled());
    }
}
