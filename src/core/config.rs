use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Config: env-var driven settings with code defaults
// ---------------------------------------------------------------------------

pub const ENV_STATE_FILE: &str = "PROFILECRAWL_STATE_FILE";
pub const ENV_LOGIN_URL: &str = "PROFILECRAWL_LOGIN_URL";
pub const ENV_HEADLESS: &str = "PROFILECRAWL_HEADLESS";
pub const ENV_PROXY: &str = "PROFILECRAWL_PROXY";
pub const ENV_STEALTH: &str = "PROFILECRAWL_STEALTH";
pub const ENV_NAV_TIMEOUT_MS: &str = "PROFILECRAWL_NAV_TIMEOUT_MS";
pub const ENV_IDLE_TIMEOUT_MS: &str = "PROFILECRAWL_IDLE_TIMEOUT_MS";
pub const ENV_READ_DELAY_MIN_MS: &str = "PROFILECRAWL_READ_DELAY_MIN_MS";
pub const ENV_READ_DELAY_MAX_MS: &str = "PROFILECRAWL_READ_DELAY_MAX_MS";
pub const ENV_PROFILE_DELAY_MIN_SECS: &str = "PROFILECRAWL_PROFILE_DELAY_MIN_SECS";
pub const ENV_PROFILE_DELAY_MAX_SECS: &str = "PROFILECRAWL_PROFILE_DELAY_MAX_SECS";
pub const ENV_SERVICE_DELAY_MIN_SECS: &str = "PROFILECRAWL_SERVICE_DELAY_MIN_SECS";
pub const ENV_SERVICE_DELAY_MAX_SECS: &str = "PROFILECRAWL_SERVICE_DELAY_MAX_SECS";
pub const ENV_LOGIN_WAIT_SECS: &str = "PROFILECRAWL_LOGIN_WAIT_SECS";
pub const ENV_MAX_SESSIONS: &str = "PROFILECRAWL_MAX_SESSIONS";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";
pub const ENV_EMAIL: &str = "LINKEDIN_EMAIL";
pub const ENV_PASSWORD: &str = "LINKEDIN_PASSWORD";

/// Runtime settings for both binaries. Everything comes from the process
/// environment with code defaults; there is no config file.
#[derive(Debug, Clone)]
pub struct Config {
    /// Where the saved login session lives. Created by the login flow,
    /// required by every batch run.
    pub state_file: PathBuf,
    pub login_url: String,
    pub headless: bool,
    pub stealth: bool,
    /// Optional `--proxy-server` value passed straight through to the
    /// browser. No rotation.
    pub proxy: Option<String>,
    pub nav_timeout: Duration,
    /// Upper bound on the post-navigation network-idle wait. Expiry is not
    /// an error; extraction proceeds on whatever DOM is there.
    pub idle_timeout: Duration,
    /// Simulated reading time after a page settles, in milliseconds.
    pub read_delay_ms: (u64, u64),
    /// Delay between profiles in batch (CLI) mode, in seconds.
    pub profile_delay_secs: (u64, u64),
    /// Delay between profiles when driven through the HTTP API, in seconds.
    pub service_delay_secs: (u64, u64),
    /// How long the login window stays open after submit so a human can
    /// clear a checkpoint or CAPTCHA.
    pub login_checkpoint_wait: Duration,
    /// Cap on simultaneously open browser sessions in the server.
    pub max_concurrent_sessions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            state_file: PathBuf::from("linkedin_state.json"),
            login_url: "https://www.linkedin.com/login".to_string(),
            headless: true,
            stealth: true,
            proxy: None,
            nav_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(8),
            read_delay_ms: (3_000, 5_000),
            profile_delay_secs: (10, 20),
            service_delay_secs: (5, 10),
            login_checkpoint_wait: Duration::from_secs(15),
            max_concurrent_sessions: 2,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let d = Config::default();
        Config {
            state_file: env_string(ENV_STATE_FILE)
                .map(PathBuf::from)
                .unwrap_or(d.state_file),
            login_url: env_string(ENV_LOGIN_URL).unwrap_or(d.login_url),
            headless: env_flag(ENV_HEADLESS, d.headless),
            stealth: env_flag(ENV_STEALTH, d.stealth),
            proxy: env_string(ENV_PROXY),
            nav_timeout: Duration::from_millis(env_u64(
                ENV_NAV_TIMEOUT_MS,
                d.nav_timeout.as_millis() as u64,
            )),
            idle_timeout: Duration::from_millis(env_u64(
                ENV_IDLE_TIMEOUT_MS,
                d.idle_timeout.as_millis() as u64,
            )),
            read_delay_ms: (
                env_u64(ENV_READ_DELAY_MIN_MS, d.read_delay_ms.0),
                env_u64(ENV_READ_DELAY_MAX_MS, d.read_delay_ms.1),
            ),
            profile_delay_secs: (
                env_u64(ENV_PROFILE_DELAY_MIN_SECS, d.profile_delay_secs.0),
                env_u64(ENV_PROFILE_DELAY_MAX_SECS, d.profile_delay_secs.1),
            ),
            service_delay_secs: (
                env_u64(ENV_SERVICE_DELAY_MIN_SECS, d.service_delay_secs.0),
                env_u64(ENV_SERVICE_DELAY_MAX_SECS, d.service_delay_secs.1),
            ),
            login_checkpoint_wait: Duration::from_secs(env_u64(
                ENV_LOGIN_WAIT_SECS,
                d.login_checkpoint_wait.as_secs(),
            )),
            max_concurrent_sessions: env_u64(ENV_MAX_SESSIONS, d.max_concurrent_sessions as u64)
                .max(1) as usize,
        }
    }

    /// Login credentials from the environment. Never read from argv so they
    /// stay out of shell history and process listings.
    pub fn credentials() -> Option<(String, String)> {
        Some((env_string(ENV_EMAIL)?, env_string(ENV_PASSWORD)?))
    }
}

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `browser::stealth::find_chrome_executable()`).
/// Only returns a value when `CHROME_EXECUTABLE` points at an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = std::env::var(ENV_CHROME_EXECUTABLE).ok()?;
    let p = p.trim();
    if p.is_empty() {
        return None;
    }
    if Path::new(p).exists() {
        Some(p.to_string())
    } else {
        None
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    let Ok(v) = std::env::var(key) else {
        return default;
    };
    let v = v.trim().to_ascii_lowercase();
    if v.is_empty() {
        return default;
    }
    !matches!(v.as_str(), "0" | "false" | "no" | "off" | "disabled")
}
