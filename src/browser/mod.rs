//! Browser session lifecycle.
//!
//! One [`BrowserSession`] owns one browser process and one page for the
//! whole batch. The saved session cookies are injected before the first
//! navigation so the initial request already carries the login; per-origin
//! localStorage is seeded lazily by the driver after navigation. The CDP
//! event handler runs on its own task from launch until [`BrowserSession::close`],
//! which must be reached on every exit path or a browser process leaks.

pub mod driver;
pub mod stealth;

pub use driver::{CdpDriver, Locator, Lookup, PageDriver};

use chromiumoxide::cdp::browser_protocol::network::{CookieParam, SetCookiesParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::error::ScrapeError;
use crate::session::SessionState;

pub struct BrowserSession {
    browser: Browser,
    page: Page,
    driver: CdpDriver,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    /// Launch one stealth browser seeded with the saved session. Any failure
    /// here is fatal for the batch; nothing downstream can run without an
    /// authenticated session.
    pub async fn open(state: &SessionState, config: &Config) -> Result<Self, ScrapeError> {
        Self::launch(Some(state), config, config.headless).await
    }

    /// Launch a visible browser with no saved state, for the interactive
    /// login flow.
    pub async fn open_for_login(config: &Config) -> Result<Self, ScrapeError> {
        Self::launch(None, config, false).await
    }

    async fn launch(
        state: Option<&SessionState>,
        config: &Config,
        headless: bool,
    ) -> Result<Self, ScrapeError> {
        let exe = stealth::find_chrome_executable().ok_or_else(|| {
            ScrapeError::LaunchFailed(
                "no browser found. Install Chrome or Chromium, or set CHROME_EXECUTABLE".into(),
            )
        })?;
        info!("🚀 browser: launching {} (headless: {})", exe, headless);

        let browser_config = stealth::build_browser_config(&exe, config, headless)
            .map_err(|e| ScrapeError::LaunchFailed(e.to_string()))?;
        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::LaunchFailed(format!("{exe}: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("browser: CDP handler event error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                browser.close().await.ok();
                handler_task.abort();
                return Err(ScrapeError::LaunchFailed(format!(
                    "failed to open page: {e}"
                )));
            }
        };

        if let Err(e) = Self::prepare(&page, state, config).await {
            drop(page);
            browser.close().await.ok();
            handler_task.abort();
            return Err(e);
        }

        let origins = state.map(|s| s.origins.clone()).unwrap_or_default();
        let driver = CdpDriver::new(page.clone(), config.nav_timeout, origins);

        Ok(BrowserSession {
            browser,
            page,
            driver,
            handler_task,
        })
    }

    /// Stealth script registration plus cookie restore, before the first
    /// real navigation.
    async fn prepare(
        page: &Page,
        state: Option<&SessionState>,
        config: &Config,
    ) -> Result<(), ScrapeError> {
        if config.stealth {
            page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
                stealth::STEALTH_INIT_SCRIPT.to_string(),
            ))
            .await
            .map_err(|e| {
                ScrapeError::LaunchFailed(format!("failed to register stealth script: {e}"))
            })?;
        }
        if let Some(state) = state {
            restore_cookies(page, &state.cookies).await?;
        }
        Ok(())
    }

    pub fn driver(&self) -> &CdpDriver {
        &self.driver
    }

    /// Raw page handle. Only the login flow needs this; the pipeline goes
    /// through [`Self::driver`].
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// Release everything: page handles first, then the browser process,
    /// then the CDP event task.
    pub async fn close(self) {
        let BrowserSession {
            mut browser,
            page,
            driver,
            handler_task,
        } = self;
        drop(driver);
        drop(page);
        if let Err(e) = browser.close().await {
            warn!("browser: close error (non-fatal): {}", e);
        }
        handler_task.abort();
    }
}

/// Parse stored cookie JSON into CDP params and set them on the page.
///
/// Individual malformed cookies are skipped, but a state that yields zero
/// usable cookies means the session cannot possibly authenticate and the
/// batch must not start.
async fn restore_cookies(page: &Page, raw_cookies: &[serde_json::Value]) -> Result<(), ScrapeError> {
    if raw_cookies.is_empty() {
        return Err(ScrapeError::SessionRestore(
            "saved session contains no cookies".into(),
        ));
    }

    let params: Vec<CookieParam> = raw_cookies
        .iter()
        .filter_map(|v| serde_json::from_value::<CookieParam>(v.clone()).ok())
        .collect();

    if params.is_empty() {
        return Err(ScrapeError::SessionRestore(
            "no stored cookie could be parsed into a CDP cookie".into(),
        ));
    }
    let dropped = raw_cookies.len() - params.len();
    if dropped > 0 {
        warn!("browser: skipped {} malformed stored cookies", dropped);
    }

    let count = params.len();
    page.execute(SetCookiesParams::new(params))
        .await
        .map_err(|e| ScrapeError::SessionRestore(e.to_string()))?;
    info!("browser: restored {} session cookies", count);
    Ok(())
}
