//! Interactive login flow.
//!
//! Opens a visible browser on the login page, auto-fills credentials when
//! `LINKEDIN_EMAIL` / `LINKEDIN_PASSWORD` are set, then leaves the window
//! alone for a fixed grace period so the user can finish any verification
//! checkpoint by hand. Whatever cookies and localStorage exist at the end
//! of the wait become the saved session.

use chromiumoxide::Page;
use tracing::{info, warn};

use super::{OriginState, SessionState, SessionStore};
use crate::browser::{BrowserSession, PageDriver};
use crate::core::config::Config;
use crate::core::error::ScrapeError;

/// Cookie LinkedIn sets once a sign-in fully completes.
const AUTH_COOKIE: &str = "li_at";

const STORAGE_SNAPSHOT_JS: &str = r#"
(() => {
    try {
        const entries = [];
        for (let i = 0; i < localStorage.length; i++) {
            const name = localStorage.key(i);
            entries.push({ name: name, value: localStorage.getItem(name) });
        }
        return JSON.stringify({ origin: location.origin, localStorage: entries });
    } catch (e) {
        return JSON.stringify({ origin: location.origin, localStorage: [] });
    }
})()
"#;

/// Run the whole flow and persist the captured session through `store`.
pub async fn run(config: &Config, store: &SessionStore) -> Result<(), ScrapeError> {
    let session = BrowserSession::open_for_login(config).await?;
    let result = capture(&session, config, store).await;
    session.close().await;
    result
}

async fn capture(
    session: &BrowserSession,
    config: &Config,
    store: &SessionStore,
) -> Result<(), ScrapeError> {
    session.driver().navigate(&config.login_url).await?;
    let page = session.page();

    match Config::credentials() {
        Some((email, password)) => {
            info!("login: filling credentials for {}", email);
            if let Err(e) = fill_credentials(page, &email, &password).await {
                warn!("login: could not auto-fill the form ({}); sign in manually", e);
            }
        }
        None => {
            info!("login: no LINKEDIN_EMAIL/LINKEDIN_PASSWORD set; sign in manually");
        }
    }

    let wait = config.login_checkpoint_wait;
    info!(
        "login: waiting {}s for sign-in and any verification checkpoint to finish",
        wait.as_secs()
    );
    tokio::time::sleep(wait).await;

    let cookies = page
        .get_cookies()
        .await
        .map_err(|e| ScrapeError::LoginCapture(format!("could not read cookies: {e}")))?;
    if cookies.is_empty() {
        return Err(ScrapeError::LoginCapture(
            "no cookies present after the wait; sign-in did not complete".into(),
        ));
    }
    if !cookies.iter().any(|c| c.name == AUTH_COOKIE) {
        warn!(
            "login: no '{}' cookie captured; the saved session may not be signed in",
            AUTH_COOKIE
        );
    }

    // localStorage is optional enrichment; a failed snapshot is not worth
    // aborting a capture that already has cookies.
    let origins: Vec<OriginState> = page
        .evaluate(STORAGE_SNAPSHOT_JS)
        .await
        .ok()
        .and_then(|v| v.into_value::<String>().ok())
        .and_then(|s| serde_json::from_str::<OriginState>(&s).ok())
        .into_iter()
        .filter(|o| !o.local_storage.is_empty())
        .collect();

    let cookie_values: Vec<serde_json::Value> = cookies
        .iter()
        .filter_map(|c| serde_json::to_value(c).ok())
        .collect();
    let state = SessionState::new(cookie_values, origins);
    store.save(&state)?;
    info!(
        "login: saved {} cookies and {} storage origins to {}",
        state.cookies.len(),
        state.origins.len(),
        store.path().display()
    );
    Ok(())
}

/// Best effort form fill. LinkedIn's login form has been stable for years,
/// but when the selectors miss (already signed in, A/B layout) the manual
/// wait still covers the flow.
async fn fill_credentials(page: &Page, email: &str, password: &str) -> Result<(), ScrapeError> {
    let script = |e: chromiumoxide::error::CdpError| ScrapeError::Script(e.to_string());

    let user = page.find_element("input#username").await.map_err(script)?;
    user.click().await.map_err(script)?;
    user.type_str(email).await.map_err(script)?;

    let pass = page.find_element("input#password").await.map_err(script)?;
    pass.click().await.map_err(script)?;
    pass.type_str(password).await.map_err(script)?;

    page.find_element("button[type=submit]")
        .await
        .map_err(script)?
        .click()
        .await
        .map_err(script)?;
    Ok(())
}
