//! Launch-time stealth: executable discovery, browser flags, fingerprint
//! masking.
//!
//! Process-level defaults live here (flags, fixed user-agent, viewport);
//! the JS init script below is registered via
//! `Page.addScriptToEvaluateOnNewDocument` so it runs before any page code.
//! The pipeline deliberately uses one fixed user-agent and viewport for the
//! whole session: the site sees a stable fingerprint instead of a rotating
//! one that mismatches the stored login state.

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use std::path::Path;

use crate::core::config::{self, Config};

/// Chrome-on-Windows profile. Must stay in sync with the client-hints brands
/// in [`STEALTH_INIT_SCRIPT`].
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub const VIEWPORT_WIDTH: u32 = 1280;
pub const VIEWPORT_HEIGHT: u32 = 720;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH lookup through `which`
/// 3. OS-specific well-known install paths
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = config::chrome_executable_override() {
        return Some(p);
    }

    for name in [
        "google-chrome",
        "chromium",
        "chromium-browser",
        "chrome",
        "brave-browser",
        "brave",
    ] {
        if let Ok(p) = which::which(name) {
            return Some(p.to_string_lossy().to_string());
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/brave-browser",
            "/usr/local/bin/chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// True when a usable browser binary is present on this machine.
pub fn native_browser_available() -> bool {
    find_chrome_executable().is_some()
}

/// Build the launch config for one authenticated session.
///
/// `headless` is passed separately from `config` because the login flow
/// always wants a visible window while batch runs default to headless.
pub fn build_browser_config(exe: &str, config: &Config, headless: bool) -> Result<BrowserConfig> {
    let mut builder = BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--disable-crash-reporter")
        .arg("--disable-breakpad")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg(format!("--user-agent={}", USER_AGENT));

    if config.stealth {
        // Hides navigator.webdriver at the Blink level; the init script
        // covers the rest.
        builder = builder.arg("--disable-blink-features=AutomationControlled");
    }
    if let Some(proxy) = &config.proxy {
        builder = builder.arg(format!("--proxy-server={}", proxy));
    }
    if !headless {
        builder = builder.with_head();
    }

    builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

/// Injected before page load on every new document.
///
/// Covers the checks profile sites actually run against automated sessions:
/// `navigator.webdriver`, empty plugin/language lists, a missing
/// `chrome.runtime`, the notification-permission probe, leftover automation
/// markers and client-hint brands that disagree with the user-agent.
pub const STEALTH_INIT_SCRIPT: &str = r#"
(() => {
    const proto = Navigator.prototype;
    try {
        Object.defineProperty(proto, 'webdriver', { get: () => undefined, configurable: true });
    } catch (e) {}
    try { delete navigator.webdriver; } catch (e) {}
    try {
        Object.defineProperty(proto, 'languages', { get: () => ['en-US', 'en'], configurable: true });
    } catch (e) {}
    try {
        Object.defineProperty(proto, 'plugins', { get: () => [1, 2, 3], configurable: true });
    } catch (e) {}
})();

if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) {
    window.chrome.runtime = {
        connect: function () { return { onDisconnect: { addListener: function () {} } }; },
        sendMessage: function () {},
    };
}

const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}

delete window.__playwright;
delete window.__puppeteer;
delete window.__selenium;
delete window.callPhantom;
delete window._phantom;

if (navigator.userAgentData) {
    Object.defineProperty(navigator, 'userAgentData', {
        get: () => ({
            brands: [
                { brand: 'Chromium', version: '120' },
                { brand: 'Google Chrome', version: '120' },
                { brand: 'Not_A Brand', version: '8' }
            ],
            mobile: false,
            platform: 'Windows'
        })
    });
}
"#;
