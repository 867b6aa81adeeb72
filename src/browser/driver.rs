//! Page capability interface.
//!
//! Everything the extractor knows about page structure is expressed as a
//! [`Locator`]; everything it can do to a page goes through [`PageDriver`].
//! The orchestrator never touches CDP types directly, so the DOM coupling
//! stays in this module and the pipeline can run against a scripted driver
//! in tests.
//!
//! [`CdpDriver`] is the live implementation: one JS round trip per lookup
//! (presence, visibility and text in a single evaluate), CDP input events
//! for clicks and the Escape dismissal so the page sees trusted events
//! rather than synthetic `el.click()` calls.

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams, DispatchMouseEventType,
    MouseButton,
};
use chromiumoxide::Page;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::core::error::ScrapeError;
use crate::session::OriginState;

const LOOKUP_POLL: Duration = Duration::from_millis(250);
const IDLE_QUIET_MS: u64 = 1_200;

/// Lookup strategies for the page structures the extractor reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// The section enclosing an `<h2>` whose normalized text contains
    /// `heading`. Visibility is judged on the heading, text is read from
    /// the whole section.
    HeadingSection { heading: &'static str },
    /// A CSS-selected control inside that heading's section.
    SectionControl {
        heading: &'static str,
        selector: &'static str,
    },
    /// First `tag` element whose normalized text contains `text`.
    TextTrigger {
        tag: &'static str,
        text: &'static str,
    },
    /// A `role="dialog"` surface filtered by contained `title` text.
    Dialog { title: &'static str },
    /// A CSS-selected region inside that dialog.
    DialogRegion {
        title: &'static str,
        selector: &'static str,
    },
    /// The element immediately following a `<p>` whose normalized text
    /// equals `label` exactly, scoped inside the dialog.
    LabelSibling {
        title: &'static str,
        label: &'static str,
    },
}

/// What one lookup saw. `present` and `visible` are separate on purpose:
/// a hidden-but-present element is logged differently from a missing one
/// even though both end up omitted from results.
#[derive(Debug, Clone, Default)]
pub struct Lookup {
    pub present: bool,
    pub visible: bool,
    pub text: Option<String>,
}

impl Lookup {
    pub fn is_usable(&self) -> bool {
        self.present && self.visible
    }
}

/// Driver contract the pipeline runs against. The live implementation is
/// [`CdpDriver`]; tests substitute a scripted one.
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError>;

    /// Best-effort network-idle wait. Returns `false` when the timeout
    /// expired first; that is never an error.
    async fn wait_network_idle(&self, timeout: Duration) -> bool;

    async fn scroll_by(&self, delta_px: i64) -> Result<(), ScrapeError>;

    async fn scroll_to_top(&self) -> Result<(), ScrapeError>;

    /// One DOM lookup: presence, visibility and text in a single round trip.
    async fn lookup(&self, locator: &Locator) -> Result<Lookup, ScrapeError>;

    /// Click the located element when present and visible. `Ok(false)` means
    /// there was nothing clickable, which callers treat as data.
    async fn click(&self, locator: &Locator) -> Result<bool, ScrapeError>;

    /// Escape gesture for dismissing modal surfaces.
    async fn dismiss(&self) -> Result<(), ScrapeError>;

    async fn wait_visible(
        &self,
        locator: &Locator,
        timeout: Duration,
    ) -> Result<bool, ScrapeError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.lookup(locator).await?.is_usable() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(LOOKUP_POLL).await;
        }
    }

    async fn wait_hidden(&self, locator: &Locator, timeout: Duration) -> Result<bool, ScrapeError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.lookup(locator).await?.is_usable() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(LOOKUP_POLL).await;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// CDP implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Raw shape returned by the lookup script.
#[derive(Debug, Default, Deserialize)]
struct JsLookup {
    found: bool,
    visible: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
}

/// Live driver over one CDP page.
pub struct CdpDriver {
    page: Page,
    nav_timeout: Duration,
    /// Saved per-origin localStorage, seeded lazily after the first
    /// navigation to each matching origin.
    origins: Vec<OriginState>,
    seeded: Mutex<HashSet<String>>,
}

impl CdpDriver {
    pub fn new(page: Page, nav_timeout: Duration, origins: Vec<OriginState>) -> Self {
        CdpDriver {
            page,
            nav_timeout,
            origins,
            seeded: Mutex::new(HashSet::new()),
        }
    }

    async fn js_lookup(
        &self,
        locator: &Locator,
        prepare_click: bool,
    ) -> Result<JsLookup, ScrapeError> {
        let script = lookup_js(locator, prepare_click);
        let raw: String = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| ScrapeError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| ScrapeError::Script(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| ScrapeError::Script(e.to_string()))
    }

    /// Seed stored localStorage into the page once per origin. Best-effort:
    /// a page that blocks storage access never fails the navigation.
    async fn seed_local_storage(&self, url: &str) {
        let Some(origin) = page_origin(url) else {
            return;
        };
        let Some(stored) = self.origins.iter().find(|o| o.origin == origin) else {
            return;
        };
        if stored.local_storage.is_empty() {
            return;
        }

        let mut seeded = self.seeded.lock().await;
        if !seeded.insert(origin.clone()) {
            return;
        }
        drop(seeded);

        let sets: String = stored
            .local_storage
            .iter()
            .map(|e| {
                format!(
                    "localStorage.setItem({}, {});",
                    js_str(&e.name),
                    js_str(&e.value)
                )
            })
            .collect();
        let script = format!("(() => {{ try {{ {sets} }} catch (e) {{}} }})()");
        match self.page.evaluate(script).await {
            Ok(_) => debug!(
                "driver: seeded {} localStorage entries for {}",
                stored.local_storage.len(),
                origin
            ),
            Err(e) => warn!("driver: localStorage seeding failed for {}: {}", origin, e),
        }
    }

    async fn press_escape(&self) -> Result<(), ScrapeError> {
        for event_type in [DispatchKeyEventType::RawKeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(event_type)
                .key("Escape")
                .code("Escape")
                .windows_virtual_key_code(27)
                .native_virtual_key_code(27)
                .build()
                .map_err(ScrapeError::Script)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| ScrapeError::Script(e.to_string()))?;
        }
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> Result<(), ScrapeError> {
        // Sampled before any await: ThreadRng is not Send.
        let hold_ms: u64 = {
            use rand::Rng;
            let mut rng = rand::rng();
            rng.random_range(60..=140)
        };
        for (event_type, delay) in [
            (DispatchMouseEventType::MousePressed, hold_ms),
            (DispatchMouseEventType::MouseReleased, 0),
        ] {
            let params = DispatchMouseEventParams::builder()
                .r#type(event_type)
                .x(x)
                .y(y)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(ScrapeError::Script)?;
            self.page
                .execute(params)
                .await
                .map_err(|e| ScrapeError::Script(e.to_string()))?;
            if delay > 0 {
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        match tokio::time::timeout(self.nav_timeout, self.page.goto(url)).await {
            Err(_) => Err(ScrapeError::Timeout(format!("navigation to {url}"))),
            Ok(Err(e)) => Err(ScrapeError::NavigationFailed(e.to_string())),
            Ok(Ok(_)) => {
                self.seed_local_storage(url).await;
                Ok(())
            }
        }
    }

    /// Playwright-style networkidle heuristic: polls the resource-entry count
    /// every 250 ms and calls the page idle once `document.readyState` is
    /// complete and no new resources appeared for a quiet window.
    async fn wait_network_idle(&self, timeout: Duration) -> bool {
        let start = std::time::Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = std::time::Instant::now();

        loop {
            if start.elapsed() >= timeout {
                debug!(
                    "driver: network idle timed out after {}ms",
                    timeout.as_millis()
                );
                return false;
            }

            let count: u64 = self
                .page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_u64())
                .unwrap_or(0);

            let ready_complete: bool = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_str().map(|s| s == "complete"))
                .unwrap_or(false);

            if !ready_complete {
                stable_since = std::time::Instant::now();
                last_count = count;
            } else if count != last_count {
                last_count = count;
                stable_since = std::time::Instant::now();
            } else if stable_since.elapsed().as_millis() as u64 >= IDLE_QUIET_MS {
                debug!(
                    "driver: network idle after {}ms ({} resources)",
                    start.elapsed().as_millis(),
                    count
                );
                return true;
            }

            tokio::time::sleep(LOOKUP_POLL).await;
        }
    }

    async fn scroll_by(&self, delta_px: i64) -> Result<(), ScrapeError> {
        self.page
            .evaluate(format!(
                "window.scrollBy({{top: {delta_px}, behavior: 'smooth'}});"
            ))
            .await
            .map_err(|e| ScrapeError::Script(e.to_string()))?;
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<(), ScrapeError> {
        self.page
            .evaluate("window.scrollTo({top: 0, behavior: 'smooth'});")
            .await
            .map_err(|e| ScrapeError::Script(e.to_string()))?;
        Ok(())
    }

    async fn lookup(&self, locator: &Locator) -> Result<Lookup, ScrapeError> {
        let raw = self.js_lookup(locator, false).await?;
        Ok(Lookup {
            present: raw.found,
            visible: raw.visible,
            text: raw.text,
        })
    }

    async fn click(&self, locator: &Locator) -> Result<bool, ScrapeError> {
        // prepare_click scrolls the element into view before the rect is
        // measured so the input event lands inside the viewport.
        let raw = self.js_lookup(locator, true).await?;
        if !(raw.found && raw.visible) {
            return Ok(false);
        }
        self.click_at(raw.x, raw.y).await?;
        Ok(true)
    }

    async fn dismiss(&self) -> Result<(), ScrapeError> {
        self.press_escape().await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lookup script generation
// ─────────────────────────────────────────────────────────────────────────────

const LOOKUP_HELPERS: &str = r#"
const norm = (el) => ((el && el.textContent) || '').replace(/\s+/g, ' ').trim();
const bySection = (heading) => {
    const h = Array.from(document.querySelectorAll('h2')).find((el) => norm(el).includes(heading));
    return h ? [h.closest('section') || h.parentElement, h] : [null, null];
};
const byDialog = (title) =>
    Array.from(document.querySelectorAll('[role="dialog"]')).find((el) => norm(el).includes(title)) || null;
"#;

/// JSON-quoted JS string literal.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Build the single-round-trip lookup expression for `locator`.
///
/// The script returns `JSON.stringify({found, visible, text, x, y})`;
/// stringifying keeps the CDP return path a plain string regardless of what
/// the page does to built-in prototypes. The `pick` pair is `[target,
/// probe]`: text and coordinates come from the target, visibility from the
/// probe (they differ only for heading sections, which are judged by the
/// heading but read whole).
fn lookup_js(locator: &Locator, prepare_click: bool) -> String {
    let pick = match locator {
        Locator::HeadingSection { heading } => {
            format!("return bySection({});", js_str(heading))
        }
        Locator::SectionControl { heading, selector } => format!(
            "const sec = bySection({})[0];\n             const el = sec ? sec.querySelector({}) : null;\n             return [el, el];",
            js_str(heading),
            js_str(selector)
        ),
        Locator::TextTrigger { tag, text } => format!(
            "const el = Array.from(document.querySelectorAll({})).find((e) => norm(e).includes({})) || null;\n             return [el, el];",
            js_str(tag),
            js_str(text)
        ),
        Locator::Dialog { title } => format!(
            "const el = byDialog({});\n             return [el, el];",
            js_str(title)
        ),
        Locator::DialogRegion { title, selector } => format!(
            "const d = byDialog({});\n             const el = d ? d.querySelector({}) : null;\n             return [el, el];",
            js_str(title),
            js_str(selector)
        ),
        Locator::LabelSibling { title, label } => format!(
            "const d = byDialog({});\n             if (!d) return [null, null];\n             const p = Array.from(d.querySelectorAll('p')).find((e) => norm(e) === {});\n             const el = p ? p.nextElementSibling : null;\n             return [el, el];",
            js_str(title),
            js_str(label)
        ),
    };

    let prepare = if prepare_click {
        "if (el) { el.scrollIntoView({ block: 'center', behavior: 'instant' }); }"
    } else {
        ""
    };

    format!(
        r#"(() => {{
{LOOKUP_HELPERS}
    const pick = (() => {{ {pick} }})();
    const el = pick[0];
    const probe = pick[1] || el;
    {prepare}
    if (!el) {{
        return JSON.stringify({{ found: false, visible: false, text: null, x: 0, y: 0 }});
    }}
    const r = el.getBoundingClientRect();
    return JSON.stringify({{
        found: true,
        visible: !!probe && probe.getClientRects().length > 0,
        text: el.textContent,
        x: r.left + r.width / 2,
        y: r.top + r.height / 2
    }});
}})()"#
    )
}

fn page_origin(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    match parsed.origin() {
        url::Origin::Tuple(..) => Some(parsed.origin().ascii_serialization()),
        url::Origin::Opaque(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn js_str_escapes_quotes() {
        assert_eq!(js_str("Contact info"), "\"Contact info\"");
        assert_eq!(js_str("О'Брайен \"ru\""), "\"О'Брайен \\\"ru\\\"\"");
    }

    #[test]
    fn label_sibling_matches_exact_label() {
        let js = lookup_js(
            &Locator::LabelSibling {
                title: "Contact info",
                label: "Phone",
            },
            false,
        );
        assert!(js.contains("norm(e) === \"Phone\""));
        assert!(js.contains("byDialog(\"Contact info\")"));
        assert!(js.contains("nextElementSibling"));
    }

    #[test]
    fn dialog_title_match_collapses_whitespace() {
        // Titles render with arbitrary internal whitespace, so the dialog
        // filter has to compare against normalized text like every other
        // text match does.
        let js = lookup_js(
            &Locator::Dialog {
                title: "Contact info",
            },
            false,
        );
        assert!(js.contains("norm(el).includes(title)"));
    }

    #[test]
    fn click_lookup_scrolls_into_view() {
        let with_prep = lookup_js(
            &Locator::TextTrigger {
                tag: "a",
                text: "Contact info",
            },
            true,
        );
        let without = lookup_js(
            &Locator::TextTrigger {
                tag: "a",
                text: "Contact info",
            },
            false,
        );
        assert!(with_prep.contains("scrollIntoView"));
        assert!(!without.contains("scrollIntoView"));
    }

    #[test]
    fn page_origin_normalizes() {
        assert_eq!(
            page_origin("https://www.linkedin.com/in/someone/").as_deref(),
            Some("https://www.linkedin.com")
        );
        assert!(page_origin("not a url").is_none());
    }
}
