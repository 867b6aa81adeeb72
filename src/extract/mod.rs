//! Field extraction from a settled profile page.
//!
//! Two surfaces are read per profile: the About section on the page body
//! and the contact-info modal behind the "Contact info" link. Every field
//! resolves independently; a field that is missing, hidden or broken
//! degrades to a sentinel or an omission and never takes the rest of the
//! profile down with it.

pub mod text;

use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::browser::{Locator, PageDriver};
use crate::core::error::ScrapeError;
use crate::core::types::{Biography, ContactField, ContactMap};

const ABOUT_HEADING: &str = "About";
const SHOW_MORE_SELECTOR: &str = "button.inline-show-more-text__button";
const CONTACT_TRIGGER_TEXT: &str = "Contact info";
const CONTACT_DIALOG_TITLE: &str = "Contact info";
const CONTACT_REGION_SELECTOR: &str = "section.pv-contact-info__contact-type";

const SHOW_MORE_PAUSE: Duration = Duration::from_millis(500);
const DIALOG_WAIT: Duration = Duration::from_secs(8);
const REGION_WAIT: Duration = Duration::from_secs(5);
const REGION_FALLBACK_PAUSE: Duration = Duration::from_secs(2);
const DISMISS_WAIT: Duration = Duration::from_secs(5);

/// Why a single field produced no value. `Absent` and `Hidden` are distinct
/// so the logs can tell "not on this profile" from "on the page but not
/// rendered", even though both end up omitted from output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Degraded {
    Absent,
    Hidden,
    Fault(String),
}

impl fmt::Display for Degraded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Degraded::Absent => write!(f, "not found"),
            Degraded::Hidden => write!(f, "present but not visible"),
            Degraded::Fault(e) => write!(f, "lookup failed: {e}"),
        }
    }
}

fn about_section() -> Locator {
    Locator::HeadingSection {
        heading: ABOUT_HEADING,
    }
}

fn about_show_more() -> Locator {
    Locator::SectionControl {
        heading: ABOUT_HEADING,
        selector: SHOW_MORE_SELECTOR,
    }
}

fn contact_trigger() -> Locator {
    Locator::TextTrigger {
        tag: "a",
        text: CONTACT_TRIGGER_TEXT,
    }
}

fn contact_dialog() -> Locator {
    Locator::Dialog {
        title: CONTACT_DIALOG_TITLE,
    }
}

fn contact_region() -> Locator {
    Locator::DialogRegion {
        title: CONTACT_DIALOG_TITLE,
        selector: CONTACT_REGION_SELECTOR,
    }
}

fn contact_label(field: ContactField) -> Locator {
    Locator::LabelSibling {
        title: CONTACT_DIALOG_TITLE,
        label: field.label(),
    }
}

/// Read the About section. Never fails: a profile without the section (or
/// with it collapsed out of view) reads as [`Biography::NotFound`], and any
/// driver error reads as [`Biography::Failed`].
pub async fn extract_biography<D: PageDriver + ?Sized>(driver: &D) -> Biography {
    match biography_inner(driver).await {
        Ok(bio) => bio,
        Err(e) => {
            warn!("extract: biography read failed: {}", e);
            Biography::Failed
        }
    }
}

async fn biography_inner<D: PageDriver + ?Sized>(driver: &D) -> Result<Biography, ScrapeError> {
    let section = about_section();
    let seen = driver.lookup(&section).await?;
    if !seen.present {
        debug!("extract: profile has no About section");
        return Ok(Biography::NotFound);
    }
    if !seen.visible {
        debug!("extract: About section present but not rendered");
        return Ok(Biography::NotFound);
    }

    // Expand truncated text first so the section read sees all of it.
    if driver.click(&about_show_more()).await? {
        debug!("extract: expanded the About section");
        sleep(SHOW_MORE_PAUSE).await;
    }

    let seen = driver.lookup(&section).await?;
    let raw = seen.text.unwrap_or_default();
    let stripped = text::strip_see_more(text::strip_heading_echo(&raw, ABOUT_HEADING));
    Ok(Biography::Text(stripped.trim().to_string()))
}

/// Open the contact-info modal and read every known label out of it.
///
/// Missing trigger, missing dialog and missing labels all shrink the map
/// rather than erroring. If the flow breaks partway the fields gathered so
/// far are kept and the modal gets a best-effort dismissal, so the page is
/// never handed back with a dialog covering it.
pub async fn extract_contact_info<D: PageDriver + ?Sized>(driver: &D) -> ContactMap {
    let mut contact = ContactMap::new();
    if let Err(e) = contact_inner(driver, &mut contact).await {
        warn!(
            "extract: contact info flow broke partway ({}); keeping {} fields",
            e,
            contact.len()
        );
        driver.dismiss().await.ok();
    }
    contact
}

async fn contact_inner<D: PageDriver + ?Sized>(
    driver: &D,
    contact: &mut ContactMap,
) -> Result<(), ScrapeError> {
    if !driver.click(&contact_trigger()).await? {
        debug!("extract: profile has no contact info link");
        return Ok(());
    }

    if !driver.wait_visible(&contact_dialog(), DIALOG_WAIT).await? {
        warn!("extract: contact dialog never appeared; skipping contact fields");
        // The trigger was clicked, so the dialog can still turn up late.
        driver.dismiss().await.ok();
        return Ok(());
    }

    if !driver.wait_visible(&contact_region(), REGION_WAIT).await? {
        // Some profiles render the dialog shell well before its sections.
        debug!("extract: contact sections slow to render; reading after a pause");
        sleep(REGION_FALLBACK_PAUSE).await;
    }

    for field in ContactField::ALL {
        match field_value(driver, &contact_label(field)).await {
            Ok(value) => {
                debug!("extract: {} = {}", field.label(), value);
                contact.insert(field, value);
            }
            Err(Degraded::Fault(e)) => {
                warn!("extract: {} lookup failed ({}); skipping", field.label(), e);
            }
            Err(reason) => {
                debug!("extract: {} {}", field.label(), reason);
            }
        }
    }

    driver.dismiss().await?;
    if !driver.wait_hidden(&contact_dialog(), DISMISS_WAIT).await? {
        warn!("extract: contact dialog still open after dismissal");
    }
    Ok(())
}

/// Resolve one labelled field to its normalized value.
async fn field_value<D: PageDriver + ?Sized>(
    driver: &D,
    locator: &Locator,
) -> Result<String, Degraded> {
    let seen = driver
        .lookup(locator)
        .await
        .map_err(|e| Degraded::Fault(e.to_string()))?;
    if !seen.present {
        return Err(Degraded::Absent);
    }
    if !seen.visible {
        return Err(Degraded::Hidden);
    }
    match seen.text.as_deref().map(text::collapse_whitespace) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Degraded::Absent),
    }
}
