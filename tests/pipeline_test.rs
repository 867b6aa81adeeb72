//! Batch pipeline scenarios against a scripted page driver.
//!
//! Every test runs the real orchestrator, pacing and extractors; only the
//! browser is replaced by an in-memory driver playing back a per-URL
//! script. Paused tokio time makes the human-pacing delays instant.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use profilecrawl::batch::{self, CancelFlag};
use profilecrawl::browser::{Locator, Lookup, PageDriver};
use profilecrawl::core::config::Config;
use profilecrawl::core::error::ScrapeError;
use profilecrawl::core::types::{Biography, ContactField, ProfileRequest};
use profilecrawl::extract;
use profilecrawl::pacing::{Pacing, RunMode};
use profilecrawl::session::SessionStore;

#[derive(Clone)]
struct AboutScript {
    visible: bool,
    text: &'static str,
    /// `Some` adds a show-more control; clicking swaps the section text.
    expanded: Option<&'static str>,
}

#[derive(Clone, Default)]
struct ContactScript {
    dialog_appears: bool,
    region_appears: bool,
    /// A dialog that ignores the escape gesture.
    sticky: bool,
    /// (label, visible, text) triples the modal exposes.
    labels: Vec<(&'static str, bool, &'static str)>,
}

#[derive(Clone, Default)]
struct PageScript {
    nav_error: Option<&'static str>,
    /// Lookups on the About section error out, as a detached-node fault would.
    about_faulty: bool,
    about: Option<AboutScript>,
    contact: Option<ContactScript>,
}

#[derive(Default)]
struct DriverState {
    pages: HashMap<String, PageScript>,
    current: Option<PageScript>,
    expanded: bool,
    dialog_open: bool,
    navigations: Vec<String>,
    idle_waits: usize,
    scrolls: Vec<i64>,
    top_resets: usize,
    show_more_clicks: usize,
    trigger_clicks: usize,
    dismissals: usize,
}

struct FakeDriver(Mutex<DriverState>);

impl FakeDriver {
    fn with_pages(pages: Vec<(&str, PageScript)>) -> Self {
        let mut map = HashMap::new();
        for (url, page) in pages {
            map.insert(url.to_string(), page);
        }
        FakeDriver(Mutex::new(DriverState {
            pages: map,
            ..Default::default()
        }))
    }

    fn state(&self) -> std::sync::MutexGuard<'_, DriverState> {
        self.0.lock().unwrap()
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), ScrapeError> {
        let mut st = self.state();
        st.navigations.push(url.to_string());
        let page = st
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScrapeError::NavigationFailed(format!("unknown url {url}")))?;
        if let Some(msg) = page.nav_error {
            return Err(ScrapeError::NavigationFailed(msg.to_string()));
        }
        st.current = Some(page);
        st.expanded = false;
        st.dialog_open = false;
        Ok(())
    }

    async fn wait_network_idle(&self, _timeout: Duration) -> bool {
        self.state().idle_waits += 1;
        true
    }

    async fn scroll_by(&self, delta_px: i64) -> Result<(), ScrapeError> {
        self.state().scrolls.push(delta_px);
        Ok(())
    }

    async fn scroll_to_top(&self) -> Result<(), ScrapeError> {
        self.state().top_resets += 1;
        Ok(())
    }

    async fn lookup(&self, locator: &Locator) -> Result<Lookup, ScrapeError> {
        let st = self.state();
        let page = st
            .current
            .as_ref()
            .ok_or_else(|| ScrapeError::Script("no page loaded".into()))?;

        let hit = |present: bool, visible: bool, text: Option<String>| {
            Ok(Lookup {
                present,
                visible,
                text,
            })
        };

        match locator {
            Locator::HeadingSection { .. } | Locator::SectionControl { .. }
                if page.about_faulty =>
            {
                Err(ScrapeError::Script("node detached during read".into()))
            }
            Locator::HeadingSection { .. } => match &page.about {
                Some(a) => {
                    let text = if st.expanded {
                        a.expanded.unwrap_or(a.text)
                    } else {
                        a.text
                    };
                    hit(true, a.visible, Some(text.to_string()))
                }
                None => Ok(Lookup::default()),
            },
            Locator::SectionControl { .. } => match &page.about {
                Some(a) if a.expanded.is_some() && !st.expanded => hit(true, a.visible, None),
                _ => Ok(Lookup::default()),
            },
            Locator::TextTrigger { .. } => match &page.contact {
                Some(_) => hit(true, true, Some("Contact info".into())),
                None => Ok(Lookup::default()),
            },
            Locator::Dialog { .. } => hit(st.dialog_open, st.dialog_open, None),
            Locator::DialogRegion { .. } => {
                let region =
                    st.dialog_open && page.contact.as_ref().is_some_and(|c| c.region_appears);
                hit(region, region, None)
            }
            Locator::LabelSibling { label, .. } => {
                if !st.dialog_open {
                    return Ok(Lookup::default());
                }
                match page
                    .contact
                    .as_ref()
                    .and_then(|c| c.labels.iter().find(|(l, _, _)| l == label))
                {
                    Some((_, visible, text)) => hit(true, *visible, Some(text.to_string())),
                    None => Ok(Lookup::default()),
                }
            }
        }
    }

    async fn click(&self, locator: &Locator) -> Result<bool, ScrapeError> {
        let mut st = self.state();
        let page = st
            .current
            .clone()
            .ok_or_else(|| ScrapeError::Script("no page loaded".into()))?;
        match locator {
            Locator::SectionControl { .. } if page.about_faulty => {
                Err(ScrapeError::Script("node detached during read".into()))
            }
            Locator::SectionControl { .. } => {
                let clickable = page
                    .about
                    .as_ref()
                    .is_some_and(|a| a.visible && a.expanded.is_some());
                if clickable && !st.expanded {
                    st.expanded = true;
                    st.show_more_clicks += 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Locator::TextTrigger { .. } => match &page.contact {
                Some(c) => {
                    st.trigger_clicks += 1;
                    if c.dialog_appears {
                        st.dialog_open = true;
                    }
                    Ok(true)
                }
                None => Ok(false),
            },
            _ => Ok(false),
        }
    }

    async fn dismiss(&self) -> Result<(), ScrapeError> {
        let mut st = self.state();
        st.dismissals += 1;
        let sticky = st
            .current
            .as_ref()
            .and_then(|p| p.contact.as_ref())
            .is_some_and(|c| c.sticky);
        if !sticky {
            st.dialog_open = false;
        }
        Ok(())
    }
}

fn pacing() -> Pacing {
    Pacing::from_config(&Config::default())
}

fn requests(urls: &[&str]) -> Vec<ProfileRequest> {
    batch::to_requests(urls.iter().map(|u| u.to_string()).collect())
}

fn about(text: &'static str) -> PageScript {
    PageScript {
        about: Some(AboutScript {
            visible: true,
            text,
            expanded: None,
        }),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// batch ordering and isolation
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn navigation_failure_keeps_its_slot_and_batch_continues() {
    let bad = PageScript {
        nav_error: Some("net::ERR_TIMED_OUT"),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![
        ("https://site/a", about("About\nRust engineer in Oslo")),
        ("https://site/b", bad),
    ]);

    let outcome = batch::run_profiles(
        &driver,
        &pacing(),
        &requests(&["https://site/a", "https://site/b"]),
        RunMode::Cli,
        &CancelFlag::new(),
        |_| {},
    )
    .await;

    assert!(!outcome.cancelled);
    assert_eq!(outcome.profiles.len(), 2);

    let a = &outcome.profiles[0];
    assert_eq!(a.url, "https://site/a");
    assert_eq!(a.about, Biography::Text("Rust engineer in Oslo".into()));
    assert!(a.contact_details.is_empty());
    assert!(a.error.is_none());

    let b = &outcome.profiles[1];
    assert_eq!(b.url, "https://site/b");
    assert_eq!(b.about, Biography::NotFound);
    assert!(b.contact_details.is_empty());
    assert!(b.error.as_deref().unwrap().contains("ERR_TIMED_OUT"));
}

#[tokio::test(start_paused = true)]
async fn results_preserve_input_order_with_duplicates() {
    let driver = FakeDriver::with_pages(vec![
        ("https://site/a", about("About A")),
        ("https://site/b", about("About B")),
    ]);
    let urls = ["https://site/b", "https://site/a", "https://site/b"];

    let outcome = batch::run_profiles(
        &driver,
        &pacing(),
        &requests(&urls),
        RunMode::Cli,
        &CancelFlag::new(),
        |_| {},
    )
    .await;

    let got: Vec<&str> = outcome.profiles.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(got, urls);
    assert_eq!(driver.state().navigations, urls);
}

#[tokio::test(start_paused = true)]
async fn rerunning_a_batch_produces_identical_rows() {
    // One page that mutates under the reader (show-more, dialog open/close)
    // and one that never loads; a second pass over unchanged pages has to
    // come back with the exact same rows.
    let rich = PageScript {
        about: Some(AboutScript {
            visible: true,
            text: "About\nShort version ...see more",
            expanded: Some("About\nShort version plus the folded remainder"),
        }),
        contact: Some(ContactScript {
            dialog_appears: true,
            region_appears: true,
            labels: vec![
                ("Phone", true, "+1 555 0100"),
                ("Website", false, "https://hidden.example"),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    let bad = PageScript {
        nav_error: Some("net::ERR_TIMED_OUT"),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", rich), ("https://site/b", bad)]);
    let reqs = requests(&["https://site/a", "https://site/b"]);

    let first = batch::run_profiles(
        &driver,
        &pacing(),
        &reqs,
        RunMode::Cli,
        &CancelFlag::new(),
        |_| {},
    )
    .await;
    let second = batch::run_profiles(
        &driver,
        &pacing(),
        &reqs,
        RunMode::Cli,
        &CancelFlag::new(),
        |_| {},
    )
    .await;

    assert_eq!(first.profiles, second.profiles);
    assert_eq!(
        first.profiles[0].about,
        Biography::Text("Short version plus the folded remainder".into())
    );
    assert!(first.profiles[1].error.is_some());
    // Both passes really visited every page.
    assert_eq!(driver.state().navigations.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn cancel_between_profiles_finishes_the_current_one() {
    let driver = FakeDriver::with_pages(vec![
        ("https://site/a", about("About A")),
        ("https://site/b", about("About B")),
        ("https://site/c", about("About C")),
    ]);
    let cancel = CancelFlag::new();
    let from_callback = cancel.clone();

    let outcome = batch::run_profiles(
        &driver,
        &pacing(),
        &requests(&["https://site/a", "https://site/b", "https://site/c"]),
        RunMode::Cli,
        &cancel,
        move |_| from_callback.cancel(),
    )
    .await;

    assert!(outcome.cancelled);
    assert_eq!(outcome.profiles.len(), 1);
    assert_eq!(outcome.profiles[0].about, Biography::Text("A".into()));
    assert_eq!(driver.state().navigations.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn settle_performs_the_reader_gestures_once_per_profile() {
    let driver = FakeDriver::with_pages(vec![("https://site/a", about("About A"))]);

    batch::run_profiles(
        &driver,
        &pacing(),
        &requests(&["https://site/a"]),
        RunMode::Cli,
        &CancelFlag::new(),
        |_| {},
    )
    .await;

    let st = driver.state();
    assert_eq!(st.idle_waits, 1);
    assert_eq!(st.scrolls, vec![800, 800]);
    assert_eq!(st.top_resets, 1);
}

#[tokio::test]
async fn missing_session_is_fatal_before_anything_runs() {
    let path = std::env::temp_dir().join(format!(
        "profilecrawl-pipeline-{}-missing.json",
        std::process::id()
    ));
    let store = SessionStore::new(path);
    let err = store.load().unwrap_err();
    assert!(matches!(err, ScrapeError::SessionMissing { .. }));
    assert!(err.is_fatal());
}

// ---------------------------------------------------------------------------
// biography extraction
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn absent_about_section_reads_not_found() {
    let driver = FakeDriver::with_pages(vec![("https://site/a", PageScript::default())]);
    tokio_test::assert_ok!(driver.navigate("https://site/a").await);

    assert_eq!(extract::extract_biography(&driver).await, Biography::NotFound);
    assert_eq!(driver.state().show_more_clicks, 0);
}

#[tokio::test(start_paused = true)]
async fn hidden_about_section_reads_not_found() {
    let page = PageScript {
        about: Some(AboutScript {
            visible: false,
            text: "About\nNever rendered",
            expanded: None,
        }),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", page)]);
    driver.navigate("https://site/a").await.unwrap();

    assert_eq!(extract::extract_biography(&driver).await, Biography::NotFound);
}

#[tokio::test(start_paused = true)]
async fn show_more_expands_before_reading() {
    let page = PageScript {
        about: Some(AboutScript {
            visible: true,
            text: "About\nShort version ...see more",
            expanded: Some("About\nShort version plus everything hidden behind the fold"),
        }),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", page)]);
    driver.navigate("https://site/a").await.unwrap();

    let bio = extract::extract_biography(&driver).await;
    assert_eq!(
        bio,
        Biography::Text("Short version plus everything hidden behind the fold".into())
    );
    assert_eq!(driver.state().show_more_clicks, 1);
}

#[tokio::test(start_paused = true)]
async fn faulty_about_reads_error_and_contact_still_runs() {
    let page = PageScript {
        about_faulty: true,
        contact: Some(ContactScript {
            dialog_appears: true,
            region_appears: true,
            labels: vec![("Phone", true, "+1 555 0100")],
            ..Default::default()
        }),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", page)]);

    let outcome = batch::run_profiles(
        &driver,
        &pacing(),
        &requests(&["https://site/a"]),
        RunMode::Cli,
        &CancelFlag::new(),
        |_| {},
    )
    .await;

    let p = &outcome.profiles[0];
    assert_eq!(p.about, Biography::Failed);
    assert!(p.error.is_none());
    assert_eq!(
        p.contact_details.get(&ContactField::Phone).unwrap(),
        "+1 555 0100"
    );
}

// ---------------------------------------------------------------------------
// contact extraction
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn missing_trigger_yields_empty_contact_map() {
    let driver = FakeDriver::with_pages(vec![("https://site/a", about("About A"))]);
    driver.navigate("https://site/a").await.unwrap();

    let contact = extract::extract_contact_info(&driver).await;
    assert!(contact.is_empty());
    assert_eq!(driver.state().trigger_clicks, 0);
    assert_eq!(driver.state().dismissals, 0);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_dialog_degrades_to_empty_map() {
    let page = PageScript {
        contact: Some(ContactScript {
            dialog_appears: false,
            ..Default::default()
        }),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", page)]);
    driver.navigate("https://site/a").await.unwrap();

    let contact = extract::extract_contact_info(&driver).await;
    assert!(contact.is_empty());
    assert_eq!(driver.state().trigger_clicks, 1);
    // The escape still fires in case the dialog turned up after the wait.
    assert_eq!(driver.state().dismissals, 1);
}

#[tokio::test(start_paused = true)]
async fn contact_values_are_whitespace_collapsed_and_hidden_or_empty_omitted() {
    let page = PageScript {
        contact: Some(ContactScript {
            dialog_appears: true,
            region_appears: true,
            labels: vec![
                ("Phone", true, "  +1 (555)\n  010-0100  "),
                ("Email", true, "ada@example.com"),
                ("Website", false, "https://hidden.example"),
                ("Twitter", true, "   "),
            ],
            ..Default::default()
        }),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", page)]);
    tokio_test::assert_ok!(driver.navigate("https://site/a").await);

    let contact = extract::extract_contact_info(&driver).await;
    assert_eq!(contact.len(), 2);
    assert_eq!(
        contact.get(&ContactField::Phone).unwrap(),
        "+1 (555) 010-0100"
    );
    assert_eq!(contact.get(&ContactField::Email).unwrap(), "ada@example.com");
    assert!(!contact.contains_key(&ContactField::Website));
    assert!(!contact.contains_key(&ContactField::Twitter));

    let st = driver.state();
    assert!(!st.dialog_open);
    assert_eq!(st.dismissals, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_region_falls_back_to_reading_after_a_pause() {
    let page = PageScript {
        contact: Some(ContactScript {
            dialog_appears: true,
            region_appears: false,
            labels: vec![("Email", true, "ada@example.com")],
            ..Default::default()
        }),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", page)]);
    driver.navigate("https://site/a").await.unwrap();

    let contact = extract::extract_contact_info(&driver).await;
    assert_eq!(contact.get(&ContactField::Email).unwrap(), "ada@example.com");
}

#[tokio::test(start_paused = true)]
async fn sticky_dialog_keeps_collected_fields() {
    let page = PageScript {
        contact: Some(ContactScript {
            dialog_appears: true,
            region_appears: true,
            sticky: true,
            labels: vec![("Phone", true, "+1 555 0100")],
        }),
        ..Default::default()
    };
    let driver = FakeDriver::with_pages(vec![("https://site/a", page)]);
    driver.navigate("https://site/a").await.unwrap();

    let contact = extract::extract_contact_info(&driver).await;
    assert_eq!(contact.get(&ContactField::Phone).unwrap(), "+1 555 0100");
    // The escape was attempted even though the dialog ignored it.
    assert!(driver.state().dismissals >= 1);
    assert!(driver.state().dialog_open);
}
