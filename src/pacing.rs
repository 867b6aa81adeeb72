//! Human pacing between page actions.
//!
//! Profile pages are read the way a person would read them: wait for the
//! network to quiet down, linger, skim down the page twice, come back to
//! the top. Between profiles the crawler idles for a randomized stretch,
//! longer for CLI batches than for service requests. All of it is tuned by
//! [`Config`] and none of it is skippable; the pacing is what keeps a
//! logged-in session alive over hundreds of profiles.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, info};

use crate::browser::PageDriver;
use crate::core::config::Config;
use crate::core::error::ScrapeError;

const SCROLL_STEP_PX: i64 = 800;
const SCROLL_PAUSE: Duration = Duration::from_secs(1);

/// How a run was started, which decides the inter-profile delay range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Cli,
    Service,
}

#[derive(Debug, Clone)]
pub struct Pacing {
    idle_timeout: Duration,
    read_delay_ms: (u64, u64),
    profile_delay_secs: (u64, u64),
    service_delay_secs: (u64, u64),
}

impl Pacing {
    pub fn from_config(config: &Config) -> Self {
        Pacing {
            idle_timeout: config.idle_timeout,
            read_delay_ms: config.read_delay_ms,
            profile_delay_secs: config.profile_delay_secs,
            service_delay_secs: config.service_delay_secs,
        }
    }

    /// Settle a freshly loaded profile page before anything reads from it.
    ///
    /// The idle wait is advisory; heavy pages keep trickling requests long
    /// after the content is readable, so running out the timeout is normal.
    pub async fn settle<D: PageDriver + ?Sized>(&self, driver: &D) -> Result<(), ScrapeError> {
        if !driver.wait_network_idle(self.idle_timeout).await {
            debug!("pacing: network never went idle; continuing anyway");
        }

        let read_ms = sample(self.read_delay_ms);
        debug!("pacing: dwelling {}ms before reading", read_ms);
        sleep(Duration::from_millis(read_ms)).await;

        for _ in 0..2 {
            driver.scroll_by(SCROLL_STEP_PX).await?;
            sleep(SCROLL_PAUSE).await;
        }
        driver.scroll_to_top().await?;
        sleep(SCROLL_PAUSE).await;
        Ok(())
    }

    /// Idle before moving on to the next profile.
    pub async fn between_profiles(&self, mode: RunMode) {
        let range = match mode {
            RunMode::Cli => self.profile_delay_secs,
            RunMode::Service => self.service_delay_secs,
        };
        let secs = sample(range);
        info!("pacing: waiting {}s before the next profile", secs);
        sleep(Duration::from_secs(secs)).await;
    }
}

// Sampled eagerly so no RNG handle lives across an await.
fn sample((lo, hi): (u64, u64)) -> u64 {
    use rand::Rng;
    rand::rng().random_range(lo..=hi.max(lo))
}
