use rand::{thread_rng, Rng};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::browser::page::PageDriver;
use crate::cli::config::BrowserBehavior;
use crate::crawler::error::CrawlError;

/// Draw from an inclusive range, tolerating `min >= max`
fn jitter<T>(range: (T, T)) -> T
where
    T: PartialOrd + Copy + rand::distributions::uniform::SampleUniform,
{
    let (min, max) = range;
    if max <= min {
        min
    } else {
        thread_rng().gen_range(min..=max)
    }
}

/// Paces page interactions the way a person would
#[derive(Debug, Clone)]
pub struct BehaviorSimulator {
    config: BrowserBehavior,
}

impl BehaviorSimulator {
    pub fn new(config: BrowserBehavior) -> Self {
        Self { config }
    }

    /// Scroll down by a jittered distance, then pause
    pub async fn scroll_step(&self, page: &dyn PageDriver) -> Result<i64, CrawlError> {
        let distance = jitter(self.config.scroll_distance);
        page.scroll_by(distance).await?;
        debug!("Scrolled {} pixels", distance);

        self.pause(self.config.scroll_pause_ms).await;
        Ok(distance)
    }

    /// Jump to the bottom of the page, then pause
    pub async fn scroll_to_end(&self, page: &dyn PageDriver) -> Result<(), CrawlError> {
        page.scroll_to_bottom().await?;
        self.pause(self.config.scroll_pause_ms).await;
        Ok(())
    }

    /// Click the first visible match after a reaction delay
    pub async fn click(&self, page: &dyn PageDriver, css: &str) -> Result<bool, CrawlError> {
        self.pause(self.config.click_delay_ms).await;
        let clicked = page.click_first_visible(css).await?;
        if clicked {
            debug!("Clicked {}", css);
        }
        Ok(clicked)
    }

    async fn pause(&self, range_ms: (u64, u64)) {
        let pause_ms = jitter(range_ms);
        if pause_ms > 0 {
            sleep(Duration::from_millis(pause_ms)).await;
        }
    }
}
