//! Overlay dismissal, run on every page before anything is read from it.

use serde_json::json;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

use crate::browser::page::PageDriver;
use crate::crawler::error::CrawlError;
use crate::crawler::product::Gender;
use crate::sites::InterstitialRules;
use crate::utils::events::EventLog;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Progress of the handler on one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterstitialState {
    Unchecked,
    Scanning,
    /// An overlay was shown and is gone now
    Dismissed,
    /// Nothing was blocking the page
    NotFound,
    /// An overlay survived every step; extraction proceeds anyway
    Persisting,
}

/// Clears cookie, region and preference dialogs before extraction
#[derive(Debug, Clone)]
pub struct InterstitialHandler {
    rules: InterstitialRules,
}

impl InterstitialHandler {
    pub fn new(rules: InterstitialRules) -> Self {
        Self { rules }
    }

    fn step_budget(&self) -> Duration {
        Duration::from_millis(self.rules.step_timeout_ms)
    }

    /// Run one page interaction within the step budget; failures and
    /// timeouts both count as "did not happen"
    async fn step<T: Default>(&self, what: &str, action: impl Future<Output = Result<T, CrawlError>>) -> T {
        match timeout(self.step_budget(), action).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                debug!("Interstitial step '{}' failed: {}", what, e);
                T::default()
            }
            Err(_) => {
                debug!("Interstitial step '{}' timed out", what);
                T::default()
            }
        }
    }

    async fn any_visible(&self, page: &dyn PageDriver, selectors: &[&str]) -> bool {
        for css in selectors {
            if self.step(css, page.is_visible(css)).await {
                return true;
            }
        }
        false
    }

    /// Poll until none of `selectors` is visible, bounded by one step budget
    async fn wait_hidden(&self, page: &dyn PageDriver, selectors: &[&str]) -> bool {
        let deadline = Instant::now() + self.step_budget();
        loop {
            if !self.any_visible(page, selectors).await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    fn overlay_markers(&self) -> Vec<&str> {
        let mut markers: Vec<&str> = self.rules.overlays.iter().map(String::as_str).collect();
        for dialog in &self.rules.preference_dialogs {
            if !markers.contains(&dialog.overlay.as_str()) {
                markers.push(dialog.overlay.as_str());
            }
        }
        markers
    }

    /// Dismiss whatever blocks the page. Never fails: a persistent overlay
    /// is logged and the caller goes on extracting.
    pub async fn clear(&self, page: &dyn PageDriver, gender: Option<Gender>, log: &EventLog) -> InterstitialState {
        let mut state = InterstitialState::Unchecked;
        debug!("Interstitial state: {:?}", state);

        let settle = Duration::from_millis(self.rules.settle_timeout_ms);
        let idle = matches!(timeout(settle, page.wait_for_network_idle(settle)).await, Ok(Ok(true)));
        if !idle {
            debug!("Page did not go idle within {:?}", settle);
        }

        state = InterstitialState::Scanning;
        debug!("Interstitial state: {:?}", state);

        let markers = self.overlay_markers();
        let overlay_seen = self.any_visible(page, &markers).await;

        let mut closed_any = false;
        for css in &self.rules.close {
            if self.step(css, page.click_first_visible(css)).await {
                debug!("Clicked close control {}", css);
                closed_any = true;
                if !self.wait_hidden(page, &[css.as_str()]).await {
                    debug!("Close control {} is still visible after clicking", css);
                }
            }
        }

        if !closed_any {
            self.step("escape", page.press_escape()).await;
        }

        for dialog in &self.rules.preference_dialogs {
            if !self.any_visible(page, &[dialog.overlay.as_str()]).await {
                continue;
            }
            let choice = match gender {
                Some(Gender::Women) => dialog.women.as_deref().or(dialog.fallback.as_deref()),
                Some(Gender::Men) => dialog.men.as_deref().or(dialog.fallback.as_deref()),
                None => dialog.fallback.as_deref(),
            };
            if let Some(css) = choice {
                if self.step(css, page.click_first_visible(css)).await {
                    debug!("Answered preference dialog with {}", css);
                    closed_any = true;
                }
            }
        }

        state = if !self.wait_hidden(page, &markers).await {
            let url = self.step("current url", page.current_url()).await;
            log.warn(
                "Overlay still visible, extracting anyway",
                json!({ "url": url, "overlays": markers }),
            );
            InterstitialState::Persisting
        } else if overlay_seen || closed_any {
            InterstitialState::Dismissed
        } else {
            InterstitialState::NotFound
        };

        debug!("Interstitial state: {:?}", state);
        state
    }
}
