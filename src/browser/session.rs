use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thirtyfour::extensions::cdp::ChromeDevTools;
use thirtyfour::prelude::*;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, warn};

use crate::browser::gate::{GateDecision, ResourceGate};
use crate::browser::page::{PageDriver, PageLauncher};
use crate::cli::config::BrowserSettings;
use crate::crawler::error::CrawlError;

const NETWORK_IDLE_SCRIPT: &str = r#"
    return {
        ready: document.readyState === 'complete',
        resources: performance.getEntriesByType('resource').length
    };
"#;

fn browser_error(err: WebDriverError) -> CrawlError {
    CrawlError::Browser(err.to_string())
}

#[derive(Debug, serde::Deserialize)]
struct NetworkState {
    ready: bool,
    resources: u64,
}

/// One Chrome page driven over WebDriver
pub struct BrowserSession {
    /// WebDriver instance
    driver: WebDriver,

    /// Also checked before navigating, so a blocked domain is never opened as a page
    gate: ResourceGate,

    closed: AtomicBool,
}

impl BrowserSession {
    /// Start a session and apply the resource gate to it
    pub async fn start(config: &BrowserSettings, gate: &ResourceGate, headless: bool) -> Result<Self, CrawlError> {
        let launch_error = |e: WebDriverError| CrawlError::SessionLaunch(e.to_string());

        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_arg(&format!("--user-agent={}", config.user_agent)).map_err(launch_error)?;
        caps.add_chrome_arg(&format!("--window-size={},{}", config.viewport.width, config.viewport.height))
            .map_err(launch_error)?;
        if headless {
            caps.set_headless().map_err(launch_error)?;
        }
        caps.add_chrome_arg("--disable-blink-features=AutomationControlled").map_err(launch_error)?;
        caps.add_chrome_arg("--disable-dev-shm-usage").map_err(launch_error)?;

        let driver = WebDriver::new(&config.webdriver_url, caps).await.map_err(|e| {
            CrawlError::SessionLaunch(format!("cannot reach WebDriver at {}: {}", config.webdriver_url, e))
        })?;

        driver
            .set_page_load_timeout(Duration::from_secs(config.page_load_timeout_secs))
            .await
            .map_err(launch_error)?;

        let session = Self { driver, gate: gate.clone(), closed: AtomicBool::new(false) };
        session.apply_gate().await;

        debug!("Browser session started (headless: {})", headless);
        Ok(session)
    }

    /// Block requests through DevTools; unsupported browsers just load everything
    async fn apply_gate(&self) {
        if self.gate.is_empty() {
            return;
        }

        let patterns = self.gate.blocked_url_patterns();
        let dev_tools = ChromeDevTools::new(self.driver.handle.clone());
        let applied = match dev_tools.execute_cdp("Network.enable").await {
            Ok(_) => {
                dev_tools
                    .execute_cdp_with_params("Network.setBlockedURLs", json!({ "urls": &patterns }))
                    .await
            }
            Err(e) => Err(e),
        };

        match applied {
            Ok(_) => debug!("Resource gate active with {} patterns", patterns.len()),
            Err(e) => warn!("Resource gate not applied, browser rejected DevTools command: {}", e),
        }
    }

    async fn displayed(&self, css: &str) -> Result<Vec<WebElement>, CrawlError> {
        let elements = self.driver.find_all(By::Css(css)).await.map_err(browser_error)?;
        let mut visible = Vec::new();
        for element in elements {
            // Elements detached between lookup and check count as hidden
            if element.is_displayed().await.unwrap_or(false) {
                visible.push(element);
            }
        }
        Ok(visible)
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    async fn goto(&self, url: &str) -> Result<(), CrawlError> {
        if self.gate.decide_url(url) == GateDecision::Deny {
            return Err(CrawlError::Navigation {
                url: url.to_string(),
                message: "blocked by the resource gate".to_string(),
            });
        }

        debug!("Navigating to: {}", url);
        self.driver.goto(url).await.map_err(|e| CrawlError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    async fn current_url(&self) -> Result<String, CrawlError> {
        let url = self.driver.current_url().await.map_err(browser_error)?;
        Ok(url.to_string())
    }

    async fn html(&self) -> Result<String, CrawlError> {
        self.driver.source().await.map_err(browser_error)
    }

    async fn count(&self, css: &str) -> Result<usize, CrawlError> {
        let elements = self.driver.find_all(By::Css(css)).await.map_err(browser_error)?;
        Ok(elements.len())
    }

    async fn is_visible(&self, css: &str) -> Result<bool, CrawlError> {
        Ok(!self.displayed(css).await?.is_empty())
    }

    async fn visible_attr(&self, css: &str, attr: &str) -> Result<Option<String>, CrawlError> {
        for element in self.displayed(css).await? {
            if let Some(value) = element.attr(attr).await.map_err(browser_error)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    async fn click_first_visible(&self, css: &str) -> Result<bool, CrawlError> {
        for element in self.displayed(css).await? {
            if element.click().await.is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn scroll_by(&self, pixels: i64) -> Result<(), CrawlError> {
        let script = format!("window.scrollBy({{ top: {}, left: 0, behavior: 'smooth' }});", pixels);
        self.driver.execute(&script, Vec::new()).await.map_err(browser_error)?;
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), CrawlError> {
        self.driver
            .execute("window.scrollTo(0, document.body.scrollHeight);", Vec::new())
            .await
            .map_err(browser_error)?;
        Ok(())
    }

    async fn press_escape(&self) -> Result<(), CrawlError> {
        // A real key press, so native dialogs and trust-checking handlers react to it
        self.driver
            .action_chain()
            .send_keys(Key::Escape.to_string())
            .perform()
            .await
            .map_err(browser_error)
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<bool, CrawlError> {
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;

        while Instant::now() < deadline {
            let ret = self.driver.execute(NETWORK_IDLE_SCRIPT, Vec::new()).await.map_err(browser_error)?;
            let state: NetworkState = ret.convert().map_err(browser_error)?;

            // Idle once the document is complete and no new resource showed up since the last poll
            if state.ready && last_count == Some(state.resources) {
                return Ok(true);
            }
            last_count = Some(state.resources);
            sleep(Duration::from_millis(250)).await;
        }

        Ok(false)
    }

    async fn close(&self) -> Result<(), CrawlError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.driver.clone().quit().await.map_err(browser_error)?;
        debug!("Browser session closed");
        Ok(())
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let driver = self.driver.clone();
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = driver.quit().await {
                    error!("Error closing browser session during drop: {}", e);
                }
            });
        }
    }
}

/// Launches Chrome sessions against the configured WebDriver server
pub struct WebDriverLauncher {
    config: BrowserSettings,
    gate: ResourceGate,
}

impl WebDriverLauncher {
    pub fn new(config: BrowserSettings, gate: ResourceGate) -> Self {
        Self { config, gate }
    }
}

#[async_trait]
impl PageLauncher for WebDriverLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn PageDriver>, CrawlError> {
        let session = BrowserSession::start(&self.config, &self.gate, headless).await?;
        Ok(Box::new(session))
    }
}
