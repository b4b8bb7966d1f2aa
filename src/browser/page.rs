use async_trait::async_trait;
use std::time::Duration;

use crate::crawler::error::CrawlError;

/// Everything the crawl pipeline needs from an open browser page.
///
/// Selectors are CSS. Methods that look for "visible" elements only
/// consider elements the browser reports as displayed.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate and wait for the document to load
    async fn goto(&self, url: &str) -> Result<(), CrawlError>;

    /// URL after redirects
    async fn current_url(&self) -> Result<String, CrawlError>;

    /// Snapshot of the rendered DOM
    async fn html(&self) -> Result<String, CrawlError>;

    /// Number of elements matching `css`
    async fn count(&self, css: &str) -> Result<usize, CrawlError>;

    /// Whether any element matching `css` is displayed
    async fn is_visible(&self, css: &str) -> Result<bool, CrawlError>;

    /// Attribute of the first displayed element matching `css`
    async fn visible_attr(&self, css: &str, attr: &str) -> Result<Option<String>, CrawlError>;

    /// Click the first displayed element matching `css`; `false` when none is
    async fn click_first_visible(&self, css: &str) -> Result<bool, CrawlError>;

    async fn scroll_by(&self, pixels: i64) -> Result<(), CrawlError>;

    async fn scroll_to_bottom(&self) -> Result<(), CrawlError>;

    /// Send an Escape keypress to the focused element
    async fn press_escape(&self) -> Result<(), CrawlError>;

    /// Wait until no requests are in flight, up to `timeout`.
    ///
    /// Returns whether the page actually went idle.
    async fn wait_for_network_idle(&self, timeout: Duration) -> Result<bool, CrawlError>;

    /// End the session
    async fn close(&self) -> Result<(), CrawlError>;
}

/// Opens one page per worker
#[async_trait]
pub trait PageLauncher: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn PageDriver>, CrawlError>;
}
