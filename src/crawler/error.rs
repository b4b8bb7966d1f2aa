use std::time::Duration;
use thiserror::Error;

/// Failures the crawl pipeline distinguishes between
#[derive(Debug, Error)]
pub enum CrawlError {
    /// Page navigation failed; retried like any transient task failure
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    /// A task ran past its wall-clock budget
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The browser session misbehaved mid-task (detached element, dead session)
    #[error("browser error: {0}")]
    Browser(String),

    /// Invalid configuration; fatal before any task runs
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A browser session could not be started; fatal before any task runs
    #[error("failed to launch browser session: {0}")]
    SessionLaunch(String),
}

impl CrawlError {
    /// Whether this error aborts the whole run rather than a single task
    pub fn is_fatal(&self) -> bool {
        matches!(self, CrawlError::Config(_) | CrawlError::SessionLaunch(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(CrawlError::Config("no seeds".into()).is_fatal());
        assert!(CrawlError::SessionLaunch("refused".into()).is_fatal());
        assert!(!CrawlError::Timeout(Duration::from_secs(1)).is_fatal());
        assert!(!CrawlError::Navigation { url: "u".into(), message: "m".into() }.is_fatal());
    }
}
