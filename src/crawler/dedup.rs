use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::crawler::frontier::normalize_url;
use crate::crawler::listing::Candidate;
use crate::utils::events::EventLog;

#[derive(Debug, Error)]
pub enum ExistenceCheckError {
    #[error("existence check request failed: {0}")]
    Transport(String),

    #[error("existence check returned HTTP {0}")]
    Status(u16),

    #[error("existence check response could not be decoded: {0}")]
    Decode(String),
}

/// Catalog lookup: which of these URLs are already stored for `source`
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExistenceCheck: Send + Sync {
    async fn existing(&self, urls: &[String], source: &str) -> Result<Vec<String>, ExistenceCheckError>;
}

#[derive(Serialize)]
struct BatchExistsRequest<'a> {
    urls: &'a [String],
    source: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchExistsResponse {
    #[serde(default)]
    existing_urls: Vec<String>,
}

/// Client for `POST {endpoint}/products/batch-exists`
#[derive(Debug, Clone)]
pub struct HttpExistenceCheck {
    client: Client,
    endpoint: String,
}

impl HttpExistenceCheck {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ExistenceCheckError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExistenceCheckError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ExistenceCheck for HttpExistenceCheck {
    async fn existing(&self, urls: &[String], source: &str) -> Result<Vec<String>, ExistenceCheckError> {
        let response = self
            .client
            .post(format!("{}/products/batch-exists", self.endpoint))
            .json(&BatchExistsRequest { urls, source })
            .send()
            .await
            .map_err(|e| ExistenceCheckError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExistenceCheckError::Status(status.as_u16()));
        }

        let body: BatchExistsResponse = response
            .json()
            .await
            .map_err(|e| ExistenceCheckError::Decode(e.to_string()))?;

        Ok(body.existing_urls)
    }
}

/// Result of filtering one listing page's candidates
#[derive(Debug, Default)]
pub struct DedupOutcome {
    /// Candidates unknown to the catalog
    pub fresh: Vec<Candidate>,

    /// URLs the catalog already has
    pub existing: Vec<String>,
}

/// Drops candidates the catalog already knows about
pub struct DedupGate {
    check: Option<Arc<dyn ExistenceCheck>>,
    source: String,
    batch_size: usize,
}

impl DedupGate {
    /// `check: None` lets every candidate through
    pub fn new(check: Option<Arc<dyn ExistenceCheck>>, source: &str, batch_size: usize) -> Self {
        if check.is_none() {
            debug!("No existence-check endpoint configured, deduplication is disabled");
        }
        Self {
            check,
            source: source.to_string(),
            batch_size: batch_size.max(1),
        }
    }

    /// Ask the catalog about `candidates` in batches.
    ///
    /// A failed batch is logged at ERROR and treated as having no existing
    /// URLs, so all of its candidates go through.
    pub async fn filter_new(&self, candidates: Vec<Candidate>, log: &EventLog) -> DedupOutcome {
        let Some(check) = &self.check else {
            return DedupOutcome { fresh: candidates, existing: Vec::new() };
        };

        let mut outcome = DedupOutcome::default();
        for batch in candidates.chunks(self.batch_size) {
            let urls: Vec<String> = batch.iter().map(|c| c.url.clone()).collect();

            let existing: HashSet<String> = match check.existing(&urls, &self.source).await {
                Ok(found) => found.iter().map(|url| normalize_url(url)).collect(),
                Err(e) => {
                    log.error(
                        "Existence check failed, treating batch as new",
                        json!({ "error": e.to_string(), "batch_size": urls.len(), "source": self.source }),
                    );
                    HashSet::new()
                }
            };

            for candidate in batch {
                if existing.contains(&normalize_url(&candidate.url)) {
                    outcome.existing.push(candidate.url.clone());
                } else {
                    outcome.fresh.push(candidate.clone());
                }
            }
        }

        debug!(
            "Dedup kept {} of {} candidates",
            outcome.fresh.len(),
            outcome.fresh.len() + outcome.existing.len()
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::product::PartialProduct;
    use crate::utils::events::{recording_log, EventLevel};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn candidates(n: usize) -> Vec<Candidate> {
        (0..n)
            .map(|i| Candidate {
                url: format!("https://shop.test/p/{}", i),
                partial: PartialProduct::default(),
            })
            .collect()
    }

    fn urls(list: &[Candidate]) -> Vec<&str> {
        list.iter().map(|c| c.url.as_str()).collect()
    }

    #[tokio::test]
    async fn test_existing_urls_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products/batch-exists"))
            .and(body_json(json!({
                "urls": ["https://shop.test/p/0", "https://shop.test/p/1", "https://shop.test/p/2"],
                "source": "atelier"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "existingUrls": ["https://shop.test/p/1"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let check = HttpExistenceCheck::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let gate = DedupGate::new(Some(Arc::new(check)), "atelier", 50);
        let (log, sink) = recording_log("exec");

        let outcome = gate.filter_new(candidates(3), &log).await;
        assert_eq!(urls(&outcome.fresh), vec!["https://shop.test/p/0", "https://shop.test/p/2"]);
        assert_eq!(outcome.existing, vec!["https://shop.test/p/1"]);
        assert!(sink.at_level(EventLevel::Error).is_empty());
    }

    #[tokio::test]
    async fn test_server_error_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/products/batch-exists"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let check = HttpExistenceCheck::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let gate = DedupGate::new(Some(Arc::new(check)), "atelier", 50);
        let (log, sink) = recording_log("exec");

        let outcome = gate.filter_new(candidates(4), &log).await;
        assert_eq!(outcome.fresh.len(), 4);
        assert!(outcome.existing.is_empty());

        let errors = sink.at_level(EventLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].context["error"].as_str().unwrap().contains("500"));
    }

    #[tokio::test]
    async fn test_malformed_response_fails_open() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;

        let check = HttpExistenceCheck::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let err = check.existing(&["https://shop.test/p/0".to_string()], "atelier").await.unwrap_err();
        assert!(matches!(err, ExistenceCheckError::Decode(_)));
    }

    #[tokio::test]
    async fn test_batches_fail_open_independently() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut mock = MockExistenceCheck::new();
        mock.expect_existing()
            .withf(|urls, source| urls.len() <= 2 && source.to_string() == "atelier")
            .times(3)
            .returning(move |urls, _| {
                match counter.fetch_add(1, Ordering::SeqCst) {
                    // Second batch hits an outage
                    1 => Err(ExistenceCheckError::Status(503)),
                    _ => Ok(urls.iter().take(1).cloned().collect()),
                }
            });

        let gate = DedupGate::new(Some(Arc::new(mock)), "atelier", 2);
        let (log, sink) = recording_log("exec");

        let outcome = gate.filter_new(candidates(5), &log).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.existing, vec!["https://shop.test/p/0", "https://shop.test/p/4"]);
        assert_eq!(
            urls(&outcome.fresh),
            vec!["https://shop.test/p/1", "https://shop.test/p/2", "https://shop.test/p/3"]
        );
        assert_eq!(sink.at_level(EventLevel::Error).len(), 1);
    }

    #[tokio::test]
    async fn test_existing_match_ignores_url_noise() {
        let mut mock = MockExistenceCheck::new();
        mock.expect_existing()
            .returning(|_, _| Ok(vec!["https://shop.test/p/0/?utm_source=feed".to_string()]));

        let gate = DedupGate::new(Some(Arc::new(mock)), "atelier", 10);
        let (log, _) = recording_log("exec");

        let outcome = gate.filter_new(candidates(2), &log).await;
        assert_eq!(urls(&outcome.fresh), vec!["https://shop.test/p/1"]);
    }

    #[tokio::test]
    async fn test_no_endpoint_lets_everything_through() {
        let gate = DedupGate::new(None, "atelier", 10);
        let (log, sink) = recording_log("exec");

        let outcome = gate.filter_new(candidates(3), &log).await;
        assert_eq!(outcome.fresh.len(), 3);
        assert!(sink.events().is_empty());
    }
}
