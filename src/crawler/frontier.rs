use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use url::Url;

/// URLs already turned into a task (or rejected by dedup) during this run.
///
/// Check-and-insert happens under one lock, so two workers can never both
/// claim the same URL.
#[derive(Debug, Default)]
pub struct SeenUrlSet {
    urls: Mutex<HashSet<String>>,
}

impl SeenUrlSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, HashSet<String>> {
        // Only plain insertions happen under the lock, so a poisoned set is still consistent
        self.urls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a URL, returning `false` if it was already present
    pub fn insert(&self, url: &str) -> bool {
        let inserted = self.guard().insert(normalize_url(url));
        if !inserted {
            debug!("Skipping already seen URL: {}", url);
        }
        inserted
    }

    pub fn contains(&self, url: &str) -> bool {
        self.guard().contains(&normalize_url(url))
    }

    /// Give a URL back, used when a claimed URL could not be enqueued
    pub fn release(&self, url: &str) {
        self.guard().remove(&normalize_url(url));
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }
}

/// Normalize a URL to avoid duplicates due to minor differences
pub fn normalize_url(url: &str) -> String {
    let mut normalized = match Url::parse(url) {
        Ok(url) => url,
        Err(_) => return url.to_string(), // Can't normalize, return as is
    };

    // Remove fragments (anchors)
    normalized.set_fragment(None);

    // Remove trailing slash except on the root path
    let path = normalized.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        normalized.set_path(path.trim_end_matches('/'));
    }

    // Drop tracking parameters and sort the rest
    if normalized.query().is_some() {
        let mut params: Vec<(String, String)> = normalized
            .query_pairs()
            .filter(|(k, _)| !k.starts_with("utm_"))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            normalized.set_query(None);
        } else {
            normalized.query_pairs_mut().clear().extend_pairs(params.iter());
        }
    }

    normalized.to_string()
}

/// Resolve a possibly relative `href` against the page it was found on
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("javascript:") || href.starts_with('#') {
        return None;
    }

    let resolved = match Url::parse(href) {
        Ok(absolute) => absolute,
        Err(_) => Url::parse(base).ok()?.join(href).ok()?,
    };

    match resolved.scheme() {
        "http" | "https" => Some(normalize_url(resolved.as_str())),
        _ => None,
    }
}

/// The set of hosts a crawl is allowed to follow links into
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainScope {
    domains: Vec<String>,
}

impl DomainScope {
    /// Use the configured domains, or the hosts of the seeds when none are configured
    pub fn new(configured: &[String], seeds: &[String]) -> Self {
        let mut domains: Vec<String> = if configured.is_empty() {
            seeds
                .iter()
                .filter_map(|seed| Url::parse(seed).ok())
                .filter_map(|url| url.host_str().map(|h| h.trim_start_matches("www.").to_lowercase()))
                .collect()
        } else {
            configured.iter().map(|d| d.to_lowercase()).collect()
        };
        domains.sort();
        domains.dedup();
        Self { domains }
    }

    pub fn contains(&self, url: &str) -> bool {
        let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_lowercase)) {
            Some(host) => host,
            None => return false,
        };

        self.domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
    }
}
