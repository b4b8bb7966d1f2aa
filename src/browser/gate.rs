use serde::{Deserialize, Serialize};
use url::Url;

/// Coarse content type of an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Other,
}

impl ResourceKind {
    const ALL: [ResourceKind; 6] = [
        ResourceKind::Document,
        ResourceKind::Script,
        ResourceKind::Stylesheet,
        ResourceKind::Image,
        ResourceKind::Font,
        ResourceKind::Media,
    ];

    /// Guess the kind of a request from its path extension
    pub fn classify(url: &str) -> Self {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => url.split(|c: char| c == '?' || c == '#').next().unwrap_or_default().to_lowercase(),
        };
        let extension = match path.rsplit_once('.') {
            Some((_, ext)) if !ext.contains('/') => ext,
            _ => return ResourceKind::Document,
        };

        Self::ALL
            .into_iter()
            .find(|kind| kind.extensions().contains(&extension))
            .unwrap_or(ResourceKind::Other)
    }

    /// Path extensions that identify the kind; classification and the
    /// DevTools patterns both read this table
    fn extensions(&self) -> &'static [&'static str] {
        match self {
            ResourceKind::Document => &["html", "htm", "php", "aspx"],
            ResourceKind::Script => &["js", "mjs"],
            ResourceKind::Stylesheet => &["css"],
            ResourceKind::Image => &["png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "bmp"],
            ResourceKind::Font => &["woff", "woff2", "ttf", "otf", "eot"],
            ResourceKind::Media => &["mp4", "webm", "mp3", "m4a", "ogg", "mov", "m3u8"],
            ResourceKind::Other => &[],
        }
    }
}

/// Outbound request rules for one site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateRules {
    /// Resource kinds that are never fetched
    #[serde(default)]
    pub blocked_kinds: Vec<ResourceKind>,

    /// Third-party domains (and their subdomains) that are never contacted
    #[serde(default)]
    pub blocked_domains: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny,
}

/// Allows or denies outbound browser requests by kind and domain
#[derive(Debug, Clone)]
pub struct ResourceGate {
    rules: GateRules,
}

impl ResourceGate {
    pub fn new(rules: GateRules) -> Self {
        Self { rules }
    }

    pub fn decide(&self, url: &str, kind: ResourceKind) -> GateDecision {
        if self.rules.blocked_kinds.contains(&kind) {
            return GateDecision::Deny;
        }

        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase));
        if let Some(host) = host {
            let blocked = self.rules.blocked_domains.iter().any(|domain| {
                let domain = domain.to_lowercase();
                host == domain || host.ends_with(&format!(".{}", domain))
            });
            if blocked {
                return GateDecision::Deny;
            }
        }

        GateDecision::Allow
    }

    /// Decide using the kind inferred from the URL itself
    pub fn decide_url(&self, url: &str) -> GateDecision {
        self.decide(url, ResourceKind::classify(url))
    }

    /// The rules as DevTools `Network.setBlockedURLs` wildcard patterns
    pub fn blocked_url_patterns(&self) -> Vec<String> {
        let mut patterns = Vec::new();
        for kind in &self.rules.blocked_kinds {
            for ext in kind.extensions() {
                patterns.push(format!("*.{}", ext));
                patterns.push(format!("*.{}?*", ext));
            }
        }
        for domain in &self.rules.blocked_domains {
            patterns.push(format!("*://{}/*", domain));
            patterns.push(format!("*://*.{}/*", domain));
        }
        patterns
    }

    pub fn is_empty(&self) -> bool {
        self.rules.blocked_kinds.is_empty() && self.rules.blocked_domains.is_empty()
    }
}
