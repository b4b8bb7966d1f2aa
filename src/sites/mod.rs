//! Declarative per-site extraction rules.
//!
//! Every storefront is described by a [`SiteProfile`]: ordered selector
//! lists per field, pagination conventions, overlay controls and request
//! blocking rules. The crawl engine is shared code that only reads these
//! tables, so supporting a new layout means editing data, not code.

pub mod reference;

use regex::Regex;
use scraper::Selector;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::browser::gate::GateRules;
use crate::crawler::error::CrawlError;

pub use reference::reference_profile;

/// A CSS selector plus, optionally, the attribute to read instead of text.
///
/// Written in profiles as `"css selector"` or `"css selector @attribute"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Probe {
    pub css: String,
    pub attr: Option<String>,
}

impl Probe {
    pub fn text(css: &str) -> Self {
        Self { css: css.to_string(), attr: None }
    }

    pub fn attr(css: &str, attr: &str) -> Self {
        Self { css: css.to_string(), attr: Some(attr.to_string()) }
    }
}

impl From<String> for Probe {
    fn from(raw: String) -> Self {
        match raw.rsplit_once(" @") {
            Some((css, attr)) if !attr.trim().is_empty() && !attr.contains(' ') => {
                Probe::attr(css.trim(), attr.trim())
            }
            _ => Probe::text(raw.trim()),
        }
    }
}

impl From<&str> for Probe {
    fn from(raw: &str) -> Self {
        Probe::from(raw.to_string())
    }
}

impl From<Probe> for String {
    fn from(probe: Probe) -> Self {
        probe.to_string()
    }
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.attr {
            Some(attr) => write!(f, "{} @{}", self.css, attr),
            None => write!(f, "{}", self.css),
        }
    }
}

/// Fallback derivations tried after every selector of a field failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "from", rename_all = "snake_case")]
pub enum Derivation {
    /// Slug of the Nth path segment of the page URL, title-cased
    UrlSegment { index: usize },

    /// First capture group of a regex applied to the page URL
    UrlPattern { regex: String },

    /// A breadcrumb entry after normalization; negative indexes count from the end
    Breadcrumb { index: i32 },
}

/// Ordered strategy chain for a single-valued field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Primary selector first, then layout variants
    #[serde(default)]
    pub selectors: Vec<Probe>,

    #[serde(default)]
    pub derive: Vec<Derivation>,

    /// Values longer than this are treated as mis-extractions
    #[serde(default)]
    pub max_len: Option<usize>,

    /// Values must match this regex when set
    #[serde(default)]
    pub pattern: Option<String>,
}

/// Ordered selector list for a multi-valued field; the first selector
/// yielding any value wins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRule {
    #[serde(default)]
    pub selectors: Vec<Probe>,

    #[serde(default)]
    pub max_len: Option<usize>,
}

/// Image sources are accumulated from both regions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRules {
    #[serde(default)]
    pub primary: Vec<Probe>,

    #[serde(default)]
    pub thumbnails: Vec<Probe>,
}

/// How product cards are read on a listing page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRules {
    /// Card container
    pub card: String,

    /// Link to the detail page, relative to the card
    pub link: Vec<Probe>,

    #[serde(default)]
    pub brand: Vec<Probe>,

    #[serde(default)]
    pub name: Vec<Probe>,

    /// Sale price node of the discounted layout
    #[serde(default)]
    pub sale_price: Vec<Probe>,

    /// Struck-through price node of the discounted layout
    #[serde(default)]
    pub original_price: Vec<Probe>,

    /// Price node of the single-price layout
    #[serde(default)]
    pub single_price: Vec<Probe>,

    #[serde(default)]
    pub image: Vec<Probe>,

    #[serde(default)]
    pub tag: Vec<Probe>,

    /// "Load more" button revealing further cards
    #[serde(default)]
    pub load_more: Option<String>,

    #[serde(default = "default_brand_max_len")]
    pub brand_max_len: usize,

    #[serde(default = "default_name_max_len")]
    pub name_max_len: usize,
}

/// Next-page controls and page-number conventions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationRules {
    /// Next-page controls, in order of preference
    #[serde(default)]
    pub next: Vec<String>,

    /// Query parameters holding a 1-based page index
    #[serde(default = "default_page_params")]
    pub page_params: Vec<String>,

    /// Query parameters holding a 0-based item offset
    #[serde(default = "default_offset_params")]
    pub offset_params: Vec<String>,

    /// Items per page for offset-style URLs; the card count is used when unset
    #[serde(default)]
    pub page_size: Option<u32>,
}

/// Field strategy table for detail pages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailRules {
    #[serde(default)]
    pub name: FieldRule,
    #[serde(default)]
    pub brand: FieldRule,
    #[serde(default)]
    pub current_price: FieldRule,
    #[serde(default)]
    pub original_price: FieldRule,
    #[serde(default)]
    pub sku: FieldRule,
    #[serde(default)]
    pub color: FieldRule,
    #[serde(default)]
    pub material: FieldRule,
    #[serde(default)]
    pub material_details: ListRule,
    #[serde(default)]
    pub sizes: ListRule,
    #[serde(default)]
    pub breadcrumbs: ListRule,
    #[serde(default)]
    pub images: ImageRules,
}

/// Multi-step preference dialog (e.g. "shop women / shop men")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceDialog {
    /// Marker of the dialog itself
    pub overlay: String,

    #[serde(default)]
    pub women: Option<String>,

    #[serde(default)]
    pub men: Option<String>,

    /// Choice used when the task has no gender hint
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Popup and overlay controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterstitialRules {
    /// Close / accept controls, in order of preference
    #[serde(default)]
    pub close: Vec<String>,

    /// Elements that indicate a blocking overlay is still shown
    #[serde(default)]
    pub overlays: Vec<String>,

    #[serde(default)]
    pub preference_dialogs: Vec<PreferenceDialog>,

    /// Wait for network idling before scanning
    #[serde(default = "default_settle_ms")]
    pub settle_timeout_ms: u64,

    /// Budget for each individual dismissal step
    #[serde(default = "default_step_ms")]
    pub step_timeout_ms: u64,
}

impl Default for InterstitialRules {
    fn default() -> Self {
        Self {
            close: Vec::new(),
            overlays: Vec::new(),
            preference_dialogs: Vec::new(),
            settle_timeout_ms: default_settle_ms(),
            step_timeout_ms: default_step_ms(),
        }
    }
}

fn default_brand_max_len() -> usize {
    60
}

fn default_name_max_len() -> usize {
    200
}

fn default_page_params() -> Vec<String> {
    vec!["page".to_string(), "p".to_string(), "pg".to_string()]
}

fn default_offset_params() -> Vec<String> {
    vec!["start".to_string(), "offset".to_string(), "from".to_string()]
}

fn default_settle_ms() -> u64 {
    3000
}

fn default_step_ms() -> u64 {
    1500
}

/// Everything the engine needs to know about one storefront
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteProfile {
    pub name: String,

    /// Value of `source` on every emitted product
    pub source: String,

    /// Hosts detail links may point to; seed hosts are used when empty
    #[serde(default)]
    pub allowed_domains: Vec<String>,

    pub listing: ListingRules,
    pub pagination: PaginationRules,

    #[serde(default)]
    pub detail: DetailRules,

    #[serde(default)]
    pub interstitial: InterstitialRules,

    #[serde(default)]
    pub gate: GateRules,
}

impl SiteProfile {
    /// Check that every selector and pattern in the profile compiles
    pub fn validate(&self) -> Result<(), CrawlError> {
        if self.source.trim().is_empty() {
            return Err(CrawlError::Config(format!("profile '{}' has an empty source", self.name)));
        }

        for css in self.selectors() {
            Selector::parse(css).map_err(|e| {
                CrawlError::Config(format!("profile '{}': invalid selector '{}': {:?}", self.name, css, e))
            })?;
        }

        for pattern in self.patterns() {
            Regex::new(pattern).map_err(|e| {
                CrawlError::Config(format!("profile '{}': invalid pattern '{}': {}", self.name, pattern, e))
            })?;
        }

        Ok(())
    }

    fn selectors(&self) -> Vec<&str> {
        let listing = &self.listing;
        let detail = &self.detail;
        let interstitial = &self.interstitial;

        let mut all: Vec<&str> = vec![listing.card.as_str()];
        all.extend(listing.load_more.as_deref());
        for probes in [
            &listing.link,
            &listing.brand,
            &listing.name,
            &listing.sale_price,
            &listing.original_price,
            &listing.single_price,
            &listing.image,
            &listing.tag,
        ] {
            all.extend(probes.iter().map(|p| p.css.as_str()));
        }

        all.extend(self.pagination.next.iter().map(String::as_str));

        for rule in [
            &detail.name,
            &detail.brand,
            &detail.current_price,
            &detail.original_price,
            &detail.sku,
            &detail.color,
            &detail.material,
        ] {
            all.extend(rule.selectors.iter().map(|p| p.css.as_str()));
        }
        for rule in [&detail.material_details, &detail.sizes, &detail.breadcrumbs] {
            all.extend(rule.selectors.iter().map(|p| p.css.as_str()));
        }
        all.extend(detail.images.primary.iter().map(|p| p.css.as_str()));
        all.extend(detail.images.thumbnails.iter().map(|p| p.css.as_str()));

        all.extend(interstitial.close.iter().map(String::as_str));
        all.extend(interstitial.overlays.iter().map(String::as_str));
        for dialog in &interstitial.preference_dialogs {
            all.push(dialog.overlay.as_str());
            all.extend(dialog.women.as_deref());
            all.extend(dialog.men.as_deref());
            all.extend(dialog.fallback.as_deref());
        }

        all
    }

    fn patterns(&self) -> Vec<&str> {
        let detail = &self.detail;
        let mut all = Vec::new();
        for rule in [
            &detail.name,
            &detail.brand,
            &detail.current_price,
            &detail.original_price,
            &detail.sku,
            &detail.color,
            &detail.material,
        ] {
            all.extend(rule.pattern.as_deref());
            for derivation in &rule.derive {
                if let Derivation::UrlPattern { regex } = derivation {
                    all.push(regex.as_str());
                }
            }
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_parsing() {
        assert_eq!(Probe::from("a.product-link @href"), Probe::attr("a.product-link", "href"));
        assert_eq!(Probe::from("h1.title"), Probe::text("h1.title"));
        assert_eq!(Probe::from("div[data-x='a @b'] span"), Probe::text("div[data-x='a @b'] span"));
        assert_eq!(String::from(Probe::attr("img", "src")), "img @src");
    }

    #[test]
    fn test_reference_profile_is_valid() {
        let profile = reference_profile();
        assert!(profile.validate().is_ok());
    }

    #[test]
    fn test_invalid_selector_is_config_error() {
        let mut profile = reference_profile();
        profile.listing.card = "div[[".to_string();
        let err = profile.validate().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("div[["));
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let mut profile = reference_profile();
        profile.detail.sku.pattern = Some("([A-Z".to_string());
        assert!(profile.validate().is_err());
    }

    #[test]
    fn test_profile_yaml_round_trip() {
        let profile = reference_profile();
        let yaml = serde_yaml::to_string(&profile).unwrap();
        assert!(yaml.contains("from: url_segment"));
        let parsed: SiteProfile = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, profile);
    }
}
