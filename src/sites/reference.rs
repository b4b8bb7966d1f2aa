//! Built-in adapter for the Atelier fashion storefront.

use crate::browser::gate::{GateRules, ResourceKind};
use crate::sites::{
    Derivation, DetailRules, FieldRule, ImageRules, InterstitialRules, ListRule, ListingRules,
    PaginationRules, PreferenceDialog, Probe, SiteProfile,
};

fn probes(list: &[&str]) -> Vec<Probe> {
    list.iter().map(|raw| Probe::from(*raw)).collect()
}

fn strings(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

pub fn reference_profile() -> SiteProfile {
    SiteProfile {
        name: "atelier".to_string(),
        source: "atelier".to_string(),
        allowed_domains: strings(&["atelier-mode.com"]),
        listing: ListingRules {
            card: "article.product-card, li.product-grid__item".to_string(),
            link: probes(&["a.product-card__link @href", "a[data-product-url] @href", "a @href"]),
            brand: probes(&[".product-card__brand", "[data-testid='brand']"]),
            name: probes(&[".product-card__name", "[data-testid='product-name']", "a @title"]),
            sale_price: probes(&[".price--sale", ".price__current--discounted"]),
            original_price: probes(&[".price--original", "s.price__original", "del"]),
            single_price: probes(&[".price--regular", ".price__current", ".price"]),
            image: probes(&["img @src", "img @data-src", "source @srcset"]),
            tag: probes(&[".product-card__badge", ".badge"]),
            load_more: Some("button.load-more, [data-action='load-more']".to_string()),
            brand_max_len: 60,
            name_max_len: 200,
        },
        pagination: PaginationRules {
            next: strings(&[
                "a[rel='next']",
                "a.pagination__next",
                "nav.pagination li.next a",
                "a[aria-label='Next page']",
            ]),
            page_params: strings(&["page", "p", "pg"]),
            offset_params: strings(&["start", "offset", "from"]),
            page_size: None,
        },
        detail: DetailRules {
            name: FieldRule {
                selectors: probes(&["h1.product-detail__name", "h1[itemprop='name']", "meta[property='og:title'] @content"]),
                derive: Vec::new(),
                max_len: Some(200),
                pattern: None,
            },
            brand: FieldRule {
                selectors: probes(&[
                    ".product-detail__brand a",
                    "[itemprop='brand'] [itemprop='name']",
                    "meta[itemprop='brand'] @content",
                ]),
                derive: vec![Derivation::UrlSegment { index: 1 }],
                max_len: Some(60),
                pattern: None,
            },
            current_price: FieldRule {
                selectors: probes(&[
                    ".product-detail__price .price--sale",
                    ".product-detail__price .price--regular",
                    "meta[itemprop='price'] @content",
                ]),
                ..FieldRule::default()
            },
            original_price: FieldRule {
                selectors: probes(&[".product-detail__price .price--original", ".product-detail__price del"]),
                ..FieldRule::default()
            },
            sku: FieldRule {
                selectors: probes(&["[itemprop='sku'] @content", ".product-detail__sku", "[data-sku] @data-sku"]),
                derive: vec![Derivation::UrlPattern { regex: r"-(\d{6,})(?:\.html)?$".to_string() }],
                max_len: Some(64),
                pattern: Some(r"^[A-Za-z0-9\-_.]+$".to_string()),
            },
            color: FieldRule {
                selectors: probes(&[".product-detail__color-name", "[data-testid='selected-color']", ".swatch--selected @title"]),
                derive: Vec::new(),
                max_len: Some(20),
                pattern: None,
            },
            material: FieldRule {
                selectors: probes(&[".product-detail__composition li:first-child", "[data-testid='material']"]),
                derive: Vec::new(),
                max_len: Some(120),
                pattern: None,
            },
            material_details: ListRule {
                selectors: probes(&[".product-detail__composition li", ".product-care li"]),
                max_len: Some(200),
            },
            sizes: ListRule {
                selectors: probes(&[
                    ".size-selector button:not([disabled])",
                    ".size-selector option:not([disabled])",
                    "[data-testid='size-option']",
                ]),
                max_len: Some(20),
            },
            breadcrumbs: ListRule {
                selectors: probes(&["nav.breadcrumb li", "ol[itemtype*='BreadcrumbList'] [itemprop='name']"]),
                max_len: Some(60),
            },
            images: ImageRules {
                primary: probes(&[".product-gallery__main img @src", ".product-gallery__main img @data-src"]),
                thumbnails: probes(&[".product-gallery__thumbs img @data-zoom", ".product-gallery__thumbs img @src"]),
            },
        },
        interstitial: InterstitialRules {
            close: strings(&[
                "#onetrust-accept-btn-handler",
                "button[data-testid='cookie-accept']",
                ".modal--region button.modal__close",
                "button[aria-label='Close']",
            ]),
            overlays: strings(&[".modal--open", "#onetrust-banner-sdk", ".gender-gate"]),
            preference_dialogs: vec![PreferenceDialog {
                overlay: ".gender-gate".to_string(),
                women: Some(".gender-gate button[data-gender='women']".to_string()),
                men: Some(".gender-gate button[data-gender='men']".to_string()),
                fallback: Some(".gender-gate button.gender-gate__skip".to_string()),
            }],
            settle_timeout_ms: 3000,
            step_timeout_ms: 1500,
        },
        gate: GateRules {
            blocked_kinds: vec![ResourceKind::Image, ResourceKind::Font, ResourceKind::Media],
            blocked_domains: strings(&[
                "doubleclick.net",
                "google-analytics.com",
                "googletagmanager.com",
                "hotjar.com",
                "facebook.net",
            ]),
        },
    }
}
