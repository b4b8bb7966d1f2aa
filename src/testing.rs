//! In-memory storefront for driving the crawl pipeline without a browser.
//!
//! Listing pages are generated from a layout: a grid of product cards
//! (half discounted, half single-price), optional lazy loading on scroll or
//! behind a "load more" button, a next-page link, and optional overlays.
//! Every element the page renders counts as visible.

use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

use crate::browser::gate::GateRules;
use crate::browser::page::{PageDriver, PageLauncher};
use crate::cli::config::BrowserBehavior;
use crate::crawler::error::CrawlError;
use crate::crawler::frontier::normalize_url;
use crate::crawler::product::Product;
use crate::sites::{
    DetailRules, FieldRule, ImageRules, InterstitialRules, ListRule, ListingRules, PaginationRules,
    PreferenceDialog, Probe, SiteProfile,
};
use crate::storage::ProductSink;

pub const HOST: &str = "https://shop.test";
pub const SEED_PATH: &str = "/women/dresses";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    /// Banner with an accept button
    CookieBanner,
    /// Women / men / skip dialog
    GenderGate,
    /// Banner without any control; never goes away
    Stuck,
}

impl Overlay {
    fn html(&self) -> &'static str {
        match self {
            Overlay::CookieBanner => {
                r#"<div id="cookie-banner"><p>We use cookies</p><button id="cookie-accept" data-action="dismiss">Accept</button></div>"#
            }
            Overlay::GenderGate => {
                r#"<div class="gender-gate"><button class="women" data-action="dismiss">Women</button><button class="men" data-action="dismiss">Men</button><button class="skip" data-action="dismiss">Skip</button></div>"#
            }
            Overlay::Stuck => r#"<div id="cookie-banner" class="newsletter">Subscribe to our newsletter</div>"#,
        }
    }
}

#[derive(Debug, Clone)]
struct Layout {
    /// Listing path -> number of pages
    listings: Vec<(String, u32)>,
    items_per_page: usize,
    initial_visible: Option<usize>,
    reveal_per_scroll: usize,
    load_more_batch: Option<usize>,
    overlay: Option<Overlay>,
    slow: HashMap<String, Duration>,
    fail_launch: bool,
    shared_catalog: bool,
}

pub struct FakeSiteBuilder {
    layout: Layout,
    failures: HashMap<String, u32>,
}

impl FakeSiteBuilder {
    /// Add a listing with `pages` pages; defaults to `SEED_PATH` with 3 pages
    pub fn listing(mut self, path: &str, pages: u32) -> Self {
        self.layout.listings.push((path.to_string(), pages));
        self
    }

    pub fn items_per_page(mut self, items: usize) -> Self {
        self.layout.items_per_page = items;
        self
    }

    /// Cards present before any scrolling
    pub fn initial_visible(mut self, count: usize) -> Self {
        self.layout.initial_visible = Some(count);
        self
    }

    pub fn reveal_per_scroll(mut self, count: usize) -> Self {
        self.layout.reveal_per_scroll = count;
        self
    }

    /// Hidden cards only appear through a "load more" button
    pub fn load_more(mut self, batch: usize) -> Self {
        self.layout.load_more_batch = Some(batch);
        self
    }

    pub fn overlay(mut self, overlay: Overlay) -> Self {
        self.layout.overlay = Some(overlay);
        self
    }

    /// Navigation to `url` fails the first `times` attempts
    pub fn fail_first(mut self, url: &str, times: u32) -> Self {
        self.failures.insert(normalize_url(url), times);
        self
    }

    /// Navigation to `url` takes `delay`
    pub fn slow(mut self, url: &str, delay: Duration) -> Self {
        self.layout.slow.insert(normalize_url(url), delay);
        self
    }

    pub fn fail_launch(mut self) -> Self {
        self.layout.fail_launch = true;
        self
    }

    /// Every listing shows the same products, linked by the same URLs
    pub fn shared_catalog(mut self) -> Self {
        self.layout.shared_catalog = true;
        self
    }

    pub fn build(mut self) -> FakeSite {
        if self.layout.listings.is_empty() {
            self.layout.listings.push((SEED_PATH.to_string(), 3));
        }
        FakeSite {
            inner: Arc::new(SiteInner {
                layout: self.layout,
                failures: Mutex::new(self.failures),
                visits: Mutex::new(Vec::new()),
                launches: AtomicUsize::new(0),
            }),
        }
    }
}

struct SiteInner {
    layout: Layout,
    failures: Mutex<HashMap<String, u32>>,
    visits: Mutex<Vec<String>>,
    launches: AtomicUsize,
}

enum FakePage {
    Listing { path: String, page: u32, pages: u32 },
    Detail { id: String },
    Missing,
}

fn slug(path: &str) -> String {
    path.trim_matches('/').replace('/', "-")
}

impl SiteInner {
    fn classify(&self, url: &str) -> FakePage {
        let Ok(parsed) = Url::parse(url) else { return FakePage::Missing };
        let path = parsed.path().to_string();

        if let Some(id) = path.strip_prefix("/p/") {
            return FakePage::Detail { id: id.to_string() };
        }

        let Some((_, pages)) = self.layout.listings.iter().find(|(p, _)| *p == path) else {
            return FakePage::Missing;
        };
        let page = parsed
            .query_pairs()
            .find(|(k, _)| k == "page")
            .and_then(|(_, v)| v.parse::<u32>().ok())
            .unwrap_or(1);

        if page == 0 || page > *pages {
            FakePage::Missing
        } else {
            FakePage::Listing { path, page, pages: *pages }
        }
    }

    fn card(&self, path: &str, page: u32, index: usize) -> String {
        let k = (page as usize - 1) * self.layout.items_per_page + index;
        let owner = if self.layout.shared_catalog { "shared".to_string() } else { slug(path) };
        let id = format!("{}-p{}-{}", owner, page, index);
        let price = if k % 2 == 0 {
            r#"<span class="price-sale">€ 40,00</span><span class="price-original">€ 50,00</span>"#
        } else {
            r#"<span class="price">€ 30,00</span>"#
        };
        format!(
            r#"<li class="product"><a class="product-link" href="/p/{id}"><img src="/img/{id}.jpg"><span class="brand">Maison {brand}</span><span class="name">Item {k}</span>{price}</a></li>"#,
            id = id,
            brand = k % 3,
            k = k,
            price = price,
        )
    }

    fn detail(&self, id: &str) -> String {
        format!(
            r#"<nav class="crumbs"><a>Home</a><a>Dresses</a></nav>
               <h1 class="title">Item {id}</h1>
               <div class="designer">Maison</div>
               <div class="pdp-price"><span class="now">€ 40,00</span><span class="was">€ 50,00</span></div>
               <ul class="sizes"><li>S</li><li>M</li></ul>
               <img class="hero" src="/img/{id}.jpg">"#,
            id = id
        )
    }

    fn render(&self, tab: &TabState) -> String {
        let mut body = String::new();
        if tab.overlay_open {
            if let Some(overlay) = self.layout.overlay {
                body.push_str(overlay.html());
            }
        }

        match self.classify(&tab.url) {
            FakePage::Listing { path, page, pages } => {
                body.push_str(r#"<ul class="grid">"#);
                for index in 0..tab.revealed {
                    body.push_str(&self.card(&path, page, index));
                }
                body.push_str("</ul>");
                if self.layout.load_more_batch.is_some() && tab.revealed < self.layout.items_per_page {
                    body.push_str(r#"<button class="load-more" data-action="load-more">Load more</button>"#);
                }
                if page < pages {
                    body.push_str(&format!(
                        r#"<nav class="pagination"><a class="next" href="{}?page={}">Next</a></nav>"#,
                        path,
                        page + 1
                    ));
                }
            }
            FakePage::Detail { id } => body.push_str(&self.detail(&id)),
            FakePage::Missing => body.push_str("<h1>Page not found</h1>"),
        }

        format!("<html><body>{}</body></html>", body)
    }
}

/// Handle on a generated storefront; clones share state
#[derive(Clone)]
pub struct FakeSite {
    inner: Arc<SiteInner>,
}

impl FakeSite {
    pub fn builder() -> FakeSiteBuilder {
        FakeSiteBuilder {
            layout: Layout {
                listings: Vec::new(),
                items_per_page: 4,
                initial_visible: None,
                reveal_per_scroll: 0,
                load_more_batch: None,
                overlay: None,
                slow: HashMap::new(),
                fail_launch: false,
                shared_catalog: false,
            },
            failures: HashMap::new(),
        }
    }

    pub fn seed_url() -> String {
        format!("{}{}", HOST, SEED_PATH)
    }

    pub fn listing_url(path: &str, page: u32) -> String {
        if page == 1 {
            format!("{}{}", HOST, path)
        } else {
            format!("{}{}?page={}", HOST, path, page)
        }
    }

    pub fn product_url(path: &str, page: u32, index: usize) -> String {
        format!("{}/p/{}-p{}-{}", HOST, slug(path), page, index)
    }

    /// Product URL when the site was built with `shared_catalog`
    pub fn shared_product_url(page: u32, index: usize) -> String {
        format!("{}/p/shared-p{}-{}", HOST, page, index)
    }

    pub fn tab(&self) -> FakeTab {
        FakeTab {
            site: self.inner.clone(),
            state: Mutex::new(TabState::default()),
        }
    }

    /// Every navigation so far, in order
    pub fn visits(&self) -> Vec<String> {
        self.inner.visits.lock().unwrap().clone()
    }

    pub fn launches(&self) -> usize {
        self.inner.launches.load(Ordering::SeqCst)
    }

    /// Profile matching the generated markup
    pub fn profile() -> SiteProfile {
        let probes = |list: &[&str]| list.iter().map(|p| Probe::from(*p)).collect::<Vec<_>>();
        SiteProfile {
            name: "fake".to_string(),
            source: "fake-shop".to_string(),
            allowed_domains: vec!["shop.test".to_string()],
            listing: ListingRules {
                card: "li.product".to_string(),
                link: probes(&["a.product-link @href"]),
                brand: probes(&[".brand"]),
                name: probes(&[".name"]),
                sale_price: probes(&[".price-sale"]),
                original_price: probes(&[".price-original"]),
                single_price: probes(&[".price"]),
                image: probes(&["img @src"]),
                tag: Vec::new(),
                load_more: Some("button.load-more".to_string()),
                brand_max_len: 60,
                name_max_len: 200,
            },
            pagination: PaginationRules {
                next: vec!["a.pagination-next".to_string(), "a.next".to_string()],
                page_params: vec!["page".to_string()],
                offset_params: vec!["start".to_string()],
                page_size: None,
            },
            detail: DetailRules {
                name: FieldRule { selectors: probes(&["h1.title"]), max_len: Some(200), ..FieldRule::default() },
                brand: FieldRule { selectors: probes(&[".designer"]), max_len: Some(60), ..FieldRule::default() },
                current_price: FieldRule { selectors: probes(&[".pdp-price .now"]), ..FieldRule::default() },
                original_price: FieldRule { selectors: probes(&[".pdp-price .was"]), ..FieldRule::default() },
                sizes: ListRule { selectors: probes(&["ul.sizes li"]), max_len: Some(20) },
                breadcrumbs: ListRule { selectors: probes(&["nav.crumbs a"]), max_len: Some(60) },
                images: ImageRules { primary: probes(&["img.hero @src"]), thumbnails: Vec::new() },
                ..DetailRules::default()
            },
            interstitial: InterstitialRules {
                close: vec!["#cookie-accept".to_string()],
                overlays: vec!["#cookie-banner".to_string(), ".gender-gate".to_string()],
                preference_dialogs: vec![PreferenceDialog {
                    overlay: ".gender-gate".to_string(),
                    women: Some(".gender-gate .women".to_string()),
                    men: Some(".gender-gate .men".to_string()),
                    fallback: Some(".gender-gate .skip".to_string()),
                }],
                settle_timeout_ms: 10,
                step_timeout_ms: 50,
            },
            gate: GateRules::default(),
        }
    }
}

#[async_trait]
impl PageLauncher for FakeSite {
    async fn launch(&self, _headless: bool) -> Result<Box<dyn PageDriver>, CrawlError> {
        if self.inner.layout.fail_launch {
            return Err(CrawlError::SessionLaunch("webdriver refused the connection".to_string()));
        }
        self.inner.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.tab()))
    }
}

#[derive(Debug, Default)]
struct TabState {
    url: String,
    revealed: usize,
    overlay_open: bool,
    overlay_dismissed: bool,
    clicked: Vec<String>,
    escapes: usize,
    closed: bool,
}

/// One open page of the fake storefront
pub struct FakeTab {
    site: Arc<SiteInner>,
    state: Mutex<TabState>,
}

fn select_first_attr(html: &str, css: &str, attr: &str) -> Option<Option<String>> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse(css).ok()?;
    let element = doc.select(&selector).next()?;
    Some(element.value().attr(attr).map(str::to_string))
}

fn count_matches(html: &str, css: &str) -> usize {
    let doc = Html::parse_document(html);
    match Selector::parse(css) {
        Ok(selector) => doc.select(&selector).count(),
        Err(_) => 0,
    }
}

impl FakeTab {
    fn render(&self) -> String {
        let state = self.state.lock().unwrap();
        self.site.render(&state)
    }

    pub fn clicked(&self) -> Vec<String> {
        self.state.lock().unwrap().clicked.clone()
    }

    pub fn escape_presses(&self) -> usize {
        self.state.lock().unwrap().escapes
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn reveal(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        state.revealed = (state.revealed + count).min(self.site.layout.items_per_page);
    }
}

#[async_trait]
impl PageDriver for FakeTab {
    async fn goto(&self, url: &str) -> Result<(), CrawlError> {
        let key = normalize_url(url);
        self.site.visits.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.site.layout.slow.get(&key).copied() {
            tokio::time::sleep(delay).await;
        }

        {
            let mut failures = self.site.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&key) {
                if *left > 0 {
                    *left -= 1;
                    return Err(CrawlError::Navigation {
                        url: url.to_string(),
                        message: "net::ERR_CONNECTION_RESET".to_string(),
                    });
                }
            }
        }

        let layout = &self.site.layout;
        let mut state = self.state.lock().unwrap();
        state.url = url.to_string();
        state.revealed = layout.initial_visible.unwrap_or(layout.items_per_page).min(layout.items_per_page);
        state.overlay_open = match layout.overlay {
            Some(Overlay::Stuck) => true,
            Some(_) => !state.overlay_dismissed,
            None => false,
        };
        Ok(())
    }

    async fn current_url(&self) -> Result<String, CrawlError> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn html(&self) -> Result<String, CrawlError> {
        Ok(self.render())
    }

    async fn count(&self, css: &str) -> Result<usize, CrawlError> {
        Ok(count_matches(&self.render(), css))
    }

    async fn is_visible(&self, css: &str) -> Result<bool, CrawlError> {
        Ok(count_matches(&self.render(), css) > 0)
    }

    async fn visible_attr(&self, css: &str, attr: &str) -> Result<Option<String>, CrawlError> {
        Ok(select_first_attr(&self.render(), css, attr).flatten())
    }

    async fn click_first_visible(&self, css: &str) -> Result<bool, CrawlError> {
        let Some(action) = select_first_attr(&self.render(), css, "data-action") else {
            return Ok(false);
        };

        self.state.lock().unwrap().clicked.push(css.to_string());
        match action.as_deref() {
            Some("dismiss") => {
                let mut state = self.state.lock().unwrap();
                state.overlay_open = false;
                state.overlay_dismissed = true;
            }
            Some("load-more") => {
                if let Some(batch) = self.site.layout.load_more_batch {
                    self.reveal(batch);
                }
            }
            _ => {}
        }
        Ok(true)
    }

    async fn scroll_by(&self, _pixels: i64) -> Result<(), CrawlError> {
        if self.site.layout.load_more_batch.is_none() {
            self.reveal(self.site.layout.reveal_per_scroll);
        }
        Ok(())
    }

    async fn scroll_to_bottom(&self) -> Result<(), CrawlError> {
        self.scroll_by(i64::MAX).await
    }

    async fn press_escape(&self) -> Result<(), CrawlError> {
        self.state.lock().unwrap().escapes += 1;
        Ok(())
    }

    async fn wait_for_network_idle(&self, _timeout: Duration) -> Result<bool, CrawlError> {
        Ok(true)
    }

    async fn close(&self) -> Result<(), CrawlError> {
        self.state.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Scrolling and clicking without pauses
pub fn instant_behavior() -> BrowserBehavior {
    BrowserBehavior {
        scroll_distance: (600, 600),
        scroll_pause_ms: (0, 0),
        click_delay_ms: (0, 0),
    }
}

/// Product sink that keeps everything in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    products: Mutex<Vec<Product>>,
    flushes: AtomicUsize,
}

impl MemorySink {
    pub fn products(&self) -> Vec<Product> {
        self.products.lock().unwrap().clone()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProductSink for MemorySink {
    async fn store(&self, product: &Product) -> anyhow::Result<()> {
        self.products.lock().unwrap().push(product.clone());
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
