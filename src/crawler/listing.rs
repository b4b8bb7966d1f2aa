use scraper::Html;
use tracing::debug;

use crate::browser::behavior::BehaviorSimulator;
use crate::browser::page::PageDriver;
use crate::crawler::error::CrawlError;
use crate::crawler::frontier::{resolve_url, DomainScope, SeenUrlSet};
use crate::crawler::product::PartialProduct;
use crate::crawler::task::CrawlTask;
use crate::extract::dom::{self, first_within};
use crate::extract::price::parse_price;
use crate::extract::validate::FieldCheck;
use crate::sites::{ListingRules, Probe};

/// A product found on a listing page, not yet checked against the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub partial: PartialProduct,
}

/// What one listing page yielded
#[derive(Debug, Clone, Default)]
pub struct ListingPage {
    pub candidates: Vec<Candidate>,

    /// Cards present once revealing stopped
    pub card_count: usize,

    /// URL of the page after redirects
    pub page_url: String,
}

/// Limits for revealing lazily loaded cards
#[derive(Debug, Clone, Copy)]
pub struct RevealLimits {
    pub max_scroll_steps: u32,
    pub max_load_clicks: u32,
}

/// Reads product cards from listing pages
pub struct ListPageProcessor {
    rules: ListingRules,
    scope: DomainScope,
    behavior: BehaviorSimulator,
    limits: RevealLimits,
}

impl ListPageProcessor {
    pub fn new(rules: ListingRules, scope: DomainScope, behavior: BehaviorSimulator, limits: RevealLimits) -> Self {
        Self { rules, scope, behavior, limits }
    }

    /// Scroll until `wanted` cards are present or no more show up
    async fn reveal(&self, page: &dyn PageDriver, wanted: usize) -> Result<usize, CrawlError> {
        let card = self.rules.card.as_str();
        let mut count = page.count(card).await?;
        let mut load_clicks = 0;

        for step in 0..self.limits.max_scroll_steps {
            if count >= wanted {
                break;
            }

            self.behavior.scroll_step(page).await?;
            let mut now = page.count(card).await?;

            if now <= count {
                if let Some(load_more) = &self.rules.load_more {
                    if load_clicks < self.limits.max_load_clicks && self.behavior.click(page, load_more).await? {
                        load_clicks += 1;
                        now = page.count(card).await?;
                    }
                }
            }

            if now <= count {
                debug!("No new cards after scroll step {}, stopping at {}", step + 1, count);
                break;
            }
            count = now;
        }

        Ok(count)
    }

    /// Reveal cards and turn them into candidates, at most `remaining` of them
    pub async fn process(
        &self,
        page: &dyn PageDriver,
        task: &CrawlTask,
        remaining: usize,
        seen: &SeenUrlSet,
    ) -> Result<ListingPage, CrawlError> {
        if remaining == 0 {
            return Ok(ListingPage { page_url: task.url.clone(), ..ListingPage::default() });
        }

        let card_count = self.reveal(page, remaining).await?;
        let html = page.html().await?;
        let page_url = page.current_url().await.unwrap_or_else(|_| task.url.clone());

        let mut candidates = extract_cards(&html, &page_url, &self.rules, &self.scope);
        for candidate in &mut candidates {
            if candidate.partial.gender.is_none() {
                candidate.partial.gender = task.gender;
            }
        }
        candidates.retain(|c| !seen.contains(&c.url));
        candidates.truncate(remaining);

        debug!("{} candidates from {} cards on {}", candidates.len(), card_count, page_url);
        Ok(ListingPage { candidates, card_count, page_url })
    }
}

/// Read every card of a listing snapshot, in page order.
///
/// Cards without a link, or linking outside `scope`, are dropped; a URL
/// listed twice is kept once.
pub fn extract_cards(html: &str, page_url: &str, rules: &ListingRules, scope: &DomainScope) -> Vec<Candidate> {
    let doc = Html::parse_document(html);
    let brand_check = FieldCheck::text(Some(rules.brand_max_len));
    let name_check = FieldCheck::text(Some(rules.name_max_len));

    let mut candidates: Vec<Candidate> = Vec::new();
    for card in dom::elements(&doc, &rules.card) {
        let Some(url) = first_within(card, &rules.link).and_then(|href| resolve_url(page_url, &href)) else {
            continue;
        };
        if !scope.contains(&url) {
            debug!("Discarding off-site card link: {}", url);
            continue;
        }
        if candidates.iter().any(|c| c.url == url) {
            continue;
        }

        let price_of = |probes: &[Probe]| first_within(card, probes).and_then(|raw| parse_price(&raw)).filter(|p| *p > 0.0);

        // Discounted layout shows two price nodes; everything else is single-price
        let (current, original) = match (price_of(&rules.sale_price), price_of(&rules.original_price)) {
            (Some(sale), Some(original)) => (Some(sale), Some(original)),
            (Some(sale), None) => (Some(sale), None),
            (None, _) => (price_of(&rules.single_price), None),
        };

        let image = first_within(card, &rules.image)
            .filter(|src| !src.starts_with("data:"))
            .and_then(|src| dom::first_src(&src))
            .and_then(|src| resolve_url(page_url, &src));

        let partial = PartialProduct {
            name: first_within(card, &rules.name).and_then(|v| name_check.accept(&v)),
            brand: first_within(card, &rules.brand).and_then(|v| brand_check.accept(&v)),
            images: image.into_iter().collect(),
            tags: first_within(card, &rules.tag).into_iter().collect(),
            ..PartialProduct::default()
        }
        .with_prices(current, original);

        candidates.push(Candidate { url, partial });
    }

    candidates
}
