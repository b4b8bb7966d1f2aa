//! Detail-page field extraction.
//!
//! Each product attribute is filled by an ordered chain of strategies taken
//! from the site profile: primary selector, alternate selectors, URL or
//! breadcrumb derivations, then the value carried from the listing card.
//! A field whose whole chain comes up empty is simply left unset.

pub mod chain;
pub mod dom;
pub mod price;
pub mod validate;

use scraper::Html;
use std::sync::Arc;

use crate::crawler::frontier::resolve_url;
use crate::crawler::product::{Gender, Product};
use crate::crawler::task::CrawlTask;
use crate::sites::{ImageRules, SiteProfile};
use chain::{list_chain, price_chain, text_chain, Extracted, PageContext, Strategy};

/// Result of extracting one detail page
#[derive(Debug)]
pub struct Extraction {
    pub product: Product,

    /// Core fields whose strategy chain yielded nothing
    pub missing: Vec<&'static str>,

    /// Fields filled by something other than their primary selector
    pub fallbacks: Vec<(&'static str, Strategy)>,
}

/// Unwrap a chain result, noting fields the primary selector did not fill
fn settle<T>(field: &'static str, found: Option<Extracted<T>>, fallbacks: &mut Vec<(&'static str, Strategy)>) -> Option<T> {
    let found = found?;
    if !found.strategy.is_primary() {
        fallbacks.push((field, found.strategy));
    }
    Some(found.value)
}

const HOME_CRUMBS: &[&str] = &["home", "homepage", "start"];

/// Clean a breadcrumb trail and put the gender segment first.
///
/// When the trail has no gender segment, `page_gender` is inserted instead.
pub fn normalize_breadcrumbs(raw: Vec<String>, page_gender: Option<Gender>) -> Vec<String> {
    let mut crumbs: Vec<String> = Vec::new();
    for crumb in raw {
        let crumb = dom::clean_text(crumb.trim_matches(|c: char| c == '/' || c == '>' || c.is_whitespace()));
        if crumb.is_empty() || HOME_CRUMBS.contains(&crumb.to_lowercase().as_str()) {
            continue;
        }
        if crumbs.last() != Some(&crumb) {
            crumbs.push(crumb);
        }
    }

    // Only short crumbs count as a gender segment ("Women", "Men's"), not "Men's Leather Shoes"
    let gender_position = crumbs
        .iter()
        .position(|c| c.split_whitespace().count() <= 2 && Gender::detect(c).is_some());

    match gender_position {
        Some(0) => {}
        Some(position) => {
            let crumb = crumbs.remove(position);
            crumbs.insert(0, crumb);
        }
        None => {
            if let Some(gender) = page_gender {
                crumbs.insert(0, gender.label().to_string());
            }
        }
    }

    crumbs
}

fn collect_images(doc: &Html, rules: &ImageRules, page_url: &str) -> Vec<String> {
    let mut images: Vec<String> = Vec::new();
    for probe in rules.primary.iter().chain(rules.thumbnails.iter()) {
        for raw in dom::all(doc, probe) {
            if raw.trim_start().starts_with("data:") {
                continue;
            }
            let Some(src) = dom::first_src(&raw) else { continue };
            if let Some(url) = resolve_url(page_url, &src) {
                if !images.contains(&url) {
                    images.push(url);
                }
            }
        }
    }
    images
}

/// Builds full product records from detail pages of one site
#[derive(Debug, Clone)]
pub struct ProductExtractor {
    profile: Arc<SiteProfile>,
}

impl ProductExtractor {
    pub fn new(profile: Arc<SiteProfile>) -> Self {
        Self { profile }
    }

    /// Extract a product from a detail page snapshot
    pub fn extract(&self, html: &str, page_url: &str, task: &CrawlTask) -> Extraction {
        let rules = &self.profile.detail;
        let doc = Html::parse_document(html);
        let partial = task.partial.clone().unwrap_or_default();

        let page_gender = task
            .gender
            .or_else(|| Gender::infer_from_url(page_url))
            .or(partial.gender);

        let breadcrumbs = normalize_breadcrumbs(list_chain(&doc, &rules.breadcrumbs), page_gender);
        let gender = page_gender.or_else(|| breadcrumbs.first().and_then(|c| Gender::detect(c)));

        let ctx = PageContext { doc: &doc, url: page_url, breadcrumbs: &breadcrumbs };

        let mut product = Product::from_partial(&task.url, &self.profile.source, partial.clone());
        product.gender = gender;

        let mut fallbacks = Vec::new();
        product.name = settle("name", text_chain(&ctx, &rules.name, partial.name.as_deref()), &mut fallbacks);
        product.brand = settle("brand", text_chain(&ctx, &rules.brand, partial.brand.as_deref()), &mut fallbacks);

        // The price pair comes from one place: the page when it shows a price, the card otherwise
        match settle("current_price", price_chain(&ctx, &rules.current_price, None), &mut fallbacks) {
            Some(current) => {
                product.current_price = Some(current);
                product.original_price =
                    settle("original_price", price_chain(&ctx, &rules.original_price, None), &mut fallbacks);
            }
            None => {
                product.current_price = partial.current_price;
                product.original_price = partial.original_price;
                if partial.current_price.is_some() {
                    fallbacks.push(("current_price", Strategy::Listing));
                }
            }
        }
        product.recompute_discount();

        product.sku = settle("sku", text_chain(&ctx, &rules.sku, None), &mut fallbacks);
        product.color = settle("color", text_chain(&ctx, &rules.color, None), &mut fallbacks);
        product.material = settle("material", text_chain(&ctx, &rules.material, None), &mut fallbacks);
        product.material_details = list_chain(&doc, &rules.material_details);
        product.sizes = list_chain(&doc, &rules.sizes);

        let images = collect_images(&doc, &rules.images, page_url);
        if !images.is_empty() {
            product.images = images;
        }

        product.breadcrumbs = breadcrumbs;

        let mut missing = Vec::new();
        if product.name.is_none() {
            missing.push("name");
        }
        if product.brand.is_none() {
            missing.push("brand");
        }
        if product.current_price.is_none() {
            missing.push("current_price");
        }

        Extraction { product, missing, fallbacks }
    }
}
