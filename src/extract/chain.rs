use regex::Regex;
use scraper::Html;
use std::fmt;
use url::Url;

use crate::extract::dom;
use crate::extract::price::parse_price;
use crate::extract::validate::FieldCheck;
use crate::sites::{Derivation, FieldRule, ListRule};

/// Which link of a chain produced a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Index into the rule's selector list (0 is the primary selector)
    Selector(usize),
    /// Index into the rule's derivation list
    Derived(usize),
    /// Value carried over from the listing card
    Listing,
}

impl Strategy {
    pub fn is_primary(&self) -> bool {
        matches!(self, Strategy::Selector(0))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Selector(0) => write!(f, "primary selector"),
            Strategy::Selector(index) => write!(f, "alternate selector {}", index),
            Strategy::Derived(index) => write!(f, "derivation {}", index),
            Strategy::Listing => write!(f, "listing card"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub strategy: Strategy,
}

/// What a chain can look at on the current page
pub struct PageContext<'a> {
    pub doc: &'a Html,
    pub url: &'a str,
    /// Breadcrumbs after normalization
    pub breadcrumbs: &'a [String],
}

/// Turn a URL slug (`acne-studios`) into a label (`Acne Studios`)
pub fn slug_to_title(slug: &str) -> String {
    slug.split(|c: char| c == '-' || c == '_' || c == '+')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn derive(ctx: &PageContext<'_>, derivation: &Derivation) -> Option<String> {
    match derivation {
        Derivation::UrlSegment { index } => {
            let url = Url::parse(ctx.url).ok()?;
            let segment = url.path_segments()?.filter(|s| !s.is_empty()).nth(*index)?.to_string();
            Some(slug_to_title(&segment))
        }
        Derivation::UrlPattern { regex } => {
            let regex = Regex::new(regex).ok()?;
            regex
                .captures(ctx.url)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        }
        Derivation::Breadcrumb { index } => {
            let len = ctx.breadcrumbs.len() as i32;
            let position = if *index < 0 { len + index } else { *index };
            if position < 0 {
                return None;
            }
            ctx.breadcrumbs.get(position as usize).cloned()
        }
    }
}

/// Run a single-valued text chain: selectors, then derivations, then the
/// listing fallback, accepting the first value that passes validation
pub fn text_chain(ctx: &PageContext<'_>, rule: &FieldRule, fallback: Option<&str>) -> Option<Extracted<String>> {
    let check = FieldCheck::from_rule(rule);

    for (index, probe) in rule.selectors.iter().enumerate() {
        if let Some(value) = dom::all(ctx.doc, probe).iter().find_map(|v| check.accept(v)) {
            return Some(Extracted { value, strategy: Strategy::Selector(index) });
        }
    }

    for (index, derivation) in rule.derive.iter().enumerate() {
        if let Some(value) = derive(ctx, derivation).and_then(|v| check.accept(&v)) {
            return Some(Extracted { value, strategy: Strategy::Derived(index) });
        }
    }

    fallback
        .and_then(|v| check.accept(v))
        .map(|value| Extracted { value, strategy: Strategy::Listing })
}

/// Run a price chain; a value is plausible when it parses to a positive amount
pub fn price_chain(ctx: &PageContext<'_>, rule: &FieldRule, fallback: Option<f64>) -> Option<Extracted<f64>> {
    let check = FieldCheck::from_rule(rule).allowing_prices();
    let plausible = |raw: &str| check.accept(raw).as_deref().and_then(parse_price).filter(|p| *p > 0.0);

    for (index, probe) in rule.selectors.iter().enumerate() {
        if let Some(value) = dom::all(ctx.doc, probe).iter().find_map(|v| plausible(v.as_str())) {
            return Some(Extracted { value, strategy: Strategy::Selector(index) });
        }
    }

    for (index, derivation) in rule.derive.iter().enumerate() {
        if let Some(value) = derive(ctx, derivation).and_then(|v| plausible(&v)) {
            return Some(Extracted { value, strategy: Strategy::Derived(index) });
        }
    }

    fallback
        .filter(|p| *p > 0.0)
        .map(|value| Extracted { value, strategy: Strategy::Listing })
}

/// Run a multi-valued chain: the first selector yielding values wins;
/// values are validated individually and de-duplicated in order
pub fn list_chain(doc: &Html, rule: &ListRule) -> Vec<String> {
    let check = FieldCheck::text(rule.max_len);

    for probe in &rule.selectors {
        let mut values: Vec<String> = Vec::new();
        for raw in dom::all(doc, probe) {
            if let Some(value) = check.accept(&raw) {
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        if !values.is_empty() {
            return values;
        }
    }

    Vec::new()
}
