use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Audience a product (or a whole seed) is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Women,
    Men,
}

const WOMEN_TOKENS: &[&str] = &["women", "woman", "womens", "ladies", "female", "her"];
const MEN_TOKENS: &[&str] = &["men", "man", "mens", "male", "him"];

impl Gender {
    /// Infer a gender hint from the path of a URL (e.g. `/women/dresses`)
    pub fn infer_from_url(url: &str) -> Option<Self> {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_lowercase(),
            Err(_) => url.to_lowercase(),
        };
        Self::detect(&path)
    }

    /// Detect a gender mention in free text, matching whole tokens only
    pub fn detect(text: &str) -> Option<Self> {
        let lower = text.to_lowercase();
        let tokens: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .map(|t| t.trim_end_matches("'s"))
            .filter(|t| !t.is_empty())
            .collect();

        // "women" must win over "men" when both appear
        if tokens.iter().any(|t| WOMEN_TOKENS.contains(t)) {
            Some(Gender::Women)
        } else if tokens.iter().any(|t| MEN_TOKENS.contains(t)) {
            Some(Gender::Men)
        } else {
            None
        }
    }

    /// Breadcrumb label used when the gender segment is promoted
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Women => "Women",
            Gender::Men => "Men",
        }
    }
}

/// Discount ratio rounded to two decimals; zero unless the original price
/// is strictly above the current one
pub fn compute_discount(current: Option<f64>, original: Option<f64>) -> f64 {
    match (current, original) {
        (Some(current), Some(original)) if original > 0.0 && original > current && current >= 0.0 => {
            let ratio = (original - current) / original;
            (ratio * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}

/// Fields harvested cheaply from a listing card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialProduct {
    pub name: Option<String>,
    pub brand: Option<String>,
    pub images: Vec<String>,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount: Option<f64>,
    pub tags: Vec<String>,
    pub gender: Option<Gender>,
}

impl PartialProduct {
    /// Set the price pair and derive the discount from it
    pub fn with_prices(mut self, current: Option<f64>, original: Option<f64>) -> Self {
        self.current_price = current;
        self.original_price = original;
        self.discount = Some(compute_discount(current, original));
        self
    }
}

/// The final record handed to the catalog sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub url: String,
    pub source: String,
    pub scraped_at: DateTime<Utc>,
    pub name: Option<String>,
    pub brand: Option<String>,
    pub images: Vec<String>,
    pub current_price: Option<f64>,
    pub original_price: Option<f64>,
    pub discount: f64,
    pub tags: Vec<String>,
    pub gender: Option<Gender>,
    pub sku: Option<String>,
    pub color: Option<String>,
    pub material: Option<String>,
    pub material_details: Vec<String>,
    pub sizes: Vec<String>,
    pub breadcrumbs: Vec<String>,
}

impl Product {
    /// Start a product for `url`, seeded with listing data
    pub fn from_partial(url: &str, source: &str, partial: PartialProduct) -> Self {
        let mut product = Self {
            url: url.to_string(),
            source: source.to_string(),
            scraped_at: Utc::now(),
            name: partial.name,
            brand: partial.brand,
            images: partial.images,
            current_price: partial.current_price,
            original_price: partial.original_price,
            discount: 0.0,
            tags: partial.tags,
            gender: partial.gender,
            sku: None,
            color: None,
            material: None,
            material_details: Vec::new(),
            sizes: Vec::new(),
            breadcrumbs: Vec::new(),
        };
        product.recompute_discount();
        product
    }

    /// Re-derive `discount` from the price pair
    pub fn recompute_discount(&mut self) {
        self.discount = compute_discount(self.current_price, self.original_price);
    }

    /// Key used by downstream storage for upserts
    pub fn catalog_key(&self) -> String {
        format!("{}:{}", self.source, self.url)
    }
}
