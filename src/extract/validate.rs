use regex::Regex;

use crate::extract::dom::clean_text;
use crate::extract::price::looks_like_price;
use crate::sites::FieldRule;

/// Shape rules a candidate value must pass before a chain accepts it
#[derive(Debug, Clone)]
pub struct FieldCheck {
    max_len: Option<usize>,
    pattern: Option<Regex>,
    reject_prices: bool,
}

impl FieldCheck {
    /// A text field: non-empty, not a currency amount, bounded length
    pub fn text(max_len: Option<usize>) -> Self {
        Self { max_len, pattern: None, reject_prices: true }
    }

    /// Checks configured by a profile rule
    pub fn from_rule(rule: &FieldRule) -> Self {
        Self {
            max_len: rule.max_len,
            // Patterns are validated when the profile is loaded
            pattern: rule.pattern.as_deref().and_then(|p| Regex::new(p).ok()),
            reject_prices: true,
        }
    }

    /// Allow currency amounts (price fields)
    pub fn allowing_prices(mut self) -> Self {
        self.reject_prices = false;
        self
    }

    /// Return the cleaned value if it passes every rule
    pub fn accept(&self, raw: &str) -> Option<String> {
        let value = clean_text(raw);
        if value.is_empty() {
            return None;
        }
        if let Some(max_len) = self.max_len {
            if value.chars().count() > max_len {
                return None;
            }
        }
        if self.reject_prices && looks_like_price(&value) {
            return None;
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.is_match(&value) {
                return None;
            }
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_price_like_brand() {
        let check = FieldCheck::text(Some(60));
        assert_eq!(check.accept("EUR 49.99"), None);
        assert_eq!(check.accept("€ 120"), None);
        assert_eq!(check.accept("  Acne   Studios "), Some("Acne Studios".to_string()));
    }

    #[test]
    fn test_rejects_empty_and_long_values() {
        let check = FieldCheck::text(Some(20));
        assert_eq!(check.accept("   "), None);
        assert_eq!(check.accept("Midnight blue with gold thread"), None);
        assert_eq!(check.accept("Midnight blue"), Some("Midnight blue".to_string()));
    }

    #[test]
    fn test_pattern_rule() {
        let rule = FieldRule {
            pattern: Some(r"^[A-Z0-9\-]+$".to_string()),
            max_len: Some(12),
            ..FieldRule::default()
        };
        let check = FieldCheck::from_rule(&rule);
        assert_eq!(check.accept("AB-123"), Some("AB-123".to_string()));
        assert_eq!(check.accept("Item code AB-123"), None);
    }

    #[test]
    fn test_prices_allowed_for_price_fields() {
        let check = FieldCheck::text(None).allowing_prices();
        assert_eq!(check.accept("EUR 49.99"), Some("EUR 49.99".to_string()));
    }
}
