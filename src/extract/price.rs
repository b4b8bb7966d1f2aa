use regex::Regex;
use std::sync::OnceLock;

fn price_like() -> Option<&'static Regex> {
    static PRICE_LIKE: OnceLock<Option<Regex>> = OnceLock::new();
    PRICE_LIKE
        .get_or_init(|| {
            Regex::new(
                r"(?ix)
                ^\s*(usd|eur|gbp|chf|sek|nok|dkk|pln|aud|cad|jpy|us\$|€|\$|£|¥)\s*\d
                |
                ^\s*\d[\d.,\s]*\s*(usd|eur|gbp|chf|sek|nok|dkk|pln|aud|cad|jpy|€|\$|£|¥)\s*$",
            )
            .ok()
        })
        .as_ref()
}

/// Whether a string looks like a currency amount rather than a label
pub fn looks_like_price(text: &str) -> bool {
    price_like().map_or(false, |re| re.is_match(text))
}

/// Parse a displayed price such as `€1.299,00`, `$1,299.00` or `49,90 EUR`
pub fn parse_price(text: &str) -> Option<f64> {
    // Keep only the first numeric run so "€40 €50" doesn't merge into one number
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let numeric: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.' || *c == ',' || *c == '\u{a0}' || *c == ' ' || *c == '\'')
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let numeric = numeric.trim_end_matches(|c: char| c == '.' || c == ',');

    let last_dot = numeric.rfind('.');
    let last_comma = numeric.rfind(',');

    let normalized = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) => {
            // Whichever separator comes last is the decimal one
            if dot > comma {
                numeric.replace(',', "")
            } else {
                numeric.replace('.', "").replace(',', ".")
            }
        }
        (None, Some(comma)) => {
            let decimals = numeric.len() - comma - 1;
            if decimals == 3 && numeric.matches(',').count() >= 1 && comma > 0 {
                // "1,299" is a thousands separator
                numeric.replace(',', "")
            } else {
                numeric.replace(',', ".")
            }
        }
        (Some(dot), None) => {
            let decimals = numeric.len() - dot - 1;
            if decimals == 3 && numeric.matches('.').count() > 1 {
                numeric.replace('.', "")
            } else if decimals == 3 && dot <= 3 && numeric.len() > 4 {
                // "1.299" reads as 1299 on European storefronts
                numeric.replace('.', "")
            } else {
                numeric.to_string()
            }
        }
        (None, None) => numeric.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}
