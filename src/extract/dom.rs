use scraper::{ElementRef, Html, Selector};

use crate::sites::Probe;

/// Collapse runs of whitespace and trim
pub fn clean_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn selector(css: &str) -> Option<Selector> {
    // Profiles are validated up front; an unparsable selector simply matches nothing
    Selector::parse(css).ok()
}

fn read(element: ElementRef<'_>, probe: &Probe) -> Option<String> {
    let value = match &probe.attr {
        Some(attr) => element.value().attr(attr).map(clean_text)?,
        None => clean_text(&element.text().collect::<String>()),
    };
    (!value.is_empty()).then_some(value)
}

/// Every non-empty value of a probe in the document, in document order
pub fn all(doc: &Html, probe: &Probe) -> Vec<String> {
    match selector(&probe.css) {
        Some(selector) => doc.select(&selector).filter_map(|el| read(el, probe)).collect(),
        None => Vec::new(),
    }
}

/// First non-empty value of any probe, tried in order, within one element
pub fn first_within(scope: ElementRef<'_>, probes: &[Probe]) -> Option<String> {
    probes.iter().find_map(|probe| {
        let selector = selector(&probe.css)?;
        scope.select(&selector).find_map(|el| read(el, probe))
    })
}

/// All elements of the document matching `css`
pub fn elements<'a>(doc: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match selector(css) {
        Some(selector) => doc.select(&selector).collect(),
        None => Vec::new(),
    }
}

/// First URL of a `srcset`-style value (`a.jpg 1x, b.jpg 2x`)
pub fn first_src(value: &str) -> Option<String> {
    let candidate = value.split(',').next()?.split_whitespace().next()?;
    (!candidate.is_empty()).then(|| candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"
        <html><body>
          <h1 class="title">  Silk
             Dress </h1>
          <ul class="sizes"><li>S</li><li> </li><li>M</li></ul>
          <article class="card"><a class="link" href="/p/1">One</a><span class="brand">Acne</span></article>
          <meta itemprop="sku" content="AB-123">
        </body></html>
    "#;

    #[test]
    fn test_all_values() {
        let doc = Html::parse_document(HTML);
        assert_eq!(all(&doc, &Probe::text("h1.title")), vec!["Silk Dress"]);
        assert_eq!(all(&doc, &Probe::attr("meta[itemprop='sku']", "content")), vec!["AB-123"]);
        assert_eq!(all(&doc, &Probe::text("ul.sizes li")), vec!["S", "M"]);
        assert!(all(&doc, &Probe::text("h2")).is_empty());
        assert!(all(&doc, &Probe::text("div[[")).is_empty());
    }

    #[test]
    fn test_within_card() {
        let doc = Html::parse_document(HTML);
        let cards = elements(&doc, "article.card");
        assert_eq!(cards.len(), 1);
        let probes = vec![Probe::attr("a.missing", "href"), Probe::attr("a.link", "href")];
        assert_eq!(first_within(cards[0], &probes), Some("/p/1".to_string()));
        assert_eq!(first_within(cards[0], &[Probe::text(".brand")]), Some("Acne".to_string()));
        assert_eq!(first_within(cards[0], &[Probe::text(".price")]), None);
    }

    #[test]
    fn test_first_src() {
        assert_eq!(first_src("/a.jpg 1x, /b.jpg 2x"), Some("/a.jpg".to_string()));
        assert_eq!(first_src("/a.jpg"), Some("/a.jpg".to_string()));
        assert_eq!(first_src(" "), None);
    }
}
