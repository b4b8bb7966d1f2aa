use tracing::debug;
use url::Url;

use crate::browser::behavior::BehaviorSimulator;
use crate::browser::page::PageDriver;
use crate::crawler::error::CrawlError;
use crate::crawler::frontier::{resolve_url, SeenUrlSet};
use crate::crawler::task::CrawlTask;
use crate::sites::PaginationRules;

/// Next listing page found on the current one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextPage {
    pub url: String,
    pub page_number: u32,
}

fn query_value(url: &str, names: &[String]) -> Option<u64> {
    let parsed = Url::parse(url).ok()?;
    let params: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    names
        .iter()
        .find_map(|name| params.iter().find(|(k, _)| k == name).and_then(|(_, v)| v.parse::<u64>().ok()))
}

/// Page number the next-page URL `url` points at, seen from `current_url`.
///
/// Page-index parameters are read as-is. Item offsets are divided by the
/// page size, which is the profile's `page_size`, else the offset step
/// between the current and the next URL. A next offset reached from a page
/// without one (the seed) is page `current_page + 1`. The number of cards
/// read from the current page is the last resort, since revealing stops
/// early once the quota is covered. URLs with neither parameter count as
/// the page after `current_page`.
pub fn infer_page_number(
    url: &str,
    current_url: &str,
    rules: &PaginationRules,
    current_page: u32,
    cards_per_page: usize,
) -> u32 {
    let following = current_page.saturating_add(1);

    if let Some(page) = query_value(url, &rules.page_params) {
        return u32::try_from(page).unwrap_or(u32::MAX).max(1);
    }

    let Some(offset) = query_value(url, &rules.offset_params) else {
        return following;
    };

    let size = match (rules.page_size, query_value(current_url, &rules.offset_params)) {
        (Some(size), _) => u64::from(size),
        (None, Some(current)) if offset > current => offset - current,
        (None, None) => return following,
        (None, Some(_)) => cards_per_page as u64,
    };

    if size == 0 {
        return following;
    }
    u32::try_from(offset / size + 1).unwrap_or(u32::MAX)
}

/// Finds the next listing page of a seed
pub struct PaginationNavigator {
    rules: PaginationRules,
    behavior: BehaviorSimulator,
    max_page_depth: u32,
    scroll_attempts: u32,
}

impl PaginationNavigator {
    pub fn new(rules: PaginationRules, behavior: BehaviorSimulator, max_page_depth: u32) -> Self {
        Self {
            rules,
            behavior,
            max_page_depth,
            scroll_attempts: 3,
        }
    }

    async fn next_href(&self, page: &dyn PageDriver) -> Result<Option<String>, CrawlError> {
        for css in &self.rules.next {
            if let Some(href) = page.visible_attr(css, "href").await? {
                if !href.trim().is_empty() {
                    return Ok(Some(href));
                }
            }
        }
        Ok(None)
    }

    /// Locate a visible next-page control; scrolls toward the bottom a few
    /// times since pagination often renders late
    pub async fn find_next(
        &self,
        page: &dyn PageDriver,
        task: &CrawlTask,
        page_url: &str,
        seen: &SeenUrlSet,
        cards_on_page: usize,
    ) -> Result<Option<NextPage>, CrawlError> {
        let mut href = self.next_href(page).await?;
        let mut attempts = 0;
        while href.is_none() && attempts < self.scroll_attempts {
            self.behavior.scroll_to_end(page).await?;
            href = self.next_href(page).await?;
            attempts += 1;
        }

        let Some(href) = href else {
            debug!("No next-page control on {}", task.url);
            return Ok(None);
        };

        let Some(url) = resolve_url(page_url, &href) else {
            debug!("Unusable next-page target '{}' on {}", href, task.url);
            return Ok(None);
        };

        if seen.contains(&url) {
            debug!("Next page {} already seen", url);
            return Ok(None);
        }

        let page_number = infer_page_number(&url, page_url, &self.rules, task.page_number, cards_on_page);
        if page_number <= task.page_number {
            debug!("Next link {} points back to page {}, not following", url, page_number);
            return Ok(None);
        }
        if page_number > self.max_page_depth {
            debug!("Page {} is beyond the maximum depth of {}", page_number, self.max_page_depth);
            return Ok(None);
        }

        Ok(Some(NextPage { url, page_number }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::quota::SeedId;
    use crate::testing::{instant_behavior, FakeSite, SEED_PATH};

    fn rules() -> PaginationRules {
        PaginationRules {
            next: vec!["a.next".to_string()],
            page_params: vec!["page".to_string(), "p".to_string()],
            offset_params: vec!["start".to_string(), "offset".to_string()],
            page_size: None,
        }
    }

    const WOMEN: &str = "https://shop.test/women";

    #[test]
    fn test_infer_page_index_style() {
        assert_eq!(infer_page_number("https://shop.test/women?page=4", WOMEN, &rules(), 3, 24), 4);
        assert_eq!(infer_page_number("https://shop.test/women?p=2&sort=new", WOMEN, &rules(), 1, 24), 2);
        assert_eq!(infer_page_number("https://shop.test/women?page=0", WOMEN, &rules(), 1, 24), 1);
    }

    #[test]
    fn test_infer_offset_from_step_between_pages() {
        let current = "https://shop.test/women?start=24";
        assert_eq!(infer_page_number("https://shop.test/women?start=48", current, &rules(), 2, 24), 3);
        // Only 8 cards were revealed on a 24-item page; the step still gives the size
        assert_eq!(infer_page_number("https://shop.test/women?start=48", current, &rules(), 2, 8), 3);

        let sized = PaginationRules { page_size: Some(60), ..rules() };
        assert_eq!(infer_page_number("https://shop.test/women?start=120", WOMEN, &sized, 1, 24), 3);
    }

    #[test]
    fn test_offset_from_seed_is_second_page() {
        // Seed revealed 8 of 24 cards before the quota was covered
        assert_eq!(infer_page_number("https://shop.test/women?start=24", WOMEN, &rules(), 1, 8), 2);
        assert_eq!(infer_page_number("https://shop.test/women?offset=0", WOMEN, &rules(), 1, 24), 2);
    }

    #[test]
    fn test_offset_falls_back_to_card_count() {
        // A next offset that does not advance leaves only the card count
        let current = "https://shop.test/women?start=48";
        assert_eq!(infer_page_number("https://shop.test/women?start=24", current, &rules(), 3, 24), 2);
        assert_eq!(infer_page_number("https://shop.test/women?start=24", current, &rules(), 3, 0), 4);
    }

    #[test]
    fn test_infer_falls_back_to_next_page() {
        assert_eq!(infer_page_number("https://shop.test/women/page/7", WOMEN, &rules(), 2, 24), 3);
        assert_eq!(infer_page_number("not a url", WOMEN, &rules(), 1, 24), 2);
    }

    fn navigator(max_depth: u32) -> PaginationNavigator {
        PaginationNavigator::new(FakeSite::profile().pagination, BehaviorSimulator::new(instant_behavior()), max_depth)
    }

    #[tokio::test]
    async fn test_find_next_on_listing() {
        let site = FakeSite::builder().listing(SEED_PATH, 3).build();
        let tab = site.tab();
        tab.goto(&FakeSite::seed_url()).await.unwrap();

        let task = CrawlTask::seed(&FakeSite::seed_url(), SeedId(0));
        let next = navigator(10).find_next(&tab, &task, &task.url, &SeenUrlSet::new(), 4).await.unwrap();
        assert_eq!(
            next,
            Some(NextPage { url: FakeSite::listing_url(SEED_PATH, 2), page_number: 2 })
        );
    }

    #[tokio::test]
    async fn test_last_page_has_no_next() {
        let site = FakeSite::builder().listing(SEED_PATH, 2).build();
        let tab = site.tab();
        let url = FakeSite::listing_url(SEED_PATH, 2);
        tab.goto(&url).await.unwrap();

        let task = CrawlTask::seed(&FakeSite::seed_url(), SeedId(0)).next_page(url, 2);
        assert_eq!(navigator(10).find_next(&tab, &task, &task.url, &SeenUrlSet::new(), 4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_seen_next_page_is_a_cycle() {
        let site = FakeSite::builder().build();
        let tab = site.tab();
        tab.goto(&FakeSite::seed_url()).await.unwrap();

        let seen = SeenUrlSet::new();
        seen.insert(&FakeSite::listing_url(SEED_PATH, 2));

        let task = CrawlTask::seed(&FakeSite::seed_url(), SeedId(0));
        assert_eq!(navigator(10).find_next(&tab, &task, &task.url, &seen, 4).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let site = FakeSite::builder().listing(SEED_PATH, 5).build();
        let tab = site.tab();
        let url = FakeSite::listing_url(SEED_PATH, 2);
        tab.goto(&url).await.unwrap();

        let task = CrawlTask::seed(&FakeSite::seed_url(), SeedId(0)).next_page(url, 2);
        assert_eq!(navigator(2).find_next(&tab, &task, &task.url, &SeenUrlSet::new(), 4).await.unwrap(), None);
        assert!(navigator(3).find_next(&tab, &task, &task.url, &SeenUrlSet::new(), 4).await.unwrap().is_some());
    }
}
