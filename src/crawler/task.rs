use serde::{Serialize, Deserialize};
use chrono::{DateTime, Utc};
use std::fmt;

use crate::crawler::product::{Gender, PartialProduct, Product};
use crate::crawler::quota::SeedId;

/// The two kinds of work the crawler performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskKind {
    /// Extract candidates from a listing page
    List,
    /// Extract a full product record from a detail page
    Detail,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::List => write!(f, "LIST"),
            TaskKind::Detail => write!(f, "DETAIL"),
        }
    }
}

/// Represents a crawling task to be executed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlTask {
    /// URL to crawl (unique among live tasks of a run)
    pub url: String,

    /// Whether this is a listing or a detail page
    pub kind: TaskKind,

    /// Seed this task descends from
    pub seed_id: SeedId,

    /// Listing-card data carried into a DETAIL task
    pub partial: Option<PartialProduct>,

    /// Number of failed attempts so far
    pub attempt: u32,

    /// Listing page number within the seed (1 for the seed itself)
    pub page_number: u32,

    /// Gender hint inherited from the seed URL
    pub gender: Option<Gender>,
}

impl CrawlTask {
    /// Create the LIST task for a seed URL
    pub fn seed(url: &str, seed_id: SeedId) -> Self {
        Self {
            url: url.to_string(),
            kind: TaskKind::List,
            seed_id,
            partial: None,
            attempt: 0,
            page_number: 1,
            gender: Gender::infer_from_url(url),
        }
    }

    /// Create the next LIST task of the same seed
    pub fn next_page(&self, url: String, page_number: u32) -> Self {
        Self {
            url,
            kind: TaskKind::List,
            seed_id: self.seed_id,
            partial: None,
            attempt: 0,
            page_number,
            gender: self.gender,
        }
    }

    /// Create a DETAIL task for a candidate discovered on this listing page
    pub fn detail(&self, url: String, partial: PartialProduct) -> Self {
        Self {
            url,
            kind: TaskKind::Detail,
            seed_id: self.seed_id,
            partial: Some(partial),
            attempt: 0,
            page_number: self.page_number,
            gender: self.gender,
        }
    }

    /// Copy of this task with the attempt counter bumped
    pub fn retried(&self) -> Self {
        let mut task = self.clone();
        task.attempt += 1;
        task
    }
}

/// What a successfully handled task produced
#[derive(Debug, Default)]
pub struct TaskOutput {
    /// Follow-up tasks to enqueue
    pub tasks: Vec<CrawlTask>,

    /// Product extracted from a DETAIL page
    pub product: Option<Product>,
}

/// Record of a task abandoned after exhausting its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFailure {
    /// URL that was being crawled
    pub url: String,

    /// Task kind
    pub kind: TaskKind,

    /// Seed the task belonged to
    pub seed_id: SeedId,

    /// Attempts made before giving up
    pub attempts: u32,

    /// Last error message
    pub error: String,

    /// Timestamp when the task was abandoned
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_task_infers_gender() {
        let task = CrawlTask::seed("https://shop.test/women/dresses", SeedId(0));
        assert_eq!(task.kind, TaskKind::List);
        assert_eq!(task.page_number, 1);
        assert_eq!(task.gender, Some(Gender::Women));

        let detail = task.detail("https://shop.test/p/1".to_string(), PartialProduct::default());
        assert_eq!(detail.kind, TaskKind::Detail);
        assert_eq!(detail.gender, Some(Gender::Women));
        assert_eq!(detail.seed_id, SeedId(0));
    }

    #[test]
    fn test_retried_increments_attempt() {
        let task = CrawlTask::seed("https://shop.test/men", SeedId(1));
        let once = task.retried();
        let twice = once.retried();
        assert_eq!(once.attempt, 1);
        assert_eq!(twice.attempt, 2);
        assert_eq!(task.attempt, 0);
    }
}
