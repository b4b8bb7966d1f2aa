use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use crate::crawler::product::Product;
use crate::crawler::quota::QuotaSnapshot;
use crate::crawler::task::TaskFailure;

/// Counters for one crawl run, shared by all workers
#[derive(Debug)]
pub struct RunStats {
    started_at: DateTime<Utc>,
    clock: Instant,

    /// Tasks handed to a worker, retries included
    dispatched: AtomicUsize,

    succeeded: AtomicUsize,

    /// Tasks abandoned after their last retry
    failed: AtomicUsize,

    retried: AtomicUsize,

    /// Tasks accepted into the queue, seeds included
    enqueued: AtomicUsize,

    products: AtomicUsize,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            clock: Instant::now(),
            dispatched: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            retried: AtomicUsize::new(0),
            enqueued: AtomicUsize::new(0),
            products: AtomicUsize::new(0),
        }
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_succeeded(&self) {
        self.succeeded.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_retried(&self) {
        self.retried.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_enqueued(&self, count: usize) {
        self.enqueued.fetch_add(count, Ordering::SeqCst);
    }

    pub fn record_product(&self) {
        self.products.fetch_add(1, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::SeqCst)
    }

    /// Freeze the counters into a summary
    pub fn summary(&self, urls_seen: usize, quotas: Vec<QuotaSnapshot>) -> RunSummary {
        RunSummary {
            started_at: self.started_at,
            finished_at: Utc::now(),
            duration_ms: self.clock.elapsed().as_millis() as u64,
            tasks_dispatched: self.dispatched.load(Ordering::SeqCst),
            tasks_succeeded: self.succeeded.load(Ordering::SeqCst),
            tasks_failed: self.failed.load(Ordering::SeqCst),
            tasks_retried: self.retried.load(Ordering::SeqCst),
            tasks_enqueued: self.enqueued.load(Ordering::SeqCst),
            products_collected: self.products.load(Ordering::SeqCst),
            urls_seen,
            quotas,
        }
    }
}

/// Serializable end-of-run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub tasks_dispatched: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    pub tasks_retried: usize,
    pub tasks_enqueued: usize,
    pub products_collected: usize,
    pub urls_seen: usize,
    pub quotas: Vec<QuotaSnapshot>,
}

/// Everything a finished run hands back to the caller
#[derive(Debug, Clone)]
pub struct RunReport {
    pub execution_id: String,
    pub products: Vec<Product>,
    pub failures: Vec<TaskFailure>,
    pub summary: RunSummary,
}
