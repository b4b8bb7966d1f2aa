use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Index of a seed URL within a crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeedId(pub usize);

impl fmt::Display for SeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seed-{}", self.0)
    }
}

/// Per-seed product budget with monotonic counters.
///
/// `enqueued <= quota_limit` and `processed <= enqueued` hold at every
/// instant; both counters only ever go up.
#[derive(Debug)]
pub struct SeedQuota {
    pub seed_id: SeedId,
    pub seed_url: String,
    pub quota_limit: usize,
    enqueued: AtomicUsize,
    processed: AtomicUsize,
}

impl SeedQuota {
    fn new(seed_id: SeedId, seed_url: &str, quota_limit: usize) -> Self {
        Self {
            seed_id,
            seed_url: seed_url.to_string(),
            quota_limit,
            enqueued: AtomicUsize::new(0),
            processed: AtomicUsize::new(0),
        }
    }

    pub fn enqueued_count(&self) -> usize {
        self.enqueued.load(Ordering::SeqCst)
    }

    pub fn processed_count(&self) -> usize {
        self.processed.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> usize {
        self.quota_limit.saturating_sub(self.enqueued_count())
    }

    /// Claim one slot; fails once the seed is at quota
    fn try_reserve(&self) -> bool {
        let limit = self.quota_limit;
        self.enqueued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < limit).then_some(n + 1))
            .is_ok()
    }

    fn mark_processed(&self) -> bool {
        let enqueued = &self.enqueued;
        self.processed
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
                (p < enqueued.load(Ordering::SeqCst)).then_some(p + 1)
            })
            .is_ok()
    }
}

/// Point-in-time view of one seed's counters, used in run summaries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    pub seed_id: SeedId,
    pub seed_url: String,
    pub quota_limit: usize,
    pub enqueued_count: usize,
    pub processed_count: usize,
}

/// Splits the global product budget across seeds and tracks usage
#[derive(Debug)]
pub struct QuotaAllocator {
    /// Arena of quotas indexed by `SeedId`
    quotas: Vec<SeedQuota>,
}

impl QuotaAllocator {
    /// Split `total_budget` across the seeds with ceiling division, so every
    /// seed gets at least one slot when the budget is positive
    pub fn allocate(seed_urls: &[String], total_budget: usize) -> Self {
        let seed_count = seed_urls.len();
        let per_seed = if seed_count == 0 {
            0
        } else {
            (total_budget + seed_count - 1) / seed_count
        };

        let quotas = seed_urls
            .iter()
            .enumerate()
            .map(|(index, url)| SeedQuota::new(SeedId(index), url, per_seed))
            .collect();

        Self { quotas }
    }

    pub fn get(&self, seed_id: SeedId) -> Option<&SeedQuota> {
        self.quotas.get(seed_id.0)
    }

    /// Slots left for a seed; unknown seeds have none
    pub fn remaining(&self, seed_id: SeedId) -> usize {
        self.get(seed_id).map_or(0, SeedQuota::remaining)
    }

    /// Atomically claim one DETAIL slot for a seed
    pub fn try_reserve(&self, seed_id: SeedId) -> bool {
        self.get(seed_id).map_or(false, SeedQuota::try_reserve)
    }

    /// Record that a DETAIL task of this seed finished extraction
    pub fn mark_processed(&self, seed_id: SeedId) -> bool {
        self.get(seed_id).map_or(false, SeedQuota::mark_processed)
    }

    /// Sum of all seed limits; the budget rounded up to a multiple of the seed count
    pub fn total_limit(&self) -> usize {
        self.quotas.iter().map(|q| q.quota_limit).sum()
    }

    pub fn snapshot(&self) -> Vec<QuotaSnapshot> {
        self.quotas
            .iter()
            .map(|q| QuotaSnapshot {
                seed_id: q.seed_id,
                seed_url: q.seed_url.clone(),
                quota_limit: q.quota_limit,
                enqueued_count: q.enqueued_count(),
                processed_count: q.processed_count(),
            })
            .collect()
    }
}
