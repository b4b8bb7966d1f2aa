use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::browser::behavior::BehaviorSimulator;
use crate::browser::gate::ResourceGate;
use crate::browser::interstitial::InterstitialHandler;
use crate::browser::page::{PageDriver, PageLauncher};
use crate::browser::session::WebDriverLauncher;
use crate::cli::config::{CrawlerConfig, ScrapeOptions};
use crate::crawler::dedup::{DedupGate, DedupOutcome, ExistenceCheck, HttpExistenceCheck};
use crate::crawler::error::CrawlError;
use crate::crawler::frontier::{normalize_url, DomainScope, SeenUrlSet};
use crate::crawler::listing::{ListPageProcessor, ListingPage, RevealLimits};
use crate::crawler::pagination::PaginationNavigator;
use crate::crawler::quota::{QuotaAllocator, SeedId};
use crate::crawler::scheduler::{Scheduler, SchedulerConfig, TaskHandler};
use crate::crawler::task::{CrawlTask, TaskKind, TaskOutput};
use crate::extract::ProductExtractor;
use crate::sites::SiteProfile;
use crate::storage::{ProductSink, ProductSinkFactory};
use crate::utils::events::{EventLog, LogSink, TracingSink};
use crate::utils::metrics::{RunReport, RunStats};

/// LIST and DETAIL handling for one run
struct CatalogHandler {
    quotas: Arc<QuotaAllocator>,
    seen: Arc<SeenUrlSet>,
    interstitial: InterstitialHandler,
    listing: ListPageProcessor,
    dedup: DedupGate,
    pagination: PaginationNavigator,
    extractor: ProductExtractor,
    sink: Arc<dyn ProductSink>,
    log: EventLog,
}

impl CatalogHandler {
    async fn list(&self, page: &dyn PageDriver, task: &CrawlTask) -> Result<TaskOutput, CrawlError> {
        let remaining = self.quotas.remaining(task.seed_id);
        if remaining == 0 {
            debug!("{} is at quota, skipping {}", task.seed_id, task.url);
            return Ok(TaskOutput::default());
        }

        page.goto(&task.url).await?;
        self.interstitial.clear(page, task.gender, &self.log).await;

        let ListingPage { candidates, card_count, page_url } =
            self.listing.process(page, task, remaining, &self.seen).await?;
        let DedupOutcome { fresh, existing } = self.dedup.filter_new(candidates, &self.log).await;

        let planned = remaining.saturating_sub(fresh.len());
        let next = if planned > 0 {
            self.pagination.find_next(page, task, &page_url, &self.seen, card_count).await?
        } else {
            None
        };

        // Nothing below awaits, so a timed-out attempt never leaves half of a page enqueued
        for url in &existing {
            self.seen.insert(url);
        }

        let mut tasks = Vec::new();
        for candidate in fresh {
            if !self.seen.insert(&candidate.url) {
                continue;
            }
            if !self.quotas.try_reserve(task.seed_id) {
                self.seen.release(&candidate.url);
                break;
            }
            tasks.push(task.detail(candidate.url, candidate.partial));
        }
        let details = tasks.len();

        if self.quotas.remaining(task.seed_id) > 0 {
            if let Some(next) = next {
                if self.seen.insert(&next.url) {
                    tasks.push(task.next_page(next.url, next.page_number));
                }
            }
        }

        debug!(
            "Page {} of {}: {} detail tasks, {} already catalogued, next page: {}",
            task.page_number,
            task.seed_id,
            details,
            existing.len(),
            tasks.len() > details
        );
        Ok(TaskOutput { tasks, product: None })
    }

    async fn detail(&self, page: &dyn PageDriver, task: &CrawlTask) -> Result<TaskOutput, CrawlError> {
        page.goto(&task.url).await?;
        self.interstitial.clear(page, task.gender, &self.log).await;

        let html = page.html().await?;
        let page_url = page.current_url().await.unwrap_or_else(|_| task.url.clone());
        let extraction = self.extractor.extract(&html, &page_url, task);

        if !extraction.missing.is_empty() {
            self.log.warn(
                "Required fields missing",
                json!({ "url": task.url, "missing": extraction.missing }),
            );
        }

        if !extraction.fallbacks.is_empty() {
            let fields: serde_json::Map<String, serde_json::Value> = extraction
                .fallbacks
                .iter()
                .map(|(field, strategy)| (field.to_string(), json!(strategy.to_string())))
                .collect();
            self.log.debug("Fields filled by fallback strategies", json!({ "url": task.url, "fields": fields }));
        }

        let product = extraction.product;
        if let Err(e) = self.sink.store(&product).await {
            self.log.error(
                "Failed to store product",
                json!({ "url": product.url, "error": format!("{:#}", e) }),
            );
        }

        self.quotas.mark_processed(task.seed_id);
        Ok(TaskOutput { tasks: Vec::new(), product: Some(product) })
    }
}

#[async_trait]
impl TaskHandler for CatalogHandler {
    async fn handle(&self, page: &dyn PageDriver, task: &CrawlTask) -> Result<TaskOutput, CrawlError> {
        match task.kind {
            TaskKind::List => self.list(page, task).await,
            TaskKind::Detail => self.detail(page, task).await,
        }
    }
}

/// Seed URLs in order, normalized and without duplicates
fn prepare_seeds(start_urls: &[String]) -> Result<Vec<String>, CrawlError> {
    let mut seeds: Vec<String> = Vec::new();
    for raw in start_urls {
        let url = Url::parse(raw.trim()).map_err(|e| CrawlError::Config(format!("invalid start URL '{}': {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CrawlError::Config(format!("start URL '{}' is not http(s)", raw)));
        }

        let url = normalize_url(url.as_str());
        if !seeds.contains(&url) {
            seeds.push(url);
        }
    }

    if seeds.is_empty() {
        return Err(CrawlError::Config("no start URLs given".to_string()));
    }
    Ok(seeds)
}

/// Wires the crawl components together and runs crawls
pub struct CrawlerController {
    config: CrawlerConfig,
    launcher: Arc<dyn PageLauncher>,
    existence: Option<Arc<dyn ExistenceCheck>>,
    sink: Arc<dyn ProductSink>,
    log_sink: Arc<dyn LogSink>,
}

impl CrawlerController {
    /// Create a controller backed by WebDriver, the configured sink and,
    /// when an endpoint is set, the catalog existence check
    pub async fn new(config: CrawlerConfig) -> Result<Self> {
        let gate = ResourceGate::new(config.site.gate.clone());
        let launcher = Arc::new(WebDriverLauncher::new(config.browser.clone(), gate));

        let sink = ProductSinkFactory::create(&config.sink)
            .await
            .context(format!("Failed to open {} sink", config.sink.sink_type))?;

        let mut controller = Self::with_components(config, launcher, sink);

        if let Some(endpoint) = controller.config.dedup.endpoint.clone() {
            let timeout = Duration::from_secs(controller.config.dedup.timeout_secs);
            let check = HttpExistenceCheck::new(&endpoint, timeout)
                .context(format!("Failed to create existence-check client for {}", endpoint))?;
            controller = controller.with_existence_check(Arc::new(check));
        }

        Ok(controller)
    }

    /// Controller over explicit components, without deduplication
    pub fn with_components(config: CrawlerConfig, launcher: Arc<dyn PageLauncher>, sink: Arc<dyn ProductSink>) -> Self {
        Self {
            config,
            launcher,
            existence: None,
            sink,
            log_sink: Arc::new(TracingSink),
        }
    }

    pub fn with_existence_check(mut self, check: Arc<dyn ExistenceCheck>) -> Self {
        self.existence = Some(check);
        self
    }

    /// Route run events somewhere other than `tracing`
    #[cfg(test)]
    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = sink;
        self
    }

    /// Crawl `start_urls` within the limits of `options`.
    ///
    /// Invalid configuration and browser launch failures abort the run
    /// before any task is dispatched; everything else is absorbed per task
    /// and shows up in the report.
    pub async fn scrape(
        &self,
        start_urls: &[String],
        options: &ScrapeOptions,
        execution_id: Option<String>,
    ) -> Result<RunReport, CrawlError> {
        let execution_id = execution_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let log = EventLog::new(execution_id.clone(), self.log_sink.clone());

        let seeds = match self.prepare(start_urls, options) {
            Ok(seeds) => seeds,
            Err(e) => {
                log.error("Crawl aborted", json!({ "error": e.to_string() }));
                return Err(e);
            }
        };

        let profile = Arc::new(self.config.site.clone());
        let quotas = Arc::new(QuotaAllocator::allocate(&seeds, options.max_products));
        let seen = Arc::new(SeenUrlSet::new());
        for seed in &seeds {
            seen.insert(seed);
        }

        let handler = self.handler(profile.clone(), &seeds, options, quotas.clone(), seen.clone(), log.clone());
        let seed_tasks: Vec<CrawlTask> = seeds
            .iter()
            .enumerate()
            .map(|(index, url)| CrawlTask::seed(url, SeedId(index)))
            .collect();

        let scheduler_config = SchedulerConfig {
            max_concurrency: options.max_concurrency,
            max_requests: options.request_ceiling(),
            max_retries: self.config.crawler.max_retries,
            task_timeout: Duration::from_secs(self.config.crawler.task_timeout_secs),
            headless: options.headless,
        };

        info!("Crawl {} started with {} seeds", execution_id, seeds.len());
        log.info(
            "Crawl started",
            json!({
                "seeds": seeds,
                "source": profile.source,
                "max_products": options.max_products,
                "max_concurrency": options.max_concurrency,
                "max_requests": scheduler_config.max_requests,
                "per_seed_quota": quotas.snapshot().first().map(|q| q.quota_limit),
                "quota_total": quotas.total_limit(),
            }),
        );

        let stats = Arc::new(RunStats::new());
        let scheduler = Scheduler::new(scheduler_config, stats.clone(), log.clone());
        let outcome = match scheduler.run(self.launcher.clone(), handler, seed_tasks).await {
            Ok(outcome) => outcome,
            Err(e) => {
                log.error("Crawl aborted", json!({ "error": e.to_string() }));
                return Err(e);
            }
        };

        if let Err(e) = self.sink.flush().await {
            log.error("Failed to flush product sink", json!({ "error": format!("{:#}", e) }));
        }

        let summary = stats.summary(seen.len(), quotas.snapshot());
        log.info(
            "Crawl finished",
            serde_json::to_value(&summary).unwrap_or_else(|_| json!({})),
        );
        info!(
            "Crawl {} finished: {} products, {} failed tasks",
            execution_id,
            outcome.products.len(),
            outcome.failures.len()
        );

        Ok(RunReport {
            execution_id: log.execution_id().to_string(),
            products: outcome.products,
            failures: outcome.failures,
            summary,
        })
    }

    fn prepare(&self, start_urls: &[String], options: &ScrapeOptions) -> Result<Vec<String>, CrawlError> {
        self.config.validate()?;
        options.validate()?;
        prepare_seeds(start_urls)
    }

    fn handler(
        &self,
        profile: Arc<SiteProfile>,
        seeds: &[String],
        options: &ScrapeOptions,
        quotas: Arc<QuotaAllocator>,
        seen: Arc<SeenUrlSet>,
        log: EventLog,
    ) -> Arc<CatalogHandler> {
        let settings = &self.config.crawler;
        let behavior = BehaviorSimulator::new(self.config.browser.behavior.clone());
        let scope = DomainScope::new(&profile.allowed_domains, seeds);
        let limits = RevealLimits {
            max_scroll_steps: settings.max_scroll_steps,
            max_load_clicks: options.max_load_clicks,
        };

        Arc::new(CatalogHandler {
            quotas,
            seen,
            interstitial: InterstitialHandler::new(profile.interstitial.clone()),
            listing: ListPageProcessor::new(profile.listing.clone(), scope, behavior.clone(), limits),
            dedup: DedupGate::new(self.existence.clone(), &profile.source, settings.dedup_batch_size),
            pagination: PaginationNavigator::new(profile.pagination.clone(), behavior, settings.max_page_depth),
            extractor: ProductExtractor::new(profile),
            sink: self.sink.clone(),
            log,
        })
    }
}
