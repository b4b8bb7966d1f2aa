use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::browser::page::{PageDriver, PageLauncher};
use crate::crawler::error::CrawlError;
use crate::crawler::product::Product;
use crate::crawler::task::{CrawlTask, TaskFailure, TaskOutput};
use crate::utils::events::EventLog;
use crate::utils::metrics::RunStats;

/// Work performed for one dispatched task on a worker's page
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, page: &dyn PageDriver, task: &CrawlTask) -> Result<TaskOutput, CrawlError>;
}

/// Execution limits for one run
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Browser pages working in parallel
    pub max_concurrency: usize,

    /// Hard stop on dispatched tasks, retries included
    pub max_requests: usize,

    /// Retries after the first attempt before a task is abandoned
    pub max_retries: u32,

    /// Wall-clock budget of a single attempt
    pub task_timeout: Duration,

    pub headless: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<CrawlTask>,
    in_flight: usize,
    dispatched: usize,
    ceiling_logged: bool,
}

/// FIFO of pending tasks shared by the workers.
///
/// The queue is drained once nothing is pending and no worker is busy, or
/// as soon as `max_requests` tasks have been handed out.
struct TaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    max_requests: usize,
}

impl TaskQueue {
    fn new(seeds: Vec<CrawlTask>, max_requests: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: seeds.into(),
                ..QueueState::default()
            }),
            notify: Notify::new(),
            max_requests,
        }
    }

    /// Next task to run, or `None` once the run is over
    async fn next(&self) -> Option<CrawlTask> {
        loop {
            // Registered before the state check so a completion in between is not missed
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                if state.dispatched >= self.max_requests {
                    if !state.ceiling_logged {
                        state.ceiling_logged = true;
                        warn!(
                            "Request ceiling of {} reached, dropping {} pending tasks",
                            self.max_requests,
                            state.pending.len()
                        );
                    }
                    return None;
                }
                if let Some(task) = state.pending.pop_front() {
                    state.in_flight += 1;
                    state.dispatched += 1;
                    return Some(task);
                }
                if state.in_flight == 0 {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Finish one dispatched task, queueing whatever it produced
    async fn complete(&self, follow_ups: Vec<CrawlTask>) {
        let mut state = self.state.lock().await;
        state.in_flight = state.in_flight.saturating_sub(1);
        state.pending.extend(follow_ups);
        drop(state);
        self.notify.notify_waiters();
    }
}

/// What the workers collected
#[derive(Debug, Default)]
pub struct SchedulerOutcome {
    pub products: Vec<Product>,
    pub failures: Vec<TaskFailure>,
}

/// Runs tasks on a fixed pool of browser pages
pub struct Scheduler {
    config: SchedulerConfig,
    stats: Arc<RunStats>,
    log: EventLog,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig, stats: Arc<RunStats>, log: EventLog) -> Self {
        Self { config, stats, log }
    }

    /// Run until the queue drains or the request ceiling is hit.
    ///
    /// Every page is opened before the first task is dispatched; failing to
    /// open one aborts the run.
    pub async fn run(
        &self,
        launcher: Arc<dyn PageLauncher>,
        handler: Arc<dyn TaskHandler>,
        seeds: Vec<CrawlTask>,
    ) -> Result<SchedulerOutcome, CrawlError> {
        let workers = self.config.max_concurrency.max(1);

        let mut pages: Vec<Box<dyn PageDriver>> = Vec::with_capacity(workers);
        for _ in 0..workers {
            match launcher.launch(self.config.headless).await {
                Ok(page) => pages.push(page),
                Err(e) => {
                    error!("Failed to open browser page: {}", e);
                    for page in &pages {
                        if let Err(e) = page.close().await {
                            debug!("Error closing page: {}", e);
                        }
                    }
                    return Err(if e.is_fatal() { e } else { CrawlError::SessionLaunch(e.to_string()) });
                }
            }
        }

        self.stats.record_enqueued(seeds.len());
        info!("Starting {} workers for {} seed tasks", workers, seeds.len());

        let queue = Arc::new(TaskQueue::new(seeds, self.config.max_requests));
        let products = Arc::new(Mutex::new(Vec::new()));
        let failures = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = pages
            .into_iter()
            .enumerate()
            .map(|(id, page)| {
                let worker = Worker {
                    id,
                    page,
                    queue: queue.clone(),
                    handler: handler.clone(),
                    stats: self.stats.clone(),
                    log: self.log.clone(),
                    config: self.config.clone(),
                    products: products.clone(),
                    failures: failures.clone(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        for result in join_all(handles).await {
            if let Err(e) = result {
                error!("Worker panicked: {}", e);
            }
        }

        let products = std::mem::take(&mut *products.lock().await);
        let failures = std::mem::take(&mut *failures.lock().await);
        Ok(SchedulerOutcome { products, failures })
    }
}

struct Worker {
    id: usize,
    page: Box<dyn PageDriver>,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn TaskHandler>,
    stats: Arc<RunStats>,
    log: EventLog,
    config: SchedulerConfig,
    products: Arc<Mutex<Vec<Product>>>,
    failures: Arc<Mutex<Vec<TaskFailure>>>,
}

impl Worker {
    async fn run(self) {
        debug!("Worker {} started", self.id);

        while let Some(task) = self.queue.next().await {
            self.stats.record_dispatched();
            self.log.info(
                "Task started",
                json!({ "url": task.url, "kind": task.kind, "seed": task.seed_id, "attempt": task.attempt, "worker": self.id }),
            );

            let budget = self.config.task_timeout;
            let result = match timeout(budget, self.handler.handle(&*self.page, &task)).await {
                Ok(result) => result,
                Err(_) => Err(CrawlError::Timeout(budget)),
            };

            let follow_ups = match result {
                Ok(output) => self.succeeded(&task, output).await,
                Err(e) => self.failed(&task, e).await,
            };
            self.queue.complete(follow_ups).await;
        }

        if let Err(e) = self.page.close().await {
            debug!("Worker {} could not close its page: {}", self.id, e);
        }
        debug!("Worker {} finished", self.id);
    }

    async fn succeeded(&self, task: &CrawlTask, output: TaskOutput) -> Vec<CrawlTask> {
        self.stats.record_succeeded();
        self.stats.record_enqueued(output.tasks.len());
        self.log.info(
            "Task succeeded",
            json!({
                "url": task.url,
                "kind": task.kind,
                "seed": task.seed_id,
                "follow_ups": output.tasks.len(),
                "product": output.product.is_some(),
            }),
        );

        if let Some(product) = output.product {
            self.stats.record_product();
            self.products.lock().await.push(product);
        }
        output.tasks
    }

    async fn failed(&self, task: &CrawlTask, err: CrawlError) -> Vec<CrawlTask> {
        let retry = task.retried();
        if retry.attempt <= self.config.max_retries {
            self.stats.record_retried();
            self.log.warn(
                "Task failed, retrying",
                json!({ "url": task.url, "kind": task.kind, "attempt": retry.attempt, "error": err.to_string() }),
            );
            return vec![retry];
        }

        self.stats.record_failed();
        self.log.error(
            "Task abandoned",
            json!({ "url": task.url, "kind": task.kind, "attempts": retry.attempt, "error": err.to_string() }),
        );
        self.failures.lock().await.push(TaskFailure {
            url: task.url.clone(),
            kind: task.kind,
            seed_id: task.seed_id,
            attempts: retry.attempt,
            error: err.to_string(),
            occurred_at: Utc::now(),
        });
        Vec::new()
    }
}
