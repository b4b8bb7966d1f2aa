use anyhow::{anyhow, Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::cli::config::{CrawlerConfig, ScrapeOptions};
use crate::crawler::controller::CrawlerController;
use crate::utils::metrics::RunReport;

/// Command-line values that take precedence over the loaded configuration
#[derive(Debug, Default)]
pub struct CrawlOverrides {
    pub max_products: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub max_requests: Option<usize>,
    pub headed: bool,
    pub max_load_clicks: Option<u32>,
    pub output: Option<PathBuf>,
}

impl CrawlOverrides {
    /// Fold the overrides into `config`, so validation sees the values the run will use
    fn apply(self, config: &mut CrawlerConfig) {
        if let Some(path) = self.output {
            config.sink.sink_type = "jsonl".to_string();
            config.sink.path = path.display().to_string();
        }

        let crawler = &mut config.crawler;
        if let Some(n) = self.max_products {
            crawler.max_products = n;
        }
        if let Some(n) = self.max_concurrency {
            crawler.max_concurrency = n;
        }
        if let Some(n) = self.max_requests {
            crawler.max_requests = Some(n);
        }
        if let Some(n) = self.max_load_clicks {
            crawler.max_load_clicks = n;
        }
        if self.headed {
            config.browser.headless = false;
        }
    }
}

/// Run a crawl and print its summary
pub async fn crawl(
    urls: Vec<String>,
    profile: Option<String>,
    overrides: CrawlOverrides,
    execution_id: Option<String>,
) -> Result<()> {
    let mut config = match &profile {
        Some(name) => CrawlerConfig::load_profile(name).context(format!("Failed to load profile: {}", name))?,
        None => CrawlerConfig::load_default().context("Failed to load default configuration")?,
    };

    overrides.apply(&mut config);
    config.validate()?;
    let options = ScrapeOptions::from_config(&config);

    let controller = CrawlerController::new(config).await?;
    let report = match controller.scrape(&urls, &options, execution_id).await {
        Ok(report) => report,
        Err(e) if e.is_fatal() => return Err(anyhow!(e).context("Crawl aborted before any task ran")),
        Err(e) => return Err(e.into()),
    };

    print_report(&report);
    if !report.failures.is_empty() {
        warn!("Crawl {} finished with {} abandoned tasks", report.execution_id, report.failures.len());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    let summary = &report.summary;
    println!("Execution: {}", report.execution_id);
    for product in &report.products {
        println!(
            "  {} | {} | {} | {}",
            product.brand.as_deref().unwrap_or("-"),
            product.name.as_deref().unwrap_or("-"),
            product.current_price.map_or_else(|| "-".to_string(), |p| format!("{:.2}", p)),
            product.url
        );
    }
    println!("Products collected: {}", summary.products_collected);
    println!(
        "Tasks: {} dispatched, {} succeeded, {} retried, {} failed",
        summary.tasks_dispatched, summary.tasks_succeeded, summary.tasks_retried, summary.tasks_failed
    );
    println!("URLs seen: {}", summary.urls_seen);
    println!("Duration: {:.1}s", summary.duration_ms as f64 / 1000.0);

    for quota in &summary.quotas {
        println!(
            "  {} {}: {}/{} enqueued, {} processed",
            quota.seed_id, quota.seed_url, quota.enqueued_count, quota.quota_limit, quota.processed_count
        );
    }

    if !report.failures.is_empty() {
        println!("Failed tasks:");
        for failure in &report.failures {
            println!("  - [{}] {} after {} attempts: {}", failure.kind, failure.url, failure.attempts, failure.error);
        }
    }
}

/// Print the saved site profiles
pub async fn list_profiles() -> Result<()> {
    let profiles = CrawlerConfig::list_profiles().await?;

    if profiles.is_empty() {
        println!("No site profiles saved yet");
    }
    for name in profiles {
        println!("  {}", name);
    }

    Ok(())
}

/// Show a profile, creating it from the defaults if it does not exist
pub async fn manage_profile(profile_name: String) -> Result<()> {
    match CrawlerConfig::load_profile(&profile_name) {
        Ok(config) => {
            println!("# profile: {}", profile_name);
            println!("{}", serde_yaml::to_string(&config)?);
        }
        Err(_) => {
            warn!("Profile {} not found, creating it from the defaults", profile_name);
            let config = CrawlerConfig::default();
            config.save_as_profile(&profile_name).await?;
            info!("Created profile {}", profile_name);
            println!("Created profile {} from the defaults", profile_name);
        }
    }

    Ok(())
}

/// Print the default configuration as YAML
pub async fn show_config() -> Result<()> {
    let config = CrawlerConfig::load_default()?;
        println!("{}", serde_yaml::to_string(&config)?);

    Ok(())
}
