pub mod commands;
pub mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl product listings starting from one or more seed URLs
    Crawl {
        /// Listing URLs to start from
        #[arg(required = true)]
        urls: Vec<String>,

        /// Site profile to use (the default configuration when omitted)
        #[arg(short, long)]
        profile: Option<String>,

        /// Total product budget across all seeds
        #[arg(short = 'n', long)]
        max_products: Option<usize>,

        /// Number of browser pages working in parallel
        #[arg(short = 'c', long)]
        max_concurrency: Option<usize>,

        /// Hard ceiling on dispatched tasks
        #[arg(long)]
        max_requests: Option<usize>,

        /// Show the browser window
        #[arg(long)]
        headed: bool,

        /// "Load more" clicks allowed per listing page
        #[arg(long)]
        max_load_clicks: Option<u32>,

        /// Execution id attached to every log event
        #[arg(long)]
        execution_id: Option<String>,

        /// Write products to this JSONL file instead of the configured sink
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the configuration, or show/create a site profile
    Config {
        /// Site profile to show; created from the defaults when missing
        #[arg(required = false)]
        profile: Option<String>,

        /// List saved site profiles
        #[arg(short, long)]
        list: bool,
    },
}

pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Dispatch a parsed command line to its handler
pub async fn process_command(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Crawl {
            urls,
            profile,
            max_products,
            max_concurrency,
            max_requests,
            headed,
            max_load_clicks,
            execution_id,
            output,
        } => {
            info!("Starting crawl of {} seed URLs", urls.len());
            let overrides = commands::CrawlOverrides {
                max_products,
                max_concurrency,
                max_requests,
                headed,
                max_load_clicks,
                output,
            };
            commands::crawl(urls, profile, overrides, execution_id).await
        }
        Commands::Config { profile, list } => {
            if list {
                info!("Listing site profiles");
                commands::list_profiles().await
            } else if let Some(profile_name) = profile {
                info!("Opening site profile {}", profile_name);
                commands::manage_profile(profile_name).await
            } else {
                info!("Printing default configuration");
                commands::show_config().await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_parse_crawl_flags() {
        let cli = Cli::try_parse_from([
            "crawler",
            "--verbose",
            "crawl",
            "https://shop.test/women",
            "https://shop.test/men",
            "-n",
            "40",
            "--headed",
            "--max-load-clicks",
            "2",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Crawl { urls, max_products, headed, max_load_clicks, max_requests, .. } => {
                assert_eq!(urls.len(), 2);
                assert_eq!(max_products, Some(40));
                assert!(headed);
                assert_eq!(max_load_clicks, Some(2));
                assert_eq!(max_requests, None);
            }
            Commands::Config { .. } => panic!("parsed the wrong subcommand"),
        }
    }
}
