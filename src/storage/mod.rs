pub mod dataset;
pub mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use crate::cli::config::SinkSettings;
use crate::crawler::product::Product;

// Re-export common types
pub use dataset::JsonlSink;
pub use postgres::PostgresSink;

/// Destination for finished product records
#[async_trait]
pub trait ProductSink: Send + Sync {
    /// Store one product; storing the same `(source, url)` again replaces it
    async fn store(&self, product: &Product) -> Result<()>;

    /// Make everything stored so far durable
    async fn flush(&self) -> Result<()>;
}

/// Factory for creating a ProductSink implementation
pub struct ProductSinkFactory;

impl ProductSinkFactory {
    /// Create a new ProductSink instance based on the settings
    pub async fn create(settings: &SinkSettings) -> Result<Arc<dyn ProductSink>> {
        match settings.sink_type.as_str() {
            "jsonl" => {
                let sink = JsonlSink::open(&settings.path).await?;
                Ok(Arc::new(sink))
            }
            "postgresql" => {
                let sink = PostgresSink::new(settings).await?;
                Ok(Arc::new(sink))
            }
            _ => {
                anyhow::bail!("Unsupported sink type: {}", settings.sink_type);
            }
        }
    }
}
