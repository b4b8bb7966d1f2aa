use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::crawler::product::Product;
use crate::storage::ProductSink;

#[derive(Serialize)]
struct DatasetRecord<'a> {
    key: String,
    #[serde(flatten)]
    product: &'a Product,
}

/// Appends one JSON object per product to a dataset file
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlSink {
    /// Open `path` for appending, creating it and its directory if needed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context(format!("Failed to create directory: {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .context(format!("Failed to open dataset file: {}", path.display()))?;

        debug!("Writing products to {}", path.display());
        Ok(Self { path, file: Mutex::new(file) })
    }
}

#[async_trait]
impl ProductSink for JsonlSink {
    async fn store(&self, product: &Product) -> Result<()> {
        let record = DatasetRecord { key: product.catalog_key(), product };
        let mut line = serde_json::to_vec(&record).context("Failed to serialize product")?;
        line.push(b'\n');

        // One write per line keeps concurrent workers from interleaving records
        let mut file = self.file.lock().await;
        file.write_all(&line)
            .await
            .context(format!("Failed to append to {}", self.path.display()))?;

        debug!("Stored product {}", product.url);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut file = self.file.lock().await;
        file.flush()
            .await
            .context(format!("Failed to flush {}", self.path.display()))?;
        file.sync_data()
            .await
            .context(format!("Failed to sync {}", self.path.display()))?;
        Ok(())
    }
}
