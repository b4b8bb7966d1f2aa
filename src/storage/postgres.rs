use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{Pool, Postgres};
use tracing::debug;

use crate::cli::config::SinkSettings;
use crate::crawler::product::Product;
use crate::storage::ProductSink;

/// Upserts products into one table keyed by `(source, url)`
pub struct PostgresSink {
    /// PostgreSQL connection pool
    pool: Pool<Postgres>,

    /// Table name, optionally schema-qualified
    table: String,
}

/// Accept `name` or `schema.name` made of plain identifier characters
fn checked_table_name(table: &str) -> Result<String> {
    let valid = !table.is_empty()
        && table.split('.').count() <= 2
        && table
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));

    if !valid {
        anyhow::bail!("Invalid table name: {}", table);
    }
    Ok(table.to_string())
}

fn upsert_query(table: &str) -> String {
    format!(
        "INSERT INTO {} (source, url, data, scraped_at, created_at, updated_at)
         VALUES ($1, $2, $3, $4, NOW(), NOW())
         ON CONFLICT (source, url) DO UPDATE
         SET data = EXCLUDED.data, scraped_at = EXCLUDED.scraped_at, updated_at = NOW()",
        table
    )
}

impl PostgresSink {
    /// Connect and make sure the products table exists
    pub async fn new(settings: &SinkSettings) -> Result<Self> {
        let table = checked_table_name(&settings.table)?;

        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(&settings.connection_string)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let sink = Self { pool, table };
        sink.ensure_table().await?;

        debug!("Connected to PostgreSQL database");
        Ok(sink)
    }

    async fn ensure_table(&self) -> Result<()> {
        let query = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                source TEXT NOT NULL,
                url TEXT NOT NULL,
                data JSONB NOT NULL,
                scraped_at TIMESTAMPTZ NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (source, url)
            )",
            self.table
        );

        sqlx::query(&query)
            .execute(&self.pool)
            .await
            .context(format!("Failed to create products table: {}", self.table))?;

        debug!("Ensured products table exists: {}", self.table);
        Ok(())
    }
}

#[async_trait]
impl ProductSink for PostgresSink {
    async fn store(&self, product: &Product) -> Result<()> {
        sqlx::query(&upsert_query(&self.table))
            .bind(&product.source)
            .bind(&product.url)
            .bind(Json(product))
            .bind(product.scraped_at)
            .execute(&self.pool)
            .await
            .context("Failed to store product in PostgreSQL")?;

        debug!("Stored product {}", product.url);
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        // Every store is its own committed statement
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_name_check() {
        assert_eq!(checked_table_name("products").unwrap(), "products");
        assert_eq!(checked_table_name("catalog.products_v2").unwrap(), "catalog.products_v2");
        assert!(checked_table_name("").is_err());
        assert!(checked_table_name("products; DROP TABLE x").is_err());
        assert!(checked_table_name("a.b.c").is_err());
        assert!(checked_table_name(".products").is_err());
    }

    #[test]
    fn test_upsert_is_keyed_by_source_and_url() {
        let query = upsert_query("catalog.products");
        assert!(query.contains("INSERT INTO catalog.products"));
        assert!(query.contains("ON CONFLICT (source, url) DO UPDATE"));
    }
}
