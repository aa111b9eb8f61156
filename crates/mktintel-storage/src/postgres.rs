use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mktintel_core::{Category, RemoteRecord};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

use crate::{RecordFilter, StoreError, StoreGateway};

/// PostgreSQL backend over the `market_records` table (see `migrations/`).
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreGateway for PgStore {
    async fn count(&self, category: Category) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM market_records WHERE category = $1")
            .bind(category.slug())
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn upsert(&self, category: Category, records: &[RemoteRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO market_records (category, natural_key, data_json, content_hash, fetched_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, NOW())
                ON CONFLICT (category, natural_key) DO UPDATE
                   SET data_json = EXCLUDED.data_json,
                       content_hash = EXCLUDED.content_hash,
                       fetched_at = EXCLUDED.fetched_at,
                       updated_at = NOW()
                "#,
            )
            .bind(category.slug())
            .bind(&record.key)
            .bind(&record.data)
            .bind(record.content_hash())
            .bind(record.fetched_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(
        &self,
        category: Category,
        filter: Option<&RecordFilter>,
    ) -> Result<Vec<RemoteRecord>, StoreError> {
        let keys = filter
            .filter(|f| !f.keys.is_empty())
            .map(|f| f.keys.clone());
        let limit = filter.and_then(|f| f.limit).map(|l| l as i64);

        let rows = sqlx::query(
            r#"
            SELECT natural_key, data_json, fetched_at
              FROM market_records
             WHERE category = $1
               AND ($2::text[] IS NULL OR natural_key = ANY($2))
             ORDER BY natural_key
             LIMIT $3
            "#,
        )
        .bind(category.slug())
        .bind(keys)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let fetched_at: DateTime<Utc> = row.try_get("fetched_at")?;
            out.push(RemoteRecord {
                key: row.try_get("natural_key")?,
                data: row.try_get("data_json")?,
                fetched_at,
            });
        }
        Ok(out)
    }
}
