//! Durable summary persistence
//!
//! Append-only store of conversation summaries. Postgres-backed when a
//! database URL is configured, with an in-memory fallback for development.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AssistantError;
use crate::models::SummaryRecord;
use crate::Result;

/// Trait for summary persistence
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Insert one record and return its generated identifier.
    async fn insert(&self, record: &SummaryRecord) -> Result<Uuid>;
}

/// In-memory summary store for development
pub struct InMemorySummaryStore {
    records: RwLock<HashMap<Uuid, SummaryRecord>>,
}

impl InMemorySummaryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn get(&self, id: Uuid) -> Option<SummaryRecord> {
        self.records.read().await.get(&id).cloned()
    }
}

impl Default for InMemorySummaryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummaryStore for InMemorySummaryStore {
    async fn insert(&self, record: &SummaryRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let mut records = self.records.write().await;
        records.insert(id, record.clone());
        Ok(id)
    }
}

/// Postgres-backed summary store
pub struct PostgresSummaryStore {
    pool: PgPool,
    schema_ready: OnceCell<()>,
}

impl PostgresSummaryStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: OnceCell::new(),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS summaries (
                      id UUID PRIMARY KEY,
                      recorded_at TIMESTAMPTZ NOT NULL,
                      summary TEXT NOT NULL
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AssistantError::Store(format!("Failed to initialize summaries schema: {}", e))
            })?;

        Ok(())
    }
}

#[async_trait]
impl SummaryStore for PostgresSummaryStore {
    async fn insert(&self, record: &SummaryRecord) -> Result<Uuid> {
        self.ensure_schema().await?;

        let id = Uuid::new_v4();
        sqlx::query("INSERT INTO summaries (id, recorded_at, summary) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(record.recorded_at)
            .bind(&record.summary)
            .execute(&self.pool)
            .await
            .map_err(|e| AssistantError::Store(format!("Failed to insert summary: {}", e)))?;

        Ok(id)
    }
}

/// Pick the summary store backend from the environment.
pub fn build_summary_store() -> Arc<dyn SummaryStore> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&url)
        {
            Ok(pool) => {
                info!("Summary store backend: postgres");
                return Arc::new(PostgresSummaryStore::new(pool));
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres summary store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Summary store backend: in-memory");
    Arc::new(InMemorySummaryStore::new())
}
