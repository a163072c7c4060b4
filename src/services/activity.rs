use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::{
    error::AppResult,
    models::{
        activity::{ActivityEntry, ActivityLog, ActivityQuery},
        PageQuery, Paginated,
    },
};

/// Destination for activity entries.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn write(&self, entry: &ActivityEntry) -> anyhow::Result<()>;
}

pub struct PgActivitySink {
    pool: PgPool,
}

impl PgActivitySink {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivitySink for PgActivitySink {
    async fn write(&self, entry: &ActivityEntry) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO activity_logs (type, action, reference_id, details, user_id)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.kind)
        .bind(entry.action)
        .bind(&entry.reference_id)
        .bind(&entry.details)
        .bind(entry.user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// Best-effort audit trail. Never fails the caller: sink errors are logged
/// and dropped.
#[derive(Clone)]
pub struct ActivityLogger {
    sink: Arc<dyn ActivitySink>,
}

impl ActivityLogger {
    pub fn new(sink: Arc<dyn ActivitySink>) -> Self {
        Self { sink }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self::new(Arc::new(PgActivitySink::new(pool)))
    }

    /// Fire-and-forget: spawns the write and returns immediately.
    pub fn log(&self, entry: ActivityEntry) {
        let this = self.clone();
        tokio::spawn(async move { this.record(entry).await });
    }

    /// Awaits the write, swallowing any failure.
    pub async fn record(&self, entry: ActivityEntry) {
        if let Err(e) = self.sink.write(&entry).await {
            tracing::warn!(
                kind = entry.kind,
                action = entry.action,
                "activity log insert failed: {e}"
            );
        }
    }
}

pub struct ActivityService;

impl ActivityService {
    pub async fn list(pool: &PgPool, query: &ActivityQuery) -> AppResult<Paginated<ActivityLog>> {
        let page = PageQuery::new(query.page, query.limit);

        let rows: Vec<ActivityLog> = sqlx::query_as(
            "SELECT id, type, action, reference_id, details, user_id, created_at
             FROM activity_logs
             WHERE ($1::text IS NULL OR type = $1)
             ORDER BY created_at DESC
             LIMIT $2 OFFSET $3",
        )
        .bind(&query.kind)
        .bind(page.limit)
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM activity_logs WHERE ($1::text IS NULL OR type = $1)",
        )
        .bind(&query.kind)
        .fetch_one(pool)
        .await?;

        Ok(Paginated::new(rows, total, page))
    }
}
