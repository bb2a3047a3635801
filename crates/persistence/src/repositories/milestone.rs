//! Milestone log repository.

use async_trait::async_trait;
use domain::models::{MilestoneRecord, MilestoneType};
use domain::services::{MilestoneStore, MilestoneStoreError};
use sqlx::PgPool;

use crate::entities::MilestoneLogEntity;
use crate::metrics::QueryTimer;

/// Postgres SQLSTATE for unique_violation.
const UNIQUE_VIOLATION: &str = "23505";

/// Repository for the milestone_logs table.
#[derive(Clone)]
pub struct MilestoneRepository {
    pool: PgPool,
}

impl MilestoneRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a record unless `(type, value)` already exists.
    ///
    /// Returns `true` when this call created the row.
    pub async fn insert_if_absent(
        &self,
        metric_type: MilestoneType,
        threshold: i64,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("insert_milestone_if_absent");
        let result = sqlx::query(
            r#"
            INSERT INTO milestone_logs (type, value)
            VALUES ($1, $2)
            ON CONFLICT (type, value) DO NOTHING
            "#,
        )
        .bind(metric_type.as_str())
        .bind(threshold)
        .execute(&self.pool)
        .await;
        timer.record();

        match result {
            Ok(done) => Ok(done.rows_affected() > 0),
            Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Most recent records first.
    pub async fn list_recent(&self, limit: i64) -> Result<Vec<MilestoneLogEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_recent_milestones");
        let result = sqlx::query_as::<_, MilestoneLogEntity>(
            r#"
            SELECT id, type, value, reached_at
            FROM milestone_logs
            ORDER BY reached_at DESC, id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait]
impl MilestoneStore for MilestoneRepository {
    async fn record_if_absent(
        &self,
        metric_type: MilestoneType,
        threshold: i64,
    ) -> Result<bool, MilestoneStoreError> {
        self.insert_if_absent(metric_type, threshold)
            .await
            .map_err(|e| MilestoneStoreError(e.to_string()))
    }

    async fn history(&self, limit: i64) -> Result<Vec<MilestoneRecord>, MilestoneStoreError> {
        let rows = self
            .list_recent(limit)
            .await
            .map_err(|e| MilestoneStoreError(e.to_string()))?;

        rows.into_iter()
            .map(|row| MilestoneRecord::try_from(row).map_err(MilestoneStoreError))
            .collect()
    }
}
