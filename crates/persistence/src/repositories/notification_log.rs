//! Notification log repository.

use async_trait::async_trait;
use domain::models::{NewNotificationLog, NotificationLogEntry, NotificationLogQuery};
use domain::services::{NotificationLogError, NotificationLogStore};
use shared::pagination::Page;
use sqlx::PgPool;

use crate::entities::NotificationLogEntity;
use crate::metrics::QueryTimer;

/// Shared filter for the list and count queries. Absent filters bind NULL.
const LOG_FILTER: &str = r#"
    WHERE ($1::text IS NULL OR recipient = $1)
      AND ($2::timestamptz IS NULL OR sent_at >= $2)
      AND ($3::timestamptz IS NULL OR sent_at <= $3)
      AND ($4::text IS NULL OR message ILIKE '%' || $4 || '%')
      AND ($5::text IS NULL OR LOWER(status) = LOWER($5)
           OR LOWER(split_part(status, ':', 1)) = LOWER($5))
      AND ($6::text IS NULL OR channel = $6)
"#;

/// Repository for the notification_logs table.
#[derive(Clone)]
pub struct NotificationLogRepository {
    pool: PgPool,
}

impl NotificationLogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entry: &NewNotificationLog) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("insert_notification_log");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO notification_logs (recipient, channel, message, status, type)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&entry.recipient)
        .bind(entry.channel.as_str())
        .bind(&entry.message)
        .bind(&entry.status)
        .bind(entry.kind.as_str())
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Matching entries newest first, with the total match count.
    pub async fn search(
        &self,
        query: &NotificationLogQuery,
    ) -> Result<(Vec<NotificationLogEntity>, i64), sqlx::Error> {
        let timer = QueryTimer::new("search_notification_logs");

        let list_sql = format!(
            "SELECT id, recipient, channel, message, status, type, sent_at \
             FROM notification_logs {} \
             ORDER BY sent_at DESC, id DESC LIMIT $7 OFFSET $8",
            LOG_FILTER
        );
        let count_sql = format!("SELECT COUNT(*) FROM notification_logs {}", LOG_FILTER);

        let channel = query.channel.map(|c| c.as_str());

        let rows = sqlx::query_as::<_, NotificationLogEntity>(&list_sql)
            .bind(query.recipient.as_deref())
            .bind(query.start)
            .bind(query.end)
            .bind(query.search.as_deref())
            .bind(query.status.as_deref())
            .bind(channel)
            .bind(query.page.limit)
            .bind(query.page.offset())
            .fetch_all(&self.pool);

        let total = sqlx::query_scalar::<_, i64>(&count_sql)
            .bind(query.recipient.as_deref())
            .bind(query.start)
            .bind(query.end)
            .bind(query.search.as_deref())
            .bind(query.status.as_deref())
            .bind(channel)
            .fetch_one(&self.pool);

        let result = tokio::try_join!(rows, total);
        timer.record();
        result
    }
}

#[async_trait]
impl NotificationLogStore for NotificationLogRepository {
    async fn append(&self, entry: NewNotificationLog) -> Result<(), NotificationLogError> {
        self.insert(&entry)
            .await
            .map(|_| ())
            .map_err(|e| NotificationLogError(e.to_string()))
    }

    async fn list(
        &self,
        query: &NotificationLogQuery,
    ) -> Result<Page<NotificationLogEntry>, NotificationLogError> {
        let (rows, total) = self
            .search(query)
            .await
            .map_err(|e| NotificationLogError(e.to_string()))?;

        let items = rows
            .into_iter()
            .map(NotificationLogEntry::try_from)
            .collect::<Result<Vec<_>, _>>()
            .map_err(NotificationLogError)?;

        Ok(Page::new(query.page, total, items))
    }
}
