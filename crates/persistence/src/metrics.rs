//! Database metrics: per-query durations and pool gauges.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Records one query's duration under its name.
pub fn record_query_duration(query_name: &str, duration_secs: f64) {
    histogram!(
        "database_query_duration_seconds",
        "query" => query_name.to_string()
    )
    .record(duration_secs);
}

/// Records pool size, idle and active connection gauges.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Times a query from creation until [`QueryTimer::record`].
///
/// ```ignore
/// let timer = QueryTimer::new("count_appointments");
/// let result = sqlx::query_scalar::<_, i64>(sql).fetch_one(&pool).await;
/// timer.record();
/// ```
pub struct QueryTimer {
    query_name: String,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        let duration = self.start.elapsed().as_secs_f64();
        record_query_duration(&self.query_name, duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_timer_keeps_name() {
        let timer = QueryTimer::new("count_appointments");
        assert_eq!(timer.query_name, "count_appointments");

        let timer = QueryTimer::new(format!("{}_{}", "popular", "times"));
        assert_eq!(timer.query_name, "popular_times");
    }

    #[test]
    fn test_record_without_recorder_is_noop() {
        QueryTimer::new("staff_load").record();
        record_query_duration("staff_load", 0.01);
    }
}
