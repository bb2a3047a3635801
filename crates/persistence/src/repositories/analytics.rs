//! Analytics repository.
//!
//! Windowed count, group and sum queries over appointments, users and
//! payments. Every window bound and filter value is bound as a parameter;
//! rows are emitted only for observed categories.

use chrono::{DateTime, Utc};
use domain::models::{
    AggregatedValue, AggregationFailed, AggregationResult, AppointmentLogEntry, DashboardStats,
    MetricKind, MetricWindow, MilestoneCounts, PaymentStatus, PopularInsights, ResolvedRange,
    RevenueRow, Role, ServiceUsageRow, TimeRange, WindowSummary,
};
use sqlx::PgPool;

use crate::entities::{AppointmentLogEntity, LabelCountEntity, RevenueEntity, ServiceUsageEntity};
use crate::metrics::QueryTimer;

/// Rows returned for popular times/locations when no limit is given.
pub const DEFAULT_POPULAR_LIMIT: i64 = 10;

/// Rows shown on the dashboard for popular times/locations.
pub const DASHBOARD_POPULAR_LIMIT: i64 = 5;

fn failed(kind: MetricKind) -> impl FnOnce(sqlx::Error) -> AggregationFailed {
    move |e| AggregationFailed::new(kind, e)
}

/// Repository for analytics queries.
#[derive(Clone)]
pub struct AnalyticsRepository {
    pool: PgPool,
}

impl AnalyticsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Runs the query for `window`'s metric, resolving its range against `now`.
    pub async fn aggregate(
        &self,
        window: &MetricWindow,
        now: DateTime<Utc>,
    ) -> Result<AggregationResult, AggregationFailed> {
        let range = window.range().resolve(now);
        let role = window.role_filter();
        let kind = window.kind();

        let values = match kind {
            MetricKind::AppointmentCount => {
                vec![AggregatedValue::count("appointments", self.count_appointments(range).await?)]
            }
            MetricKind::NewPatients => {
                vec![AggregatedValue::count("new_patients", self.count_new_patients(range).await?)]
            }
            MetricKind::UserCount => {
                vec![AggregatedValue::count("users", self.count_users(range).await?)]
            }
            MetricKind::DistinctSuburbs => {
                vec![AggregatedValue::count("suburbs", self.count_distinct_suburbs(range).await?)]
            }
            MetricKind::DistinctCities => {
                vec![AggregatedValue::count("cities", self.count_distinct_cities(range).await?)]
            }
            MetricKind::ProcedureTypes => vec![AggregatedValue::count(
                "procedure_types",
                self.count_procedure_types(range).await?,
            )],
            MetricKind::ProcedureBreakdown => self.procedure_breakdown(range).await?,
            MetricKind::StaffLoad => self.staff_load(range).await?,
            MetricKind::PatientTrend => self.patient_trend(range).await?,
            MetricKind::PopularTimes => self.popular_times(range, DEFAULT_POPULAR_LIMIT).await?,
            MetricKind::PopularLocations => {
                self.popular_locations(range, DEFAULT_POPULAR_LIMIT).await?
            }
            MetricKind::RevenueByRole => self
                .revenue_breakdown(range, role)
                .await?
                .into_iter()
                .map(|r| AggregatedValue::amount(format!("{}/{}", r.role, r.method), r.total_revenue))
                .collect(),
            MetricKind::ServiceUsage => self
                .service_usage(range, role)
                .await?
                .into_iter()
                .map(|r| AggregatedValue::count(r.service_name, r.usage_count))
                .collect(),
        };

        Ok(AggregationResult {
            kind,
            period: range,
            role,
            values,
        })
    }

    // ========================================================================
    // Composites
    // ========================================================================

    /// Appointments, new patients, active suburbs and cities for one window.
    pub async fn window_summary(
        &self,
        range: ResolvedRange,
    ) -> Result<WindowSummary, AggregationFailed> {
        let (total_appointments, new_patients, active_suburbs, active_cities) = tokio::try_join!(
            self.count_appointments(range),
            self.count_new_patients(range),
            self.count_distinct_suburbs(range),
            self.count_distinct_cities(range),
        )?;

        Ok(WindowSummary {
            total_appointments,
            new_patients,
            active_suburbs,
            active_cities,
        })
    }

    /// All-time user, suburb and city counts.
    pub async fn milestone_counts(
        &self,
        now: DateTime<Utc>,
    ) -> Result<MilestoneCounts, AggregationFailed> {
        let range = TimeRange::AllTime.resolve(now);
        let (users, suburbs, cities) = tokio::try_join!(
            self.count_users(range),
            self.count_distinct_suburbs(range),
            self.count_distinct_cities(range),
        )?;
        Ok(MilestoneCounts {
            users,
            suburbs,
            cities,
        })
    }

    /// Everything the dashboard needs from the store, fetched concurrently.
    ///
    /// Fails as a whole if any query fails.
    pub async fn dashboard(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(DashboardStats, PopularInsights, MilestoneCounts), AggregationFailed> {
        let range = TimeRange::AllTime.resolve(now);
        let (appointments, procedures, times, locations, counts) = tokio::try_join!(
            self.count_appointments(range),
            self.count_procedure_types(range),
            self.popular_times(range, DASHBOARD_POPULAR_LIMIT),
            self.popular_locations(range, DASHBOARD_POPULAR_LIMIT),
            self.milestone_counts(now),
        )?;

        Ok((
            DashboardStats {
                appointments,
                users: counts.users,
                procedures,
            },
            PopularInsights { times, locations },
            counts,
        ))
    }

    // ========================================================================
    // Counts
    // ========================================================================

    async fn scalar(
        &self,
        kind: MetricKind,
        query_name: &str,
        sql: &str,
        range: ResolvedRange,
    ) -> Result<i64, AggregationFailed> {
        let timer = QueryTimer::new(query_name);
        let result = sqlx::query_scalar::<_, i64>(sql)
            .bind(range.start)
            .bind(range.end)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result.map_err(failed(kind))
    }

    pub async fn count_appointments(&self, range: ResolvedRange) -> Result<i64, AggregationFailed> {
        self.scalar(
            MetricKind::AppointmentCount,
            "count_appointments",
            r#"
            SELECT COUNT(*)
            FROM appointments
            WHERE created_at > $1 AND created_at <= $2
            "#,
            range,
        )
        .await
    }

    pub async fn count_new_patients(&self, range: ResolvedRange) -> Result<i64, AggregationFailed> {
        self.scalar(
            MetricKind::NewPatients,
            "count_new_patients",
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE role = 'patient' AND created_at > $1 AND created_at <= $2
            "#,
            range,
        )
        .await
    }

    pub async fn count_users(&self, range: ResolvedRange) -> Result<i64, AggregationFailed> {
        self.scalar(
            MetricKind::UserCount,
            "count_users",
            r#"
            SELECT COUNT(*)
            FROM users
            WHERE created_at > $1 AND created_at <= $2
            "#,
            range,
        )
        .await
    }

    pub async fn count_distinct_suburbs(
        &self,
        range: ResolvedRange,
    ) -> Result<i64, AggregationFailed> {
        self.scalar(
            MetricKind::DistinctSuburbs,
            "count_distinct_suburbs",
            r#"
            SELECT COUNT(DISTINCT suburb)
            FROM users
            WHERE suburb IS NOT NULL AND created_at > $1 AND created_at <= $2
            "#,
            range,
        )
        .await
    }

    pub async fn count_distinct_cities(
        &self,
        range: ResolvedRange,
    ) -> Result<i64, AggregationFailed> {
        self.scalar(
            MetricKind::DistinctCities,
            "count_distinct_cities",
            r#"
            SELECT COUNT(DISTINCT city)
            FROM users
            WHERE city IS NOT NULL AND created_at > $1 AND created_at <= $2
            "#,
            range,
        )
        .await
    }

    pub async fn count_procedure_types(
        &self,
        range: ResolvedRange,
    ) -> Result<i64, AggregationFailed> {
        self.scalar(
            MetricKind::ProcedureTypes,
            "count_procedure_types",
            r#"
            SELECT COUNT(DISTINCT procedure_type)
            FROM appointments
            WHERE created_at > $1 AND created_at <= $2
            "#,
            range,
        )
        .await
    }

    // ========================================================================
    // Grouped
    // ========================================================================

    async fn grouped(
        &self,
        kind: MetricKind,
        query_name: &str,
        sql: &str,
        range: ResolvedRange,
        limit: Option<i64>,
    ) -> Result<Vec<AggregatedValue>, AggregationFailed> {
        let timer = QueryTimer::new(query_name);
        let mut query = sqlx::query_as::<_, LabelCountEntity>(sql)
            .bind(range.start)
            .bind(range.end);
        if let Some(limit) = limit {
            query = query.bind(limit);
        }
        let result = query.fetch_all(&self.pool).await;
        timer.record();

        result
            .map(|rows| rows.into_iter().map(AggregatedValue::from).collect())
            .map_err(failed(kind))
    }

    /// Appointments per procedure type, busiest first.
    pub async fn procedure_breakdown(
        &self,
        range: ResolvedRange,
    ) -> Result<Vec<AggregatedValue>, AggregationFailed> {
        self.grouped(
            MetricKind::ProcedureBreakdown,
            "procedure_breakdown",
            r#"
            SELECT procedure_type AS label, COUNT(*) AS count
            FROM appointments
            WHERE created_at > $1 AND created_at <= $2
            GROUP BY procedure_type
            ORDER BY count DESC, label ASC
            "#,
            range,
            None,
        )
        .await
    }

    /// Appointments per staff member, busiest first.
    pub async fn staff_load(
        &self,
        range: ResolvedRange,
    ) -> Result<Vec<AggregatedValue>, AggregationFailed> {
        self.grouped(
            MetricKind::StaffLoad,
            "staff_load",
            r#"
            SELECT u.username AS label, COUNT(a.id) AS count
            FROM appointments a
            JOIN users u ON a.staff_id = u.id
            WHERE a.created_at > $1 AND a.created_at <= $2
            GROUP BY u.username
            ORDER BY count DESC, label ASC
            "#,
            range,
            None,
        )
        .await
    }

    /// New patients per UTC day, oldest first. Days without sign-ups are absent.
    pub async fn patient_trend(
        &self,
        range: ResolvedRange,
    ) -> Result<Vec<AggregatedValue>, AggregationFailed> {
        self.grouped(
            MetricKind::PatientTrend,
            "patient_trend",
            r#"
            SELECT TO_CHAR((created_at AT TIME ZONE 'UTC')::date, 'YYYY-MM-DD') AS label,
                   COUNT(*) AS count
            FROM users
            WHERE role = 'patient' AND created_at > $1 AND created_at <= $2
            GROUP BY label
            ORDER BY label ASC
            "#,
            range,
            None,
        )
        .await
    }

    /// Busiest weekday/hour slots, e.g. `Monday 09:00`.
    pub async fn popular_times(
        &self,
        range: ResolvedRange,
        limit: i64,
    ) -> Result<Vec<AggregatedValue>, AggregationFailed> {
        self.grouped(
            MetricKind::PopularTimes,
            "popular_times",
            r#"
            SELECT TRIM(TO_CHAR(created_at AT TIME ZONE 'UTC', 'Day'))
                       || ' '
                       || TO_CHAR(created_at AT TIME ZONE 'UTC', 'HH24')
                       || ':00' AS label,
                   COUNT(*) AS count
            FROM appointments
            WHERE created_at > $1 AND created_at <= $2
            GROUP BY label
            ORDER BY count DESC, label ASC
            LIMIT $3
            "#,
            range,
            Some(limit),
        )
        .await
    }

    /// Suburbs with the most registered accounts.
    pub async fn popular_locations(
        &self,
        range: ResolvedRange,
        limit: i64,
    ) -> Result<Vec<AggregatedValue>, AggregationFailed> {
        self.grouped(
            MetricKind::PopularLocations,
            "popular_locations",
            r#"
            SELECT suburb AS label, COUNT(*) AS count
            FROM users
            WHERE suburb IS NOT NULL AND created_at > $1 AND created_at <= $2
            GROUP BY suburb
            ORDER BY count DESC, label ASC
            LIMIT $3
            "#,
            range,
            Some(limit),
        )
        .await
    }

    /// Confirmed revenue by service role and payment method.
    ///
    /// Payments in any status other than confirmed contribute nothing.
    pub async fn revenue_breakdown(
        &self,
        range: ResolvedRange,
        role: Option<Role>,
    ) -> Result<Vec<RevenueRow>, AggregationFailed> {
        let timer = QueryTimer::new("revenue_breakdown");
        let result = sqlx::query_as::<_, RevenueEntity>(
            r#"
            SELECT s.role, p.method, SUM(s.price)::float8 AS total_revenue
            FROM payments p
            JOIN appointments a ON p.appointment_id = a.id
            JOIN appointment_services aps ON aps.appointment_id = a.id
            JOIN services s ON aps.service_id = s.id
            WHERE p.status = $3
              AND p.created_at > $1 AND p.created_at <= $2
              AND ($4::text IS NULL OR s.role = $4)
            GROUP BY s.role, p.method
            ORDER BY s.role, p.method
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(PaymentStatus::Confirmed.as_str())
        .bind(role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map(|rows| rows.into_iter().map(RevenueRow::from).collect())
            .map_err(failed(MetricKind::RevenueByRole))
    }

    /// Booked services, most used first.
    pub async fn service_usage(
        &self,
        range: ResolvedRange,
        role: Option<Role>,
    ) -> Result<Vec<ServiceUsageRow>, AggregationFailed> {
        let timer = QueryTimer::new("service_usage");
        let result = sqlx::query_as::<_, ServiceUsageEntity>(
            r#"
            SELECT s.name AS service_name, s.role, COUNT(*) AS usage_count
            FROM appointment_services aps
            JOIN services s ON aps.service_id = s.id
            JOIN appointments a ON aps.appointment_id = a.id
            WHERE a.created_at > $1 AND a.created_at <= $2
              AND ($3::text IS NULL OR s.role = $3)
            GROUP BY s.id, s.name, s.role
            ORDER BY usage_count DESC, service_name ASC
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .bind(role.map(|r| r.as_str()))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map(|rows| rows.into_iter().map(ServiceUsageRow::from).collect())
            .map_err(failed(MetricKind::ServiceUsage))
    }

    /// Appointments in the window with the staff member's username, oldest first.
    pub async fn appointment_log(
        &self,
        range: ResolvedRange,
    ) -> Result<Vec<AppointmentLogEntry>, AggregationFailed> {
        let timer = QueryTimer::new("appointment_log");
        let result = sqlx::query_as::<_, AppointmentLogEntity>(
            r#"
            SELECT a.created_at, u.username AS staff, a.procedure_type, a.status
            FROM appointments a
            JOIN users u ON a.staff_id = u.id
            WHERE a.created_at > $1 AND a.created_at <= $2
            ORDER BY a.created_at ASC, a.id ASC
            "#,
        )
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map(|rows| rows.into_iter().map(AppointmentLogEntry::from).collect())
            .map_err(failed(MetricKind::AppointmentCount))
    }
}
