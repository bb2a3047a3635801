//! Analytics domain models.
//!
//! Metric windows, aggregation results and the composite dashboard payload.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use super::milestone::MilestoneOverview;
use super::role::{AnalyticsOperation, Role};

// ============================================================================
// Metric kinds
// ============================================================================

/// The statistic an aggregation computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricKind {
    /// Appointments created in the window.
    AppointmentCount,
    /// Patient accounts registered in the window.
    NewPatients,
    /// Accounts of any role registered in the window.
    UserCount,
    /// Distinct suburbs among accounts registered in the window.
    DistinctSuburbs,
    /// Distinct cities among accounts registered in the window.
    DistinctCities,
    /// Distinct procedure types booked in the window.
    ProcedureTypes,
    /// Appointments grouped by procedure type.
    ProcedureBreakdown,
    /// Appointments grouped by staff member.
    StaffLoad,
    /// Confirmed revenue grouped by service role and payment method.
    RevenueByRole,
    /// New patients grouped by registration date.
    PatientTrend,
    /// Booked services grouped by service name.
    ServiceUsage,
    /// Appointments grouped by weekday and hour.
    PopularTimes,
    /// Accounts grouped by suburb.
    PopularLocations,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::AppointmentCount => "appointment-count",
            MetricKind::NewPatients => "new-patients",
            MetricKind::UserCount => "user-count",
            MetricKind::DistinctSuburbs => "distinct-suburbs",
            MetricKind::DistinctCities => "distinct-cities",
            MetricKind::ProcedureTypes => "procedure-types",
            MetricKind::ProcedureBreakdown => "procedure-breakdown",
            MetricKind::StaffLoad => "staff-load",
            MetricKind::RevenueByRole => "revenue-by-role",
            MetricKind::PatientTrend => "patient-trend",
            MetricKind::ServiceUsage => "service-usage",
            MetricKind::PopularTimes => "popular-times",
            MetricKind::PopularLocations => "popular-locations",
        }
    }

    /// Whether the metric can be narrowed to a single service role.
    pub fn supports_role_filter(&self) -> bool {
        matches!(self, MetricKind::RevenueByRole | MetricKind::ServiceUsage)
    }

    /// The operation a caller must be allowed to perform to read this metric.
    pub fn operation(&self) -> AnalyticsOperation {
        match self {
            MetricKind::RevenueByRole => AnalyticsOperation::ViewRevenue,
            MetricKind::ServiceUsage => AnalyticsOperation::ViewServiceUsage,
            MetricKind::PopularTimes | MetricKind::PopularLocations => {
                AnalyticsOperation::ViewPopular
            }
            MetricKind::ProcedureBreakdown | MetricKind::StaffLoad | MetricKind::PatientTrend => {
                AnalyticsOperation::ViewCharts
            }
            MetricKind::AppointmentCount
            | MetricKind::NewPatients
            | MetricKind::UserCount
            | MetricKind::DistinctSuburbs
            | MetricKind::DistinctCities
            | MetricKind::ProcedureTypes => AnalyticsOperation::ComputeSummary,
        }
    }
}

impl FromStr for MetricKind {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "appointment-count" | "appointments" => Ok(MetricKind::AppointmentCount),
            "new-patients" => Ok(MetricKind::NewPatients),
            "user-count" | "users" => Ok(MetricKind::UserCount),
            "distinct-suburbs" => Ok(MetricKind::DistinctSuburbs),
            "distinct-cities" => Ok(MetricKind::DistinctCities),
            "procedure-types" => Ok(MetricKind::ProcedureTypes),
            "procedure-breakdown" | "procedures" => Ok(MetricKind::ProcedureBreakdown),
            "staff-load" | "staff" => Ok(MetricKind::StaffLoad),
            "revenue-by-role" | "revenue" => Ok(MetricKind::RevenueByRole),
            "patient-trend" => Ok(MetricKind::PatientTrend),
            "service-usage" => Ok(MetricKind::ServiceUsage),
            "popular-times" => Ok(MetricKind::PopularTimes),
            "popular-locations" => Ok(MetricKind::PopularLocations),
            _ => Err(WindowError::UnknownMetric(s.to_string())),
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Windows
// ============================================================================

/// Malformed aggregation request input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WindowError {
    #[error("Unknown range '{0}' (expected weekly, monthly or yearly)")]
    UnknownRange(String),

    #[error("Unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("Unknown role '{0}'")]
    UnknownRole(String),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Both start and end must be given for a custom range")]
    IncompleteRange,

    #[error("Start date must be before end date")]
    InvalidOrder,

    #[error("Metric {0} does not support a role filter")]
    RoleFilterNotSupported(MetricKind),
}

/// A relative duration token resolved against the current time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelativeWindow {
    Weekly,
    Monthly,
    Yearly,
}

impl RelativeWindow {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelativeWindow::Weekly => "weekly",
            RelativeWindow::Monthly => "monthly",
            RelativeWindow::Yearly => "yearly",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            RelativeWindow::Weekly => Duration::days(7),
            RelativeWindow::Monthly => Duration::days(30),
            RelativeWindow::Yearly => Duration::days(365),
        }
    }
}

impl FromStr for RelativeWindow {
    type Err = WindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" | "week" | "7 days" => Ok(RelativeWindow::Weekly),
            "monthly" | "month" | "30 days" => Ok(RelativeWindow::Monthly),
            "yearly" | "year" | "1 year" | "365 days" => Ok(RelativeWindow::Yearly),
            _ => Err(WindowError::UnknownRange(s.to_string())),
        }
    }
}

impl std::fmt::Display for RelativeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time range of a window, before resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeRange {
    Relative(RelativeWindow),
    Between {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    AllTime,
}

impl TimeRange {
    /// Resolves the range into absolute bounds as of `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> ResolvedRange {
        match *self {
            TimeRange::Relative(window) => ResolvedRange {
                start: now - window.duration(),
                end: now,
            },
            TimeRange::Between { start, end } => ResolvedRange { start, end },
            TimeRange::AllTime => ResolvedRange {
                start: DateTime::UNIX_EPOCH,
                end: now,
            },
        }
    }

    /// Short label used in filenames and message subjects.
    pub fn label(&self) -> String {
        match self {
            TimeRange::Relative(window) => window.as_str().to_string(),
            TimeRange::Between { start, end } => {
                format!("{}_{}", start.format("%Y%m%d"), end.format("%Y%m%d"))
            }
            TimeRange::AllTime => "all-time".to_string(),
        }
    }
}

/// Absolute window bounds: `start < t <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A named aggregation request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricWindow {
    kind: MetricKind,
    range: TimeRange,
    role_filter: Option<Role>,
}

impl MetricWindow {
    pub fn new(kind: MetricKind, range: TimeRange) -> Self {
        Self {
            kind,
            range,
            role_filter: None,
        }
    }

    /// Narrows the window to services offered by `role`.
    pub fn with_role(mut self, role: Role) -> Result<Self, WindowError> {
        if !self.kind.supports_role_filter() {
            return Err(WindowError::RoleFilterNotSupported(self.kind));
        }
        self.role_filter = Some(role);
        Ok(self)
    }

    /// Builds a window from raw request parameters.
    ///
    /// A custom `start`/`end` pair takes precedence over `range`; when neither
    /// is present `default_range` applies.
    pub fn from_params(
        kind: MetricKind,
        range: Option<&str>,
        start: Option<&str>,
        end: Option<&str>,
        role: Option<&str>,
        default_range: RelativeWindow,
    ) -> Result<Self, WindowError> {
        let time_range = match (start, end) {
            (Some(start), Some(end)) => {
                let start = parse_bound(start)?;
                let end = parse_bound(end)?;
                shared::validation::validate_date_order(start, end)
                    .map_err(|_| WindowError::InvalidOrder)?;
                TimeRange::Between { start, end }
            }
            (None, None) => match range {
                Some(token) => TimeRange::Relative(token.parse()?),
                None => TimeRange::Relative(default_range),
            },
            _ => return Err(WindowError::IncompleteRange),
        };

        let window = Self::new(kind, time_range);
        match role.filter(|r| !r.is_empty()) {
            Some(role) => {
                let role: Role = role
                    .parse()
                    .map_err(|_| WindowError::UnknownRole(role.to_string()))?;
                window.with_role(role)
            }
            None => Ok(window),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn range(&self) -> TimeRange {
        self.range
    }

    pub fn role_filter(&self) -> Option<Role> {
        self.role_filter
    }
}

fn parse_bound(value: &str) -> Result<DateTime<Utc>, WindowError> {
    shared::validation::parse_timestamp(value)
        .map_err(|_| WindowError::InvalidDate(value.to_string()))
}

// ============================================================================
// Results
// ============================================================================

/// A numeric aggregate value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Count(i64),
    Amount(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Count(n) => n as f64,
            MetricValue::Amount(a) => a,
        }
    }
}

/// One `(label, value)` pair of an aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedValue {
    pub label: String,
    pub value: MetricValue,
}

impl AggregatedValue {
    pub fn count(label: impl Into<String>, value: i64) -> Self {
        Self {
            label: label.into(),
            value: MetricValue::Count(value),
        }
    }

    pub fn amount(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value: MetricValue::Amount(value),
        }
    }
}

/// Ordered result of one aggregation. Categories with no observations are absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub kind: MetricKind,
    pub period: ResolvedRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    pub values: Vec<AggregatedValue>,
}

impl AggregationResult {
    pub fn total(&self) -> f64 {
        self.values.iter().map(|v| v.value.as_f64()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// One line per value, e.g. `Dental: 15`.
    pub fn to_text_lines(&self) -> String {
        self.values
            .iter()
            .map(|v| match v.value {
                MetricValue::Count(n) => format!("{}: {}", v.label, n),
                MetricValue::Amount(a) => format!("{}: {:.2}", v.label, a),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// A store query failed while computing `kind`.
#[derive(Debug, Error)]
#[error("Aggregation failed for {kind}: {detail}")]
pub struct AggregationFailed {
    pub kind: MetricKind,
    pub detail: String,
}

impl AggregationFailed {
    pub fn new(kind: MetricKind, detail: impl std::fmt::Display) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }
}

// ============================================================================
// Row shapes
// ============================================================================

/// Payment lifecycle status. Only confirmed payments count as revenue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Confirmed => "confirmed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }
}

/// Confirmed revenue for one (service role, payment method) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevenueRow {
    pub role: String,
    pub method: String,
    pub total_revenue: f64,
}

/// Usage of one service over a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUsageRow {
    pub service_name: String,
    pub role: String,
    pub usage_count: i64,
}

/// One appointment in the export log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentLogEntry {
    pub created_at: DateTime<Utc>,
    pub staff: String,
    pub procedure_type: String,
    pub status: String,
}

/// Headline counts for a window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub total_appointments: i64,
    pub new_patients: i64,
    pub active_suburbs: i64,
    pub active_cities: i64,
}

/// All-time totals shown on the dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub appointments: i64,
    pub users: i64,
    pub procedures: i64,
}

/// Busiest booking slots and most common patient suburbs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopularInsights {
    pub times: Vec<AggregatedValue>,
    pub locations: Vec<AggregatedValue>,
}

/// Composite dashboard payload.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardComposite {
    pub stats: DashboardStats,
    pub popular: PopularInsights,
    pub milestones: MilestoneOverview,
    pub generated_at: DateTime<Utc>,
}
