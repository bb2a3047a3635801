//! Analytics, milestone and reporting routes.
//!
//! Every handler checks the caller's role before touching the store, and
//! export handlers parse the requested format before running any query.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use domain::models::{
    AggregationResult, AnalyticsOperation, ChannelKind, DashboardComposite, MetricKind,
    MetricWindow, MilestoneOverview, MilestoneRecord, NotificationLogEntry, NotificationLogQuery,
    PopularInsights, RelativeWindow, ReportFormat, RevenueRow, ServiceUsageRow, TimeRange,
    WindowSummary,
};
use domain::services::DispatchSummary;
use serde::{Deserialize, Serialize};
use shared::pagination::{Page, PageRequest};
use shared::validation::parse_timestamp;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::Principal;
use crate::services::{ReportSource, RenderedReport};

/// Build the analytics router, nested under `/api/v1/analytics`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(get_summary))
        .route("/metrics/:kind", get(get_metric))
        .route("/chart/procedures", get(get_procedure_chart))
        .route("/chart/patients", get(get_patient_chart))
        .route("/chart/staff", get(get_staff_chart))
        .route("/popular", get(get_popular))
        .route("/milestones", get(get_milestones))
        .route("/milestones/history", get(get_milestone_history))
        .route("/dashboard", get(get_dashboard))
        .route("/revenue", get(get_revenue))
        .route("/revenue/export", post(export_revenue))
        .route("/services/usage", get(get_service_usage))
        .route("/export", post(export_report))
        .route("/email-report", post(email_report))
        .route("/sms-report", post(sms_report))
        .route("/notification-logs", get(get_notification_logs))
}

// ============================================================================
// Request / response types
// ============================================================================

/// Window selection shared by query strings and request bodies.
///
/// `start`/`end` (YYYY-MM-DD or RFC 3339) take precedence over `range`.
#[derive(Debug, Default, Deserialize)]
pub struct WindowParams {
    pub range: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub role: Option<String>,
}

impl WindowParams {
    fn is_unset(&self) -> bool {
        self.range.is_none() && self.start.is_none() && self.end.is_none()
    }

    fn window(&self, kind: MetricKind, default_range: RelativeWindow) -> Result<MetricWindow, ApiError> {
        Ok(MetricWindow::from_params(
            kind,
            self.range.as_deref(),
            self.start.as_deref(),
            self.end.as_deref(),
            self.role.as_deref(),
            default_range,
        )?)
    }

    /// Window without a role filter.
    fn range(&self, default_range: RelativeWindow) -> Result<TimeRange, ApiError> {
        if self.role.as_deref().is_some_and(|r| !r.is_empty()) {
            return Err(ApiError::Validation(
                "role filter is only supported for revenue and service usage".to_string(),
            ));
        }
        Ok(self
            .window(MetricKind::AppointmentCount, default_range)?
            .range())
    }
}

fn default_format() -> String {
    "excel".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(flatten)]
    pub window: WindowParams,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailReportRequest {
    #[validate(email(message = "Invalid email address"))]
    pub to: String,
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(flatten)]
    pub window: WindowParams,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SmsReportRequest {
    #[validate(custom(function = "shared::validation::validate_phone_number"))]
    pub to: String,
    #[serde(flatten)]
    pub window: WindowParams,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationLogParams {
    pub to: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub search: Option<String>,
    pub status: Option<String>,
    pub channel: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl NotificationLogParams {
    fn into_query(self) -> Result<NotificationLogQuery, ApiError> {
        let channel = self
            .channel
            .filter(|c| !c.is_empty())
            .map(|c| c.parse::<ChannelKind>())
            .transpose()
            .map_err(ApiError::Validation)?;

        let page = PageRequest::checked(self.page, self.limit)
            .map_err(|e| ApiError::Validation(e.to_string()))?;

        Ok(NotificationLogQuery {
            recipient: self.to.filter(|s| !s.is_empty()),
            start: optional_timestamp(self.start.as_deref())?,
            end: optional_timestamp(self.end.as_deref())?,
            search: self.search.filter(|s| !s.is_empty()),
            status: self.status.filter(|s| !s.is_empty()),
            channel,
            page,
        })
    }
}

fn optional_timestamp(value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .filter(|v| !v.is_empty())
        .map(|v| {
            parse_timestamp(v).map_err(|_| ApiError::Validation(format!("Invalid date '{}'", v)))
        })
        .transpose()
}

#[derive(Debug, Serialize)]
pub struct MilestoneHistoryResponse {
    pub milestones: Vec<MilestoneRecord>,
}

#[derive(Debug, Serialize)]
pub struct DeliveryResponse {
    pub message: String,
    pub delivered: usize,
    pub failed: usize,
}

impl DeliveryResponse {
    fn new(message: impl Into<String>, summary: &DispatchSummary) -> Self {
        Self {
            message: message.into(),
            delivered: summary.delivered(),
            failed: summary.failed(),
        }
    }
}

/// Builds a download response for a rendered report.
fn attachment(report: RenderedReport) -> Result<Response, ApiError> {
    Response::builder()
        .header(header::CONTENT_TYPE, report.content_type)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", report.filename),
        )
        .header(header::CONTENT_LENGTH, report.bytes.len())
        .body(Body::from(report.bytes))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to build response");
            ApiError::Internal("Failed to build response".to_string())
        })
}

// ============================================================================
// Aggregation
// ============================================================================

/// Headline counts for a window (default: last 7 days).
async fn get_summary(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<WindowParams>,
) -> Result<Json<WindowSummary>, ApiError> {
    principal.authorize(AnalyticsOperation::ComputeSummary)?;
    let range = params.range(RelativeWindow::Weekly)?;
    Ok(Json(state.analytics.window_summary(range).await?))
}

/// Any single metric by its kebab-case name.
async fn get_metric(
    State(state): State<AppState>,
    principal: Principal,
    Path(kind): Path<String>,
    Query(params): Query<WindowParams>,
) -> Result<Json<AggregationResult>, ApiError> {
    let kind: MetricKind = kind.parse()?;
    principal.authorize(kind.operation())?;
    let window = params.window(kind, RelativeWindow::Weekly)?;
    Ok(Json(state.analytics.compute_summary(&window).await?))
}

/// Appointments per procedure type. Covers all history unless a window is given.
async fn get_procedure_chart(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<WindowParams>,
) -> Result<Json<AggregationResult>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewCharts)?;
    let window = if params.is_unset() {
        MetricWindow::new(MetricKind::ProcedureBreakdown, TimeRange::AllTime)
    } else {
        MetricWindow::new(
            MetricKind::ProcedureBreakdown,
            params.range(RelativeWindow::Weekly)?,
        )
    };
    Ok(Json(state.analytics.compute_summary(&window).await?))
}

async fn get_patient_chart(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<WindowParams>,
) -> Result<Json<AggregationResult>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewCharts)?;
    let window = MetricWindow::new(
        MetricKind::PatientTrend,
        params.range(RelativeWindow::Weekly)?,
    );
    Ok(Json(state.analytics.compute_summary(&window).await?))
}

async fn get_staff_chart(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<WindowParams>,
) -> Result<Json<AggregationResult>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewCharts)?;
    let window = MetricWindow::new(
        MetricKind::StaffLoad,
        params.range(RelativeWindow::Monthly)?,
    );
    Ok(Json(state.analytics.compute_summary(&window).await?))
}

async fn get_popular(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<PopularInsights>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewPopular)?;
    Ok(Json(state.analytics.popular().await?))
}

async fn get_dashboard(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<DashboardComposite>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewDashboard)?;
    Ok(Json(state.analytics.compute_dashboard_composite().await?))
}

async fn get_revenue(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<RevenueRow>>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewRevenue)?;
    let window = params.window(MetricKind::RevenueByRole, RelativeWindow::Monthly)?;
    Ok(Json(state.analytics.revenue(&window).await?))
}

async fn get_service_usage(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<WindowParams>,
) -> Result<Json<Vec<ServiceUsageRow>>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewServiceUsage)?;
    let window = params.window(MetricKind::ServiceUsage, RelativeWindow::Monthly)?;
    Ok(Json(state.analytics.service_usage(&window).await?))
}

// ============================================================================
// Milestones
// ============================================================================

async fn get_milestones(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<MilestoneOverview>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewMilestoneProgress)?;
    Ok(Json(state.analytics.milestone_overview().await?))
}

async fn get_milestone_history(
    State(state): State<AppState>,
    principal: Principal,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<MilestoneHistoryResponse>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewMilestoneHistory)?;
    let milestones = state.analytics.fetch_milestone_history(query.limit).await?;
    Ok(Json(MilestoneHistoryResponse { milestones }))
}

// ============================================================================
// Reports
// ============================================================================

/// Appointment log for a window as a downloadable file (default: weekly excel).
async fn export_report(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    principal.authorize(AnalyticsOperation::ExportReport)?;
    let format: ReportFormat = request.format.parse()?;
    let source = ReportSource::AppointmentLog(request.window.range(RelativeWindow::Weekly)?);

    let report = state
        .analytics
        .export_report(&source, format)
        .await?
        .into_bytes()
        .map_err(ApiError::from)?;
    attachment(report)
}

/// Revenue breakdown as a downloadable file (default: monthly excel).
async fn export_revenue(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<ExportRequest>,
) -> Result<Response, ApiError> {
    principal.authorize(AnalyticsOperation::ExportRevenue)?;
    let format: ReportFormat = request.format.parse()?;
    let window = request
        .window
        .window(MetricKind::RevenueByRole, RelativeWindow::Monthly)?;

    let report = state
        .analytics
        .export_report(&ReportSource::Metric(window), format)
        .await?
        .into_bytes()
        .map_err(ApiError::from)?;
    attachment(report)
}

async fn email_report(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<EmailReportRequest>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    principal.authorize(AnalyticsOperation::EmailReport)?;
    request.validate()?;
    let format: ReportFormat = request.format.parse()?;
    let source = ReportSource::AppointmentLog(request.window.range(RelativeWindow::Weekly)?);

    let summary = state
        .analytics
        .email_report(&source, format, &request.to)
        .await?;
    Ok(Json(DeliveryResponse::new(
        format!("Report emailed to {}", request.to),
        &summary,
    )))
}

async fn sms_report(
    State(state): State<AppState>,
    principal: Principal,
    Json(request): Json<SmsReportRequest>,
) -> Result<Json<DeliveryResponse>, ApiError> {
    principal.authorize(AnalyticsOperation::SmsReport)?;
    request.validate()?;
    let range = request.window.range(RelativeWindow::Weekly)?;

    let summary = state.analytics.sms_report(range, &request.to).await?;
    Ok(Json(DeliveryResponse::new(
        format!("Report sent via SMS to {}", request.to),
        &summary,
    )))
}

// ============================================================================
// Notification log
// ============================================================================

async fn get_notification_logs(
    State(state): State<AppState>,
    principal: Principal,
    Query(params): Query<NotificationLogParams>,
) -> Result<Json<Page<NotificationLogEntry>>, ApiError> {
    principal.authorize(AnalyticsOperation::ViewNotificationLog)?;
    let query = params.into_query()?;
    Ok(Json(state.analytics.notification_log(&query).await?))
}
