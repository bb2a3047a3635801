//! Analytics orchestration.
//!
//! Ties the aggregation queries, milestone tracker, report renderer and
//! notification dispatcher together behind the operations the HTTP layer and
//! scheduled jobs call.

use chrono::Utc;
use domain::models::report::to_records;
use domain::models::{
    AggregationFailed, AggregationResult, Attachment, ChannelKind, DashboardComposite, MetricKind,
    MetricWindow, MilestoneOverview, MilestoneReached, MilestoneRecord, NotificationKind,
    NotificationLogEntry, NotificationLogQuery, OutgoingMessage, PopularInsights, Recipient,
    RelativeWindow, ReportFormat, ReportRecord, RevenueRow, ServiceUsageRow, TimeRange,
    WindowSummary,
};
use domain::services::{
    DispatchError, DispatchSummary, MilestoneStoreError, MilestoneTracker,
    NotificationDispatcher, NotificationLogError,
};
use persistence::repositories::analytics::DEFAULT_POPULAR_LIMIT;
use persistence::repositories::{AnalyticsRepository, StaffRepository};
use shared::pagination::Page;
use sqlx::PgPool;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

use super::report_renderer::{render, ExportArtifact, RenderError};

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Aggregation(#[from] AggregationFailed),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Milestones(#[from] MilestoneStoreError),

    #[error(transparent)]
    NotificationLog(#[from] NotificationLogError),

    #[error("Recipient lookup failed: {0}")]
    Recipients(#[from] sqlx::Error),
}

/// What an export or emailed report contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportSource {
    /// Raw appointment rows in a range.
    AppointmentLog(TimeRange),
    /// The rows behind one metric.
    Metric(MetricWindow),
}

impl ReportSource {
    pub fn range(&self) -> TimeRange {
        match self {
            ReportSource::AppointmentLog(range) => *range,
            ReportSource::Metric(window) => window.range(),
        }
    }

    fn filename_stem(&self) -> String {
        match self {
            ReportSource::AppointmentLog(range) => format!("clinic_report_{}", range.label()),
            ReportSource::Metric(window) => {
                format!("{}_{}", window.kind().as_str().replace('-', "_"), window.range().label())
            }
        }
    }
}

/// Log tag for a scheduled report period.
pub fn period_kind(period: RelativeWindow) -> NotificationKind {
    match period {
        RelativeWindow::Weekly => NotificationKind::Weekly,
        RelativeWindow::Monthly => NotificationKind::Monthly,
        RelativeWindow::Yearly => NotificationKind::Yearly,
    }
}

/// Text body of an SMS report.
pub fn sms_report_text(label: &str, result: &AggregationResult) -> String {
    format!("Clinic Report ({}):\n\n{}", label, breakdown_lines(result))
}

/// Text body of a scheduled report, e.g. `Weekly Clinic Report:`.
pub fn scheduled_report_text(period: RelativeWindow, result: &AggregationResult) -> String {
    let name = period.as_str();
    let mut title = name[..1].to_uppercase();
    title.push_str(&name[1..]);
    format!("{} Clinic Report:\n\n{}", title, breakdown_lines(result))
}

fn breakdown_lines(result: &AggregationResult) -> String {
    if result.is_empty() {
        "No appointments recorded.".to_string()
    } else {
        result.to_text_lines()
    }
}

/// Analytics operations over the clinic database.
#[derive(Clone)]
pub struct AnalyticsService {
    analytics: AnalyticsRepository,
    staff: StaffRepository,
    tracker: MilestoneTracker,
    dispatcher: NotificationDispatcher,
    exports_dir: PathBuf,
    milestone_recipients: Vec<Recipient>,
}

impl AnalyticsService {
    pub fn new(
        pool: PgPool,
        tracker: MilestoneTracker,
        dispatcher: NotificationDispatcher,
        exports_dir: PathBuf,
        milestone_recipients: Vec<Recipient>,
    ) -> Self {
        Self {
            analytics: AnalyticsRepository::new(pool.clone()),
            staff: StaffRepository::new(pool),
            tracker,
            dispatcher,
            exports_dir,
            milestone_recipients,
        }
    }

    pub fn tracker(&self) -> &MilestoneTracker {
        &self.tracker
    }

    // ========================================================================
    // Aggregation
    // ========================================================================

    pub async fn compute_summary(
        &self,
        window: &MetricWindow,
    ) -> Result<AggregationResult, AggregationFailed> {
        self.analytics.aggregate(window, Utc::now()).await
    }

    pub async fn window_summary(&self, range: TimeRange) -> Result<WindowSummary, AggregationFailed> {
        self.analytics.window_summary(range.resolve(Utc::now())).await
    }

    /// Busiest slots and suburbs over all recorded history.
    pub async fn popular(&self) -> Result<PopularInsights, AggregationFailed> {
        let range = TimeRange::AllTime.resolve(Utc::now());
        let (times, locations) = tokio::try_join!(
            self.analytics.popular_times(range, DEFAULT_POPULAR_LIMIT),
            self.analytics.popular_locations(range, DEFAULT_POPULAR_LIMIT),
        )?;
        Ok(PopularInsights { times, locations })
    }

    pub async fn revenue(&self, window: &MetricWindow) -> Result<Vec<RevenueRow>, AggregationFailed> {
        let range = window.range().resolve(Utc::now());
        self.analytics
            .revenue_breakdown(range, window.role_filter())
            .await
    }

    pub async fn service_usage(
        &self,
        window: &MetricWindow,
    ) -> Result<Vec<ServiceUsageRow>, AggregationFailed> {
        let range = window.range().resolve(Utc::now());
        self.analytics.service_usage(range, window.role_filter()).await
    }

    // ========================================================================
    // Milestones
    // ========================================================================

    /// Progress towards the next tier per metric. Records nothing.
    pub async fn milestone_overview(&self) -> Result<MilestoneOverview, AggregationFailed> {
        let counts = self.analytics.milestone_counts(Utc::now()).await?;
        Ok(self.tracker.overview(counts))
    }

    /// Records and announces every newly crossed tier.
    ///
    /// Tiers recorded before a store failure are still announced.
    pub async fn check_milestones(&self) -> Result<Vec<MilestoneReached>, AnalyticsError> {
        let counts = self.analytics.milestone_counts(Utc::now()).await?;

        match self.tracker.evaluate_all(counts).await {
            Ok(events) => {
                self.announce(&events).await;
                Ok(events)
            }
            Err(err) => {
                self.announce(&err.recorded).await;
                Err(AnalyticsError::Milestones(err.source))
            }
        }
    }

    async fn announce(&self, events: &[MilestoneReached]) {
        if events.is_empty() {
            return;
        }
        if self.milestone_recipients.is_empty() {
            warn!(count = events.len(), "Milestones reached but no recipients configured");
            return;
        }

        for event in events {
            let message = OutgoingMessage::text(event.message()).with_subject(event.subject());
            let summary = self
                .dispatcher
                .dispatch(&self.milestone_recipients, &message, NotificationKind::Milestone)
                .await;

            if summary.delivered() == 0 {
                warn!(
                    metric_type = %event.metric_type,
                    threshold = event.threshold,
                    "Milestone announcement reached no recipients"
                );
            }
        }
    }

    pub async fn fetch_milestone_history(
        &self,
        limit: Option<i64>,
    ) -> Result<Vec<MilestoneRecord>, MilestoneStoreError> {
        self.tracker.history(limit).await
    }

    /// Totals, popular slots and milestone progress in one payload.
    ///
    /// The store queries run concurrently and fail together. Milestone
    /// recording runs afterwards; its failures are logged, not returned.
    pub async fn compute_dashboard_composite(&self) -> Result<DashboardComposite, AggregationFailed> {
        let now = Utc::now();
        let (stats, popular, counts) = self.analytics.dashboard(now).await?;

        match self.tracker.evaluate_all(counts).await {
            Ok(events) => self.announce(&events).await,
            Err(err) => {
                warn!(error = %err, "Milestone evaluation failed during dashboard load");
                self.announce(&err.recorded).await;
            }
        }

        Ok(DashboardComposite {
            stats,
            popular,
            milestones: self.tracker.overview(counts),
            generated_at: now,
        })
    }

    // ========================================================================
    // Reports
    // ========================================================================

    async fn records_for(&self, source: &ReportSource) -> Result<Vec<ReportRecord>, AggregationFailed> {
        let now = Utc::now();
        match source {
            ReportSource::AppointmentLog(range) => {
                let rows = self.analytics.appointment_log(range.resolve(now)).await?;
                Ok(to_records(&rows))
            }
            ReportSource::Metric(window) => match window.kind() {
                MetricKind::RevenueByRole => Ok(to_records(&self.revenue(window).await?)),
                MetricKind::ServiceUsage => Ok(to_records(&self.service_usage(window).await?)),
                _ => Ok(to_records(&self.analytics.aggregate(window, now).await?.values)),
            },
        }
    }

    /// Renders `source` and stages it in the exports directory.
    ///
    /// The caller reads the artifact back with `into_bytes`, which removes it.
    pub async fn export_report(
        &self,
        source: &ReportSource,
        format: ReportFormat,
    ) -> Result<ExportArtifact, AnalyticsError> {
        let records = self.records_for(source).await?;
        let rendered = render(&records, format)?.with_stem(&source.filename_stem());
        let artifact = ExportArtifact::persist(&self.exports_dir, rendered)?;

        info!(
            format = format.extension(),
            records = records.len(),
            filename = artifact.filename(),
            "Report exported"
        );
        Ok(artifact)
    }

    /// Emails a rendered report to `to` as an attachment.
    pub async fn email_report(
        &self,
        source: &ReportSource,
        format: ReportFormat,
        to: &str,
    ) -> Result<DispatchSummary, AnalyticsError> {
        let label = source.range().label();
        let report = self.export_report(source, format).await?.into_bytes()?;

        let message = OutgoingMessage::text(format!("See attached {} report.", label))
            .with_subject(format!("Clinic Report - {}", label))
            .with_attachment(Attachment {
                filename: report.filename,
                content_type: report.content_type.to_string(),
                bytes: report.bytes,
            });

        let summary = self
            .dispatcher
            .dispatch(&[Recipient::email(to)], &message, NotificationKind::OnDemand)
            .await;
        Ok(summary.into_result()?)
    }

    /// Texts the procedure breakdown for `range` to `to`.
    pub async fn sms_report(&self, range: TimeRange, to: &str) -> Result<DispatchSummary, AnalyticsError> {
        let window = MetricWindow::new(MetricKind::ProcedureBreakdown, range);
        let result = self.compute_summary(&window).await?;
        let message = OutgoingMessage::text(sms_report_text(&range.label(), &result));

        let summary = self
            .dispatcher
            .dispatch(&[Recipient::sms(to)], &message, NotificationKind::OnDemand)
            .await;
        Ok(summary.into_result()?)
    }

    /// Sends the periodic procedure report to every admin, doctor and dentist.
    ///
    /// Email recipients get the spreadsheet attached; SMS recipients get the
    /// breakdown as text.
    pub async fn send_scheduled_report(
        &self,
        period: RelativeWindow,
    ) -> Result<DispatchSummary, AnalyticsError> {
        let range = TimeRange::Relative(period);
        let window = MetricWindow::new(MetricKind::ProcedureBreakdown, range);
        let result = self.compute_summary(&window).await?;
        let recipients = self.staff.report_recipients().await?;
        let kind = period_kind(period);

        let (email, sms): (Vec<Recipient>, Vec<Recipient>) = recipients
            .into_iter()
            .partition(|r| r.channel == ChannelKind::Email);

        let mut summary = DispatchSummary::default();

        if !email.is_empty() {
            let report = self
                .export_report(&ReportSource::Metric(window), ReportFormat::Spreadsheet)
                .await?
                .into_bytes()?;
            let message = OutgoingMessage::text(format!("See attached {} report", period))
                .with_subject(format!("{} Report", period.as_str().to_uppercase()))
                .with_attachment(Attachment {
                    filename: report.filename,
                    content_type: report.content_type.to_string(),
                    bytes: report.bytes,
                });
            summary
                .outcomes
                .extend(self.dispatcher.dispatch(&email, &message, kind).await.outcomes);
        }

        if !sms.is_empty() {
            let message = OutgoingMessage::text(scheduled_report_text(period, &result));
            summary
                .outcomes
                .extend(self.dispatcher.dispatch(&sms, &message, kind).await.outcomes);
        }

        info!(
            period = %period,
            delivered = summary.delivered(),
            failed = summary.failed(),
            "Scheduled report sent"
        );
        Ok(summary)
    }

    // ========================================================================
    // Notification log
    // ========================================================================

    pub async fn notification_log(
        &self,
        query: &NotificationLogQuery,
    ) -> Result<Page<NotificationLogEntry>, NotificationLogError> {
        self.dispatcher.list_log(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use domain::models::{AggregatedValue, ResolvedRange};

    fn breakdown(values: Vec<AggregatedValue>) -> AggregationResult {
        let end = Utc.with_ymd_and_hms(2025, 6, 8, 0, 0, 0).unwrap();
        AggregationResult {
            kind: MetricKind::ProcedureBreakdown,
            period: ResolvedRange {
                start: end - chrono::Duration::days(7),
                end,
            },
            role: None,
            values,
        }
    }

    #[test]
    fn test_sms_report_text() {
        let result = breakdown(vec![
            AggregatedValue::count("Cleaning", 4),
            AggregatedValue::count("Filling", 2),
        ]);
        assert_eq!(
            sms_report_text("weekly", &result),
            "Clinic Report (weekly):\n\nCleaning: 4\nFilling: 2"
        );
    }

    #[test]
    fn test_scheduled_report_text() {
        let result = breakdown(vec![AggregatedValue::count("Checkup", 9)]);
        assert_eq!(
            scheduled_report_text(RelativeWindow::Monthly, &result),
            "Monthly Clinic Report:\n\nCheckup: 9"
        );
    }

    #[test]
    fn test_empty_breakdown_text() {
        let text = scheduled_report_text(RelativeWindow::Weekly, &breakdown(vec![]));
        assert_eq!(text, "Weekly Clinic Report:\n\nNo appointments recorded.");
    }

    #[test]
    fn test_period_kind() {
        assert_eq!(period_kind(RelativeWindow::Weekly), NotificationKind::Weekly);
        assert_eq!(period_kind(RelativeWindow::Yearly), NotificationKind::Yearly);
    }

    #[test]
    fn test_report_source_filename_stem() {
        let weekly = TimeRange::Relative(RelativeWindow::Weekly);
        assert_eq!(
            ReportSource::AppointmentLog(weekly).filename_stem(),
            "clinic_report_weekly"
        );

        let window = MetricWindow::new(MetricKind::RevenueByRole, weekly);
        assert_eq!(
            ReportSource::Metric(window).filename_stem(),
            "revenue_by_role_weekly"
        );
    }
}
