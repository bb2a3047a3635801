//! Periodic procedure report for clinic staff.

use domain::models::RelativeWindow;
use tracing::info;

use crate::services::AnalyticsService;

use super::scheduler::{Job, JobFrequency};

/// Sends the weekly, monthly or yearly report to every admin, doctor and
/// dentist on their preferred channel, at `hour`:00 UTC on the period's
/// calendar slot.
pub struct ScheduledReportJob {
    analytics: AnalyticsService,
    period: RelativeWindow,
    hour: u32,
}

impl ScheduledReportJob {
    pub fn new(analytics: AnalyticsService, period: RelativeWindow, hour: u32) -> Self {
        Self {
            analytics,
            period,
            hour,
        }
    }
}

#[async_trait::async_trait]
impl Job for ScheduledReportJob {
    fn name(&self) -> &'static str {
        match self.period {
            RelativeWindow::Weekly => "weekly_report",
            RelativeWindow::Monthly => "monthly_report",
            RelativeWindow::Yearly => "yearly_report",
        }
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Calendar {
            period: self.period,
            hour: self.hour,
        }
    }

    async fn execute(&self) -> Result<(), String> {
        let summary = self
            .analytics
            .send_scheduled_report(self.period)
            .await
            .map_err(|e| format!("Failed to send {} report: {}", self.period, e))?;

        if !summary.outcomes.is_empty() && summary.delivered() == 0 {
            return Err(format!(
                "{} report reached none of {} recipients",
                self.period,
                summary.outcomes.len()
            ));
        }

        info!(
            period = %self.period,
            delivered = summary.delivered(),
            "Scheduled report dispatched"
        );
        Ok(())
    }
}
