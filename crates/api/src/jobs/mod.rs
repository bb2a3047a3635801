//! Background job scheduler and job implementations.

mod milestone_check;
mod pool_metrics;
mod scheduled_report;
mod scheduler;

pub use milestone_check::MilestoneCheckJob;
pub use pool_metrics::PoolMetricsJob;
pub use scheduled_report::ScheduledReportJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};

use domain::models::RelativeWindow;

use crate::app::AppState;

/// Builds a scheduler with the jobs enabled in `jobs` config.
pub fn build_scheduler(state: &AppState) -> JobScheduler {
    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(state.pool.clone()));

    if state.config.jobs.scheduled_reports {
        for period in [
            RelativeWindow::Weekly,
            RelativeWindow::Monthly,
            RelativeWindow::Yearly,
        ] {
            scheduler.register(ScheduledReportJob::new(
                state.analytics.clone(),
                period,
                state.config.jobs.report_hour_utc,
            ));
        }
    }

    if state.config.jobs.milestone_check {
        scheduler.register(MilestoneCheckJob::new(state.analytics.clone()));
    }

    scheduler
}
