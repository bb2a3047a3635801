//! Hourly milestone evaluation.

use tracing::info;

use crate::services::AnalyticsService;

use super::scheduler::{Job, JobFrequency};

/// Records and announces newly crossed user, suburb and city tiers.
pub struct MilestoneCheckJob {
    analytics: AnalyticsService,
}

impl MilestoneCheckJob {
    pub fn new(analytics: AnalyticsService) -> Self {
        Self { analytics }
    }
}

#[async_trait::async_trait]
impl Job for MilestoneCheckJob {
    fn name(&self) -> &'static str {
        "milestone_check"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Hourly
    }

    async fn execute(&self) -> Result<(), String> {
        let events = self
            .analytics
            .check_milestones()
            .await
            .map_err(|e| format!("Milestone check failed: {}", e))?;

        if !events.is_empty() {
            info!(reached = events.len(), "New milestones recorded");
        }
        Ok(())
    }
}
