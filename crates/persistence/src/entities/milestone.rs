//! Milestone log entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{MilestoneRecord, MilestoneType};
use sqlx::FromRow;

/// Database row mapping for the milestone_logs table.
#[derive(Debug, Clone, FromRow)]
pub struct MilestoneLogEntity {
    pub id: i64,
    #[sqlx(rename = "type")]
    pub metric_type: String,
    pub value: i64,
    pub reached_at: DateTime<Utc>,
}

impl TryFrom<MilestoneLogEntity> for MilestoneRecord {
    type Error = String;

    fn try_from(entity: MilestoneLogEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entity.id,
            metric_type: entity.metric_type.parse::<MilestoneType>()?,
            value: entity.value,
            reached_at: entity.reached_at,
        })
    }
}
