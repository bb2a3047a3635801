//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod analytics;
pub mod milestone;
pub mod notification_log;

pub use analytics::{AppointmentLogEntity, LabelCountEntity, RevenueEntity, ServiceUsageEntity};
pub use milestone::MilestoneLogEntity;
pub use notification_log::{NotificationLogEntity, StaffContactEntity};
