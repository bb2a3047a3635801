//! Repository implementations for database operations.

pub mod analytics;
pub mod milestone;
pub mod notification_log;
pub mod staff;

pub use analytics::AnalyticsRepository;
pub use milestone::MilestoneRepository;
pub use notification_log::NotificationLogRepository;
pub use staff::StaffRepository;
