//! Domain models for the clinic analytics core.

pub mod analytics;
pub mod milestone;
pub mod notification;
pub mod report;
pub mod role;

pub use analytics::{
    AggregatedValue, AggregationFailed, AggregationResult, AppointmentLogEntry, DashboardComposite,
    DashboardStats, MetricKind, MetricValue, MetricWindow, PaymentStatus, PopularInsights,
    RelativeWindow, ResolvedRange, RevenueRow, ServiceUsageRow, TimeRange, WindowError,
    WindowSummary,
};
pub use milestone::{
    next_goal, MilestoneConfig, MilestoneCounts, MilestoneOverview, MilestoneProgress,
    MilestoneReached, MilestoneRecord, MilestoneTiers, MilestoneType, NextGoal, TierError,
};
pub use notification::{
    Attachment, ChannelKind, NewNotificationLog, NotificationKind, NotificationLogEntry,
    NotificationLogQuery, OutgoingMessage, Recipient,
};
pub use report::{
    format_timestamp, CellValue, ReportFormat, ReportRecord, ToReportRecord, UnsupportedFormat,
};
pub use role::{AnalyticsOperation, Role};
