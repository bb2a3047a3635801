//! Domain services for the clinic analytics core.

pub mod milestone;
pub mod notification;

pub use milestone::{
    InMemoryMilestoneStore, MilestoneEvaluationError, MilestoneStore, MilestoneStoreError,
    MilestoneTracker,
};
pub use notification::{
    DeliveryError, DeliveryOutcome, DispatchError, DispatchSummary, InMemoryNotificationLog,
    MockChannel, NotificationChannel, NotificationDispatcher, NotificationLogError,
    NotificationLogStore, RecipientOutcome,
};
