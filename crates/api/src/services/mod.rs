//! Application services: analytics orchestration, report rendering and the
//! outbound delivery channels.

pub mod analytics;
pub mod email;
pub mod report_renderer;
pub mod sms;

pub use analytics::{AnalyticsError, AnalyticsService, ReportSource};
pub use email::EmailService;
pub use report_renderer::{render, ExportArtifact, RenderError, RenderedReport};
pub use sms::SmsService;
