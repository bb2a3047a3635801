use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::models::{AggregationFailed, UnsupportedFormat, WindowError};
use domain::services::{DispatchError, MilestoneStoreError, NotificationLogError};
use serde::Serialize;
use thiserror::Error;

use crate::services::analytics::AnalyticsError;
use crate::services::report_renderer::RenderError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Detail is logged, never returned.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    AggregationFailed(#[from] AggregationFailed),

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            ApiError::Forbidden(reason) => {
                tracing::debug!(reason = %reason, "Request forbidden");
                (StatusCode::FORBIDDEN, "forbidden", "Access denied".into())
            }
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            ApiError::UnsupportedFormat(format) => (
                StatusCode::BAD_REQUEST,
                "unsupported_format",
                format!("Unsupported format: {}", format),
            ),
            ApiError::AggregationFailed(err) => {
                tracing::error!(metric = %err.kind, detail = %err.detail, "Aggregation failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "aggregation_failed",
                    format!("Failed to compute {}", err.kind),
                )
            }
            ApiError::DeliveryFailed(msg) => {
                tracing::warn!("Delivery failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "delivery_failed", msg.clone())
            }
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                )
            }
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Internal(format!("Database error: {}", err))
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    e.message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{} is invalid", field))
                })
            })
            .collect();

        let message = if messages.len() == 1 {
            messages[0].clone()
        } else {
            format!("{} validation errors", messages.len())
        };

        ApiError::Validation(message)
    }
}

impl From<WindowError> for ApiError {
    fn from(err: WindowError) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<UnsupportedFormat> for ApiError {
    fn from(err: UnsupportedFormat) -> Self {
        ApiError::UnsupportedFormat(err.0)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError::DeliveryFailed(err.to_string())
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::Internal(format!("Report rendering failed: {}", err))
    }
}

impl From<MilestoneStoreError> for ApiError {
    fn from(err: MilestoneStoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::Aggregation(e) => e.into(),
            AnalyticsError::Render(e) => e.into(),
            AnalyticsError::Dispatch(e) => e.into(),
            AnalyticsError::Milestones(e) => e.into(),
            AnalyticsError::NotificationLog(e) => e.into(),
            AnalyticsError::Recipients(e) => e.into(),
        }
    }
}

impl From<NotificationLogError> for ApiError {
    fn from(err: NotificationLogError) -> Self {
        ApiError::Internal(err.to_string())
    }
}
