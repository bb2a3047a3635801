//! Bearer token authentication middleware.
//!
//! Validates the HS256 access token issued by the clinic's auth service and
//! stores the resulting [`Principal`] in request extensions.

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::{AnalyticsOperation, Role};
use shared::jwt::{extract_user_id, JwtConfig};

use crate::app::AppState;
use crate::error::ApiError;

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i64,
    pub role: Role,
}

impl Principal {
    /// Decodes a bearer token into a principal.
    pub fn from_token(jwt: &JwtConfig, token: &str) -> Result<Self, ApiError> {
        let claims = jwt.validate_token(token).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let user_id = extract_user_id(&claims)
            .map_err(|_| ApiError::Unauthorized("Invalid user ID in token".to_string()))?;
        let role = claims
            .role
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid role in token".to_string()))?;

        Ok(Self { user_id, role })
    }

    /// Reads and validates the `Authorization: Bearer` header.
    pub fn from_headers(jwt: &JwtConfig, headers: &HeaderMap) -> Result<Self, ApiError> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::Unauthorized("Missing or invalid Authorization header".to_string())
            })?;

        Self::from_token(jwt, token)
    }

    /// Rejects the call unless this principal's role may perform `operation`.
    pub fn authorize(&self, operation: AnalyticsOperation) -> Result<(), ApiError> {
        if operation.permits(self.role) {
            Ok(())
        } else {
            Err(ApiError::Forbidden(format!(
                "user {} ({}) may not {:?}",
                self.user_id, self.role, operation
            )))
        }
    }
}

/// Middleware that requires a valid bearer token.
pub async fn require_user_auth(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    match Principal::from_headers(&state.jwt, req.headers()) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
