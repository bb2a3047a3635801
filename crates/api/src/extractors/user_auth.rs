//! Authenticated principal extractor.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::user_auth::Principal;

/// Uses the principal stored by `require_user_auth`, or validates the
/// bearer token itself when the middleware did not run.
#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(principal) = parts.extensions.get::<Principal>() {
            return Ok(*principal);
        }

        Principal::from_headers(&state.jwt, &parts.headers)
    }
}
