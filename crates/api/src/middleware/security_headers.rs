//! Response hardening headers.

use axum::{
    body::Body,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Adds `nosniff` and `DENY` framing to every response, and `no-store` to
/// versioned API responses.
pub async fn security_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let analytics = req.uri().path().starts_with("/api/v1/");
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    if analytics {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}
