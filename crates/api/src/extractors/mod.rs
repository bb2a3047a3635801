//! Custom Axum extractors.
//!
//! `Principal` is extractable from any handler behind the analytics router.

pub mod user_auth;
