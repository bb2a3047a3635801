//! Shared utilities and common types for the ClinicCore backend.
//!
//! This crate provides common functionality used across all other crates:
//! - JWT validation for the clinic's bearer tokens
//! - Common validation logic
//! - Pagination helpers

pub mod jwt;
pub mod pagination;
pub mod validation;
