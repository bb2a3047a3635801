//! Domain layer for the ClinicCore analytics backend.
//!
//! This crate contains:
//! - Domain models (metric windows, milestones, notifications, report records)
//! - The milestone tracker and notification dispatcher
//! - Store and channel traits implemented by the outer layers

pub mod models;
pub mod services;
