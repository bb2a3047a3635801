//! Common validation utilities.

use chrono::{DateTime, NaiveDate, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use validator::ValidationError;

lazy_static! {
    /// International phone number in E.164 form, e.g. `+263771234567`.
    static ref PHONE_REGEX: Regex = Regex::new(r"^\+[1-9][0-9]{7,14}$").unwrap();
}

/// Validates that a phone number is in E.164 format.
pub fn validate_phone_number(phone: &str) -> Result<(), ValidationError> {
    if PHONE_REGEX.is_match(phone) {
        Ok(())
    } else {
        let mut err = ValidationError::new("phone_format");
        err.message = Some("Phone number must be in international format, e.g. +263771234567".into());
        Err(err)
    }
}

/// Parses a `YYYY-MM-DD` date or an RFC 3339 timestamp into a UTC instant.
///
/// Plain dates resolve to midnight UTC.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| {
            let mut err = ValidationError::new("timestamp_format");
            err.message = Some(
                format!("Invalid date '{}' (expected YYYY-MM-DD or RFC 3339)", value).into(),
            );
            err
        })
}

/// Validates that `start` is strictly before `end`.
pub fn validate_date_order(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), ValidationError> {
    if start < end {
        Ok(())
    } else {
        let mut err = ValidationError::new("date_order");
        err.message = Some("Start date must be before end date".into());
        Err(err)
    }
}
