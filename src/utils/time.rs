// src/utils/time.rs
//! Calendar arithmetic on Unix timestamps.
//!
//! Visa lifetimes are expressed in years (`asserted + 1y`, `asserted + 100y`),
//! so plain second offsets are not good enough around leap years. All
//! computations are done in UTC.

use chrono::{Months, TimeZone, Utc};

/// Current time as seconds since the Unix epoch.
pub fn now() -> i64 {
    Utc::now().timestamp()
}

/// Adds `years` calendar years to a Unix timestamp.
///
/// Feb 29 maps to Feb 28 in non-leap target years. Returns `i64::MAX` if the
/// result is not representable, which keeps the visa valid rather than
/// silently expiring it.
pub fn plus_years(timestamp: i64, years: u32) -> i64 {
    Utc.timestamp_opt(timestamp, 0)
        .single()
        .and_then(|t| t.checked_add_months(Months::new(years.saturating_mul(12))))
        .map(|t| t.timestamp())
        .unwrap_or(i64::MAX)
}

/// `YYYY-MM-DD` rendering of a timestamp, used in log output.
pub fn iso_date(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(t) => t.format("%Y-%m-%d").to_string(),
        None => timestamp.to_string(),
    }
}

/// `YYYY-MM-DDTHH:MM:SS` rendering of a timestamp, used in log output.
pub fn iso_date_time(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(t) => t.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}
