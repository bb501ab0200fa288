//! Timestamp and UTC bucket utilities
//!
//! Quota counters and metrics are keyed by UTC day / UTC minute buckets so
//! that counters roll over automatically with no explicit reset logic.

use chrono::{DateTime, Datelike, TimeZone, Utc};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Current UTC day bucket key, formatted `YYYYMMDD`
pub fn utc_day_bucket() -> String {
    day_bucket_of(now())
}

/// Current UTC minute bucket key, formatted `YYYYMMDDHHMM`
pub fn utc_minute_bucket() -> String {
    minute_bucket_of(now())
}

/// Day bucket key for an arbitrary timestamp
pub fn day_bucket_of(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d").to_string()
}

/// Minute bucket key for an arbitrary timestamp
pub fn minute_bucket_of(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d%H%M").to_string()
}

/// Start of the next UTC day
///
/// Reported as `resetAt` on daily quota counters.
pub fn next_utc_midnight() -> DateTime<Utc> {
    let today = now().date_naive();
    let tomorrow = today.succ_opt().unwrap_or(today);
    Utc.with_ymd_and_hms(tomorrow.year(), tomorrow.month(), tomorrow.day(), 0, 0, 0)
        .single()
        .unwrap_or_else(now)
}
