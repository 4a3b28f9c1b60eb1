//! Timestamp helpers.

use chrono::{DateTime, SecondsFormat, Utc};

/// Represents a UTC timestamp.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC time as an RFC 3339 string with millisecond
/// precision and a `Z` suffix, e.g. `2024-05-01T10:22:03.123Z`.
///
/// # Examples
///
/// ```
/// use stitchflow::utils::iso_timestamp;
///
/// let ts = iso_timestamp();
/// assert!(ts.contains('T'));
/// assert!(ts.ends_with('Z'));
/// ```
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns milliseconds since the Unix epoch.
#[must_use]
pub fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}
