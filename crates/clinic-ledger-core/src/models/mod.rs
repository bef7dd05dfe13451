//! Domain models for the clinic ledger.

mod activity;
mod care;
mod charge;
mod patient;
mod payment;
mod shift;
mod user;

pub use activity::*;
pub use care::*;
pub use charge::*;
pub use patient::*;
pub use payment::*;
pub use shift::*;
pub use user::*;

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time as an RFC 3339 UTC string with millisecond precision.
///
/// All stored timestamps use this shape so that SQL ordering on the text
/// columns matches chronological ordering.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Format a UTC instant the same way [`now_timestamp`] does.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored RFC 3339 timestamp.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value).map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_roundtrip() {
        let now = now_timestamp();
        let parsed = parse_timestamp(&now).unwrap();
        assert_eq!(format_timestamp(parsed), now);
        assert!(now.ends_with('Z'));
    }

    #[test]
    fn test_parse_offset_timestamp() {
        let parsed = parse_timestamp("2024-01-15T12:00:00+02:00").unwrap();
        assert_eq!(format_timestamp(parsed), "2024-01-15T10:00:00.000Z");
    }
}
