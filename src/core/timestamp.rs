//! Timestamp formats for the `timestamp` field

use super::field::FieldValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// How the timestamp valuer renders the emission time
///
/// # Examples
///
/// ```
/// use rust_trace_logger::core::TimestampFormat;
/// use chrono::Utc;
///
/// let format = TimestampFormat::Rfc3339;
/// let timestamp = format.format(&Utc::now());
/// assert!(timestamp.ends_with('Z'));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampFormat {
    /// RFC 3339 with second precision: `2025-01-08T10:30:45Z`
    #[default]
    Rfc3339,

    /// ISO 8601 with milliseconds: `2025-01-08T10:30:45.123Z`
    Iso8601Millis,

    /// Unix timestamp in seconds, emitted as a number
    Unix,

    /// Unix timestamp in milliseconds, emitted as a number
    UnixMillis,

    /// Custom strftime format
    Custom(String),
}

impl TimestampFormat {
    #[must_use]
    pub fn format(&self, datetime: &DateTime<Utc>) -> String {
        match self {
            TimestampFormat::Rfc3339 => datetime.to_rfc3339_opts(SecondsFormat::Secs, true),
            TimestampFormat::Iso8601Millis => {
                datetime.to_rfc3339_opts(SecondsFormat::Millis, true)
            }
            TimestampFormat::Unix => datetime.timestamp().to_string(),
            TimestampFormat::UnixMillis => datetime.timestamp_millis().to_string(),
            TimestampFormat::Custom(format_str) => datetime.format(format_str).to_string(),
        }
    }

    /// Render as a field value; numeric formats stay numeric
    #[must_use]
    pub fn to_field_value(&self, datetime: &DateTime<Utc>) -> FieldValue {
        match self {
            TimestampFormat::Unix => FieldValue::Int(datetime.timestamp()),
            TimestampFormat::UnixMillis => FieldValue::Int(datetime.timestamp_millis()),
            _ => FieldValue::String(self.format(datetime)),
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        matches!(self, TimestampFormat::Unix | TimestampFormat::UnixMillis)
    }
}
