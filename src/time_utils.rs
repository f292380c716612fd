// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.
//!
//! Stored timestamps use a fixed-width RFC3339 form (millisecond precision,
//! `Z` suffix) so that lexicographic order in the datastore matches
//! chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 timestamp (any offset) into UTC.
pub fn parse_utc_rfc3339(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Serde adapter for `DateTime<Utc>` fields.
pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_utc_rfc3339(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_utc_rfc3339(&raw)
            .ok_or_else(|| D::Error::custom(format!("invalid RFC3339 timestamp: {raw}")))
    }
}

/// Serde adapter for `Option<DateTime<Utc>>` fields.
pub mod rfc3339_opt {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<DateTime<Utc>>, s: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(d) => s.serialize_some(&super::format_utc_rfc3339(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<String>::deserialize(d)? {
            Some(raw) => super::parse_utc_rfc3339(&raw)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid RFC3339 timestamp: {raw}"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn format_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(123_456);
        assert_eq!(format_utc_rfc3339(a), "2024-01-15T09:00:00.000Z");
        assert_eq!(format_utc_rfc3339(b), "2024-01-15T09:00:00.123Z");
        assert!(format_utc_rfc3339(a) < format_utc_rfc3339(b));
    }

    #[test]
    fn parse_accepts_offsets() {
        let parsed = parse_utc_rfc3339("2024-01-15T01:00:00-08:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap());
        assert!(parse_utc_rfc3339("yesterday").is_none());
    }
}
