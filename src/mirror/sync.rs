// SPDX-License-Identifier: MPL-2.0

//! Sync timestamp bookkeeping.
//!
//! A single ISO-8601 string, overwritten on every mutating mirror write
//! and on every successful remote mutation. Its only job is deciding
//! when the session tier has sat idle long enough to be discarded.

use chrono::{DateTime, SecondsFormat, Utc};

/// Session tier is discarded after this much write inactivity
pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Current instant in the stored format
pub fn now_stamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Whether a recorded stamp is older than the session TTL relative to
/// `now`. An unparseable stamp counts as stale.
pub fn is_stale(stamp: &str, now: DateTime<Utc>) -> bool {
    match DateTime::parse_from_rfc3339(stamp) {
        Ok(recorded) => (now - recorded.with_timezone(&Utc)).num_seconds() > SESSION_TTL_SECS,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fresh_stamp_is_not_stale() {
        let stamp = now_stamp();
        assert!(!is_stale(&stamp, Utc::now()));
    }

    #[test]
    fn test_day_old_stamp_is_stale() {
        let stamp = now_stamp();
        let later = Utc::now() + Duration::seconds(SESSION_TTL_SECS + 60);
        assert!(is_stale(&stamp, later));
    }

    #[test]
    fn test_garbage_stamp_is_stale() {
        assert!(is_stale("not a timestamp", Utc::now()));
        assert!(is_stale("", Utc::now()));
    }

    #[test]
    fn test_stamp_roundtrips_rfc3339() {
        let stamp = now_stamp();
        assert!(DateTime::parse_from_rfc3339(&stamp).is_ok());
    }
}
