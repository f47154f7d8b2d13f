// -------------------------------------------------------------------------------------------------
//  Copyright (c) 2024 Vellum Project Contributors
//
//  Licensed under the MIT License. See the LICENSE file in the repository root for full terms.
// -------------------------------------------------------------------------------------------------

//! Absolute date/time values.
//!
//! Unlike strings, lists, hashes and binaries, a date is small and immutable
//! enough to be passed by value rather than held behind a [`crate::envelope::StrongRef`];
//! there is no `ref()`/`deref()` ceremony for dates.

use chrono::{DateTime, TimeZone, Utc};

/// An absolute point in time, always normalized to UTC internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QDate(DateTime<Utc>);

impl QDate {
    #[must_use]
    pub fn from_epoch_seconds(secs: i64) -> Self {
        Self(
            Utc.timestamp_opt(secs, 0)
                .single()
                .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().expect("epoch is representable")),
        )
    }

    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now())
    }

    #[must_use]
    pub fn to_epoch_seconds(self) -> i64 {
        self.0.timestamp()
    }

    #[must_use]
    pub fn datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for QDate {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_roundtrip() {
        let d = QDate::from_epoch_seconds(1_700_000_000);
        assert_eq!(d.to_epoch_seconds(), 1_700_000_000);
    }

    #[test]
    fn test_ordering_follows_time() {
        let a = QDate::from_epoch_seconds(100);
        let b = QDate::from_epoch_seconds(200);
        assert!(a < b);
    }
}
