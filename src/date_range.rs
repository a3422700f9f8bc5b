//! Fetch window resolution
//!
//! Turns the optional `since`/`until` strings handed to an integration into a concrete
//! `[start, end]` window. `since` is either a manual override (a calendar date) or the
//! stored watermark of the last automatic run (an ISO-8601 instant). When it is a
//! watermark, the window starts at midnight of the day *before* the watermark so that
//! late-arriving data around the day boundary is fetched again.
//!
//! No check is made that `start <= end`; integrations return no points for an empty or
//! inverted window.

use crate::Error;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use ohno::app_err;

/// Length of the window used when no watermark exists yet.
pub const FIRST_RUN_LOOKBACK_DAYS: i64 = 7;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// A resolved fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    /// First calendar day covered by the window.
    #[must_use]
    pub fn start_date(&self) -> NaiveDate {
        self.start.date_naive()
    }

    /// Last calendar day covered by the window.
    #[must_use]
    pub fn end_date(&self) -> NaiveDate {
        self.end.date_naive()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

impl core::fmt::Display for DateRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} to {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Resolve a fetch window relative to the current time.
pub fn resolve(since: Option<&str>, until: Option<&str>) -> Result<DateRange, Error> {
    resolve_at(since, until, Utc::now())
}

/// Resolve a fetch window relative to `now`.
///
/// - `until` absent: the window ends at `now`. A calendar date ends the window at 23:59:59
///   that day; anything else must be an ISO-8601 instant.
/// - `since` absent: the window starts [`FIRST_RUN_LOOKBACK_DAYS`] before its end.
///   A calendar date starts the window at midnight that day; anything else is a watermark.
pub fn resolve_at(since: Option<&str>, until: Option<&str>, now: DateTime<Utc>) -> Result<DateRange, Error> {
    let end = match until {
        None => now,
        Some(s) => match parse_date(s) {
            Some(date) => end_of_day(date),
            None => parse_instant(s).ok_or_else(|| Error::Validation(app_err!("invalid end date or timestamp '{s}'")))?,
        },
    };

    let start = match since {
        None => end - Duration::days(FIRST_RUN_LOOKBACK_DAYS),
        Some(s) => match parse_date(s) {
            Some(date) => start_of_day(date),
            None => {
                let watermark =
                    parse_instant(s).ok_or_else(|| Error::Validation(app_err!("invalid start date or watermark '{s}'")))?;
                start_of_day((watermark - Duration::days(1)).date_naive())
            }
        },
    };

    Ok(DateRange { start, end })
}

/// Parse a `YYYY-MM-DD` calendar date.
#[must_use]
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Parse an ISO-8601 instant. Instants without an offset are taken to be UTC.
#[must_use]
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[must_use]
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    start_of_day(date) + Duration::seconds(86_399)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_defaults_to_seven_day_window_ending_now() {
        let before = Utc::now();
        let range = resolve(None, None).unwrap();
        let after = Utc::now();

        assert!(range.end >= before && range.end <= after);
        assert_eq!(range.end - range.start, Duration::days(7));
    }

    #[test]
    fn test_calendar_since_starts_at_midnight() {
        let range = resolve_at(Some("2026-01-20"), None, at("2026-01-25T10:00:00Z")).unwrap();
        assert_eq!(range.start, at("2026-01-20T00:00:00Z"));
        assert_eq!(range.end, at("2026-01-25T10:00:00Z"));
    }

    #[test]
    fn test_calendar_until_ends_at_last_second() {
        let range = resolve_at(None, Some("2026-01-20"), at("2026-01-25T10:00:00Z")).unwrap();
        assert_eq!(range.end, at("2026-01-20T23:59:59Z"));
        assert_eq!(range.start, at("2026-01-13T23:59:59Z"));
    }

    #[test]
    fn test_watermark_refetches_prior_day() {
        let range = resolve_at(Some("2026-01-20T08:30:00+00:00"), None, at("2026-01-20T09:00:00Z")).unwrap();
        assert_eq!(range.start, at("2026-01-19T00:00:00Z"));
    }

    #[test]
    fn test_watermark_with_fraction_and_z_suffix() {
        let range = resolve_at(Some("2026-01-20T00:00:01.123456Z"), None, at("2026-01-21T00:00:00Z")).unwrap();
        assert_eq!(range.start, at("2026-01-19T00:00:00Z"));
    }

    #[test]
    fn test_watermark_with_non_utc_offset_is_normalized() {
        // 2026-01-20T01:00:00-07:00 is 2026-01-20T08:00:00Z
        let range = resolve_at(Some("2026-01-20T01:00:00-07:00"), None, at("2026-01-21T00:00:00Z")).unwrap();
        assert_eq!(range.start, at("2026-01-19T00:00:00Z"));
    }

    #[test]
    fn test_naive_instant_is_treated_as_utc() {
        let range = resolve_at(Some("2026-01-20T12:00:00"), None, at("2026-01-21T00:00:00Z")).unwrap();
        assert_eq!(range.start, at("2026-01-19T00:00:00Z"));
    }

    #[test]
    fn test_instant_until() {
        let range = resolve_at(None, Some("2026-01-20T06:15:00Z"), at("2026-01-25T10:00:00Z")).unwrap();
        assert_eq!(range.end, at("2026-01-20T06:15:00Z"));
    }

    #[test]
    fn test_inverted_range_is_permitted() {
        let range = resolve_at(Some("2026-02-01"), Some("2026-01-01"), at("2026-03-01T00:00:00Z")).unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_malformed_inputs_are_validation_errors() {
        let err = resolve_at(Some("yesterday"), None, Utc::now()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);

        let err = resolve_at(None, Some("2026-13-45"), Utc::now()).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn test_contains_and_dates() {
        let range = resolve_at(Some("2026-01-17"), Some("2026-01-18"), Utc::now()).unwrap();
        assert_eq!(range.start_date(), NaiveDate::from_ymd_opt(2026, 1, 17).unwrap());
        assert_eq!(range.end_date(), NaiveDate::from_ymd_opt(2026, 1, 18).unwrap());
        assert!(range.contains(at("2026-01-18T23:59:59Z")));
        assert!(!range.contains(at("2026-01-19T00:00:00Z")));
    }
}
