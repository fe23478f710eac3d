//! Day and range window resolution
//!
//! A "day" is a local calendar day in an IANA zone, expressed as UTC
//! instants. Day boundaries are computed by zone conversion, not by adding
//! 86400 seconds, so DST-short and DST-long days come out 23 or 25 hours
//! long as they should.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::ExportError;
use crate::types::DayWindow;

/// Default span for `resolve_range` when neither bound pins it down.
const DEFAULT_RANGE_DAYS: i64 = 30;

/// Parse a strict `YYYY-MM-DD` date. The parsed value must format back to
/// the input, which rejects loose spellings like `2025-1-2`.
pub fn parse_date_strict(s: &str) -> Result<NaiveDate, ExportError> {
    let parsed = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| ExportError::InvalidDate(s.to_string()))?;
    if parsed.format("%Y-%m-%d").to_string() != s {
        return Err(ExportError::InvalidDate(s.to_string()));
    }
    Ok(parsed)
}

/// Parse an IANA zone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ExportError> {
    name.parse::<Tz>()
        .map_err(|_| ExportError::InvalidTimezone(name.to_string()))
}

/// UTC instant of local midnight on `date` in `zone`.
///
/// Ambiguous midnights (DST fall-back) resolve to the earlier instant.
/// Nonexistent midnights (spring-forward gaps) resolve to the first valid
/// local time after the gap.
pub(crate) fn local_midnight(date: NaiveDate, zone: Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    if let Some(dt) = zone.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    // Midnight fell inside a spring-forward gap; gaps are at most a few
    // hours, scan in half-hour steps.
    let mut probe = naive;
    for _ in 0..12 {
        probe += Duration::minutes(30);
        if let Some(dt) = zone.from_local_datetime(&probe).earliest() {
            return dt.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&naive)
}

/// Resolve the UTC boundaries and padded fetch window for one local day.
///
/// The fetch window spans 24 hours before the day to 1 hour after it, so
/// overlays started the previous day and switches recorded slightly after
/// midnight are still visible to the engine.
pub fn resolve_window(date: &str, timezone: &str) -> Result<DayWindow, ExportError> {
    let day = parse_date_strict(date)?;
    let zone = parse_timezone(timezone)?;
    let day_start = local_midnight(day, zone);
    let next = day
        .checked_add_days(Days::new(1))
        .ok_or_else(|| ExportError::InvalidDate(date.to_string()))?;
    let day_end = local_midnight(next, zone);
    Ok(DayWindow {
        day_start,
        day_end,
        fetch_start: day_start - Duration::hours(24),
        fetch_end: day_end + Duration::hours(1),
    })
}

/// Resolve an inclusive `(start, end)` date pair from at most two of
/// `start`, `end`, and `days`.
///
/// `now` supplies "today" so the engine itself never reads the clock.
/// Defaults: `end` is yesterday in `zone`, the span is 30 days.
pub fn resolve_range(
    zone: Tz,
    now: DateTime<Utc>,
    start: Option<&str>,
    end: Option<&str>,
    days: Option<i64>,
) -> Result<(String, String), ExportError> {
    if start.is_some() && end.is_some() && days.is_some() {
        return Err(ExportError::InvalidRange(
            "specify at most two of start, end, and days".to_string(),
        ));
    }

    let today = now.with_timezone(&zone).date_naive();
    let yesterday = today - Duration::days(1);
    let span = days.unwrap_or(DEFAULT_RANGE_DAYS);

    let (start_date, end_date) = match (start, end, days) {
        (Some(s), Some(e), None) => (parse_date_strict(s)?, parse_date_strict(e)?),
        (Some(s), None, Some(d)) => {
            let sp = parse_date_strict(s)?;
            (sp, sp + Duration::days(d))
        }
        (None, Some(e), _) => {
            let ep = parse_date_strict(e)?;
            (ep - Duration::days(span), ep)
        }
        (Some(s), None, None) => (parse_date_strict(s)?, yesterday),
        (None, None, _) => (yesterday - Duration::days(span), yesterday),
        (Some(_), Some(_), Some(_)) => unreachable!(),
    };

    if start_date > end_date {
        return Err(ExportError::InvalidRange(
            "start must be <= end".to_string(),
        ));
    }

    Ok((
        start_date.format("%Y-%m-%d").to_string(),
        end_date.format("%Y-%m-%d").to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn resolves_a_plain_day() {
        let w = resolve_window("2025-08-20", "Europe/Brussels").unwrap();
        // CEST is UTC+2 in August
        assert_eq!(w.day_start.to_rfc3339(), "2025-08-19T22:00:00+00:00");
        assert_eq!(w.day_end.to_rfc3339(), "2025-08-20T22:00:00+00:00");
        assert_eq!(w.fetch_start, w.day_start - Duration::hours(24));
        assert_eq!(w.fetch_end, w.day_end + Duration::hours(1));
    }

    #[test]
    fn dst_short_day_is_23_hours() {
        // Spring-forward in Brussels: 2025-03-30
        let w = resolve_window("2025-03-30", "Europe/Brussels").unwrap();
        assert_eq!((w.day_end - w.day_start).num_hours(), 23);
    }

    #[test]
    fn dst_long_day_is_25_hours() {
        // Fall-back in Brussels: 2025-10-26
        let w = resolve_window("2025-10-26", "Europe/Brussels").unwrap();
        assert_eq!((w.day_end - w.day_start).num_hours(), 25);
    }

    #[test]
    fn nonexistent_midnight_resolves_past_the_gap() {
        // Santiago springs forward at 2025-09-07 00:00 local; midnight does
        // not exist and the day starts at 01:00 local.
        let w = resolve_window("2025-09-07", "America/Santiago").unwrap();
        assert_eq!(w.day_start.to_rfc3339(), "2025-09-07T04:00:00+00:00");
        assert_eq!((w.day_end - w.day_start).num_hours(), 23);
    }

    #[test]
    fn rejects_malformed_dates() {
        for bad in ["2025-8-20", "20250820", "2025-02-30", "not-a-date", ""] {
            assert!(matches!(
                resolve_window(bad, "UTC"),
                Err(ExportError::InvalidDate(_))
            ));
        }
    }

    #[test]
    fn rejects_unknown_timezone() {
        assert!(matches!(
            resolve_window("2025-08-20", "Mars/Olympus_Mons"),
            Err(ExportError::InvalidTimezone(_))
        ));
    }

    fn fixed_now() -> DateTime<Utc> {
        // 2025-08-20 12:00 UTC
        Utc.with_ymd_and_hms(2025, 8, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn range_defaults_to_30_days_ending_yesterday() {
        let (s, e) = resolve_range(chrono_tz::UTC, fixed_now(), None, None, None).unwrap();
        assert_eq!(e, "2025-08-19");
        assert_eq!(s, "2025-07-20");
    }

    #[test]
    fn range_from_start_and_days() {
        let (s, e) =
            resolve_range(chrono_tz::UTC, fixed_now(), Some("2025-08-01"), None, Some(7)).unwrap();
        assert_eq!((s.as_str(), e.as_str()), ("2025-08-01", "2025-08-08"));
    }

    #[test]
    fn range_from_end_and_days() {
        let (s, e) =
            resolve_range(chrono_tz::UTC, fixed_now(), None, Some("2025-08-10"), Some(7)).unwrap();
        assert_eq!((s.as_str(), e.as_str()), ("2025-08-03", "2025-08-10"));
    }

    #[test]
    fn range_rejects_all_three_inputs() {
        assert!(matches!(
            resolve_range(
                chrono_tz::UTC,
                fixed_now(),
                Some("2025-08-01"),
                Some("2025-08-10"),
                Some(7)
            ),
            Err(ExportError::InvalidRange(_))
        ));
    }

    #[test]
    fn range_rejects_inverted_bounds() {
        assert!(matches!(
            resolve_range(
                chrono_tz::UTC,
                fixed_now(),
                Some("2025-08-10"),
                Some("2025-08-01"),
                None
            ),
            Err(ExportError::InvalidRange(_))
        ));
    }
}
