//! Business time zone helpers.
//!
//! Every computation in this crate runs in one canonical IANA zone that the
//! caller passes in explicitly. The executing process's local zone is never
//! consulted.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ServiceWindowError;

/// Longest spring-forward gap we will step across when a local time does not exist.
const MAX_GAP_MINUTES: i64 = 180;

/// Parse an IANA timezone string into `Tz`.
pub fn parse_timezone(s: &str) -> Result<Tz, ServiceWindowError> {
    s.parse::<Tz>()
        .map_err(|_| ServiceWindowError::InvalidTimezone(format!("'{}'", s)))
}

/// Parse an RFC 3339 datetime string into `DateTime<Utc>`.
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>, ServiceWindowError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ServiceWindowError::InvalidDatetime(format!("'{}': {}", s, e)))
}

/// Convert a wall-clock time in `tz` to an absolute instant.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant.
/// Nonexistent local times (DST spring-forward) move forward to the first
/// local minute that exists.
pub fn local_to_utc(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Utc>, ServiceWindowError> {
    let mut candidate = naive;
    for _ in 0..=MAX_GAP_MINUTES {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return Ok(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(earliest, _) => return Ok(earliest.with_timezone(&Utc)),
            LocalResult::None => candidate += Duration::minutes(1),
        }
    }
    Err(ServiceWindowError::InvalidDatetime(format!(
        "local time {naive} does not exist in {}",
        tz.name()
    )))
}

/// The local calendar date and minute-of-day of `now` in `tz`.
///
/// Seconds are truncated; use [`crate::snapping`] when rounding matters.
pub fn local_date_and_minute(now: DateTime<Utc>, tz: &Tz) -> (NaiveDate, u32) {
    let local = now.with_timezone(tz);
    (local.date_naive(), local.hour() * 60 + local.minute())
}

/// Instant of `minute` minutes after local midnight on `date`.
pub fn instant_at(
    tz: &Tz,
    date: NaiveDate,
    minute: u32,
) -> Result<DateTime<Utc>, ServiceWindowError> {
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
        ServiceWindowError::InvalidDatetime(format!("no midnight on {date}"))
    })?;
    local_to_utc(tz, midnight + Duration::minutes(i64::from(minute)))
}

/// Like [`instant_at`], but picks the first instant of the local minute that
/// is not before `not_before`.
///
/// Only differs during a DST fall-back hour, where a local minute occurs
/// twice: once `not_before` has passed the first occurrence, the repeat is
/// still servable.
pub fn instant_at_or_after(
    tz: &Tz,
    date: NaiveDate,
    minute: u32,
    not_before: DateTime<Utc>,
) -> Result<DateTime<Utc>, ServiceWindowError> {
    let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| {
        ServiceWindowError::InvalidDatetime(format!("no midnight on {date}"))
    })?;
    let naive = midnight + Duration::minutes(i64::from(minute));
    match tz.from_local_datetime(&naive) {
        LocalResult::Ambiguous(earliest, latest) => {
            let earliest = earliest.with_timezone(&Utc);
            if earliest >= not_before {
                Ok(earliest)
            } else {
                Ok(latest.with_timezone(&Utc))
            }
        }
        _ => local_to_utc(tz, naive),
    }
}
