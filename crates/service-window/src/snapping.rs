//! Service-time snapping and conversion.
//!
//! Service times are expressed as a local date plus minutes after midnight
//! ([`ServiceDateTime`]). Snapping rounds an instant *up* to the next slot
//! boundary, so a snapped time is never earlier than the input.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ServiceWindowError;
use crate::interval::MINUTES_PER_DAY;
use crate::zone;

/// When an order will be serviced, in the business's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServiceDateTime {
    pub selected_date: NaiveDate,
    /// Minutes after local midnight.
    pub selected_time: u32,
}

impl ServiceDateTime {
    pub fn new(selected_date: NaiveDate, selected_time: u32) -> Self {
        Self {
            selected_date,
            selected_time,
        }
    }

    /// The local date and minute of `instant` in `tz`.
    pub fn from_instant(instant: DateTime<Utc>, tz: &Tz) -> Self {
        let (selected_date, selected_time) = zone::local_date_and_minute(instant, tz);
        Self {
            selected_date,
            selected_time,
        }
    }
}

impl fmt::Display for ServiceDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:02}:{:02}",
            self.selected_date,
            self.selected_time / 60,
            self.selected_time % 60
        )
    }
}

/// Round `minute` up to the next multiple of `step`.
pub fn ceil_to_step(minute: u32, step: u32) -> u32 {
    let step = step.max(1);
    minute.div_ceil(step) * step
}

/// Round `now` up to the next `step_minutes` boundary of the local day.
///
/// Works by adding the distance to the boundary to `now` itself rather than
/// rebuilding a wall-clock time, so a DST fold cannot produce an earlier
/// instant. Any sub-minute remainder rounds up. Steps that do not divide a
/// day evenly restart their grid at each local midnight.
pub fn snap_instant(now: DateTime<Utc>, tz: &Tz, step_minutes: u32) -> DateTime<Utc> {
    let step_secs = i64::from(step_minutes.clamp(1, MINUTES_PER_DAY)) * 60;
    let local = now.with_timezone(tz);
    let secs = i64::from(local.num_seconds_from_midnight());
    let bump = i64::from(local.nanosecond() > 0);
    let target = (secs + bump + step_secs - 1) / step_secs * step_secs;
    now.trunc_subsecs(0) + Duration::seconds(target - secs)
}

/// Fast-path service time when the business is open: `now` snapped up to
/// the slot grid.
///
/// The returned time is never before `now`; it rolls onto the next date when
/// `now` is in the last slot of the day.
pub fn compute_fulfillment_time(now: DateTime<Utc>, tz: &Tz, step_minutes: u32) -> ServiceDateTime {
    ServiceDateTime::from_instant(snap_instant(now, tz, step_minutes), tz)
}

/// Convert a local service date and time into an absolute instant.
///
/// # Errors
///
/// Returns [`ServiceWindowError::InvalidDatetime`] if `selected_time` is not
/// within the day.
pub fn compute_service_date_time(
    candidate: &ServiceDateTime,
    tz: &Tz,
) -> Result<DateTime<Utc>, ServiceWindowError> {
    if candidate.selected_time >= MINUTES_PER_DAY {
        return Err(ServiceWindowError::InvalidDatetime(format!(
            "selected_time {} is outside the day",
            candidate.selected_time
        )));
    }
    zone::instant_at(tz, candidate.selected_date, candidate.selected_time)
}
