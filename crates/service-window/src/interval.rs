//! Time-of-day interval primitives.
//!
//! An [`Interval`] is a half-open range `[start, end)` measured in minutes
//! after local midnight. Intervals never cross midnight: `end` is at most
//! [`MINUTES_PER_DAY`], which stands for "until the end of the day".
//!
//! A [`DatedInterval`] pins an interval to a local calendar date; it is the
//! unit produced by recurrence expansion and consumed by the resolver.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ServiceWindowError;

/// Minutes in a calendar day. The largest legal `end` of an [`Interval`].
pub const MINUTES_PER_DAY: u32 = 1440;

/// A half-open range of minutes-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct Interval {
    pub start: u32,
    pub end: u32,
}

#[derive(Deserialize)]
struct RawInterval {
    start: u32,
    end: u32,
}

impl TryFrom<RawInterval> for Interval {
    type Error = ServiceWindowError;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Interval::new(raw.start, raw.end)
    }
}

impl Interval {
    /// Build an interval, rejecting `start > end` and ends past midnight.
    pub fn new(start: u32, end: u32) -> Result<Self, ServiceWindowError> {
        if start > end {
            return Err(ServiceWindowError::InvalidInterval(format!(
                "start {start} is after end {end}"
            )));
        }
        if end > MINUTES_PER_DAY {
            return Err(ServiceWindowError::InvalidInterval(format!(
                "end {end} is past midnight ({MINUTES_PER_DAY})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Length in minutes.
    pub fn duration(&self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether `minute` lies in `[start, end)`.
    pub fn contains(&self, minute: u32) -> bool {
        self.start <= minute && minute < self.end
    }

    /// Whether the two ranges share at least one minute.
    ///
    /// Adjacent intervals (one ends where the other starts) do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// One concrete occurrence of a window on a local calendar date.
///
/// Ordered by `(date, start, end)`, which is the scan order of the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DatedInterval {
    pub date: NaiveDate,
    pub interval: Interval,
}

/// Merge intervals into a sorted list of disjoint intervals.
///
/// Overlapping and adjacent intervals are coalesced. Empty intervals are dropped.
pub fn merge_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.iter().copied().filter(|i| !i.is_empty()).collect();
    sorted.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        if let Some(last) = merged.last_mut() {
            if interval.start <= last.end {
                last.end = last.end.max(interval.end);
                continue;
            }
        }
        merged.push(interval);
    }
    merged
}

/// Remove every minute covered by `to_remove` from `base`.
///
/// Both inputs may be unsorted and overlapping; the result is merged and sorted.
pub fn subtract_intervals(base: &[Interval], to_remove: &[Interval]) -> Vec<Interval> {
    let base = merge_intervals(base);
    let to_remove = merge_intervals(to_remove);

    let mut result = Vec::new();
    let mut ri = 0;

    for b in base {
        let mut current_start = b.start;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < b.end {
            let r = to_remove[j];
            if r.start > current_start {
                result.push(Interval {
                    start: current_start,
                    end: r.start,
                });
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < b.end {
            result.push(Interval {
                start: current_start,
                end: b.end,
            });
        }
    }

    result
}
