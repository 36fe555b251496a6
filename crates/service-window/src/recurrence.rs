//! Recurring operating windows.
//!
//! A [`RecurringInterval`] pairs a time-of-day [`Interval`] with a
//! [`RecurrenceRule`] that selects the calendar dates on which the window
//! applies. Rules use the RFC 5545 RRULE grammar and are expanded with the
//! `rrule` crate; [`expand`] is the only place that knows about the grammar,
//! so the resolver only ever sees concrete [`DatedInterval`]s.
//!
//! # Anchoring
//!
//! RRULE expansion depends on DTSTART. When a rule has no explicit
//! `anchor`, DTSTART is the Monday of the ISO week containing the start of
//! the requested range. That is deterministic for `DAILY` and `WEEKLY` rules
//! and for `MONTHLY`/`YEARLY` rules that name their days (`BYMONTHDAY`,
//! `BYDAY`, `BYMONTH` with `BYMONTHDAY`, ...). Rules whose occurrences depend
//! on the exact start date (`INTERVAL` > 1, `COUNT`, `UNTIL`, or a bare
//! `FREQ=MONTHLY`/`FREQ=YEARLY`) must set an anchor.

use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::error::ServiceWindowError;
use crate::interval::{DatedInterval, Interval};

/// Upper bound on occurrences returned by a single expansion.
pub const MAX_OCCURRENCES: u16 = 2000;

const DAY_FREQUENCIES: [&str; 4] = ["DAILY", "WEEKLY", "MONTHLY", "YEARLY"];

/// An inclusive range of local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ServiceWindowError> {
        if start > end {
            return Err(ServiceWindowError::InvalidDatetime(format!(
                "date range starts {start} after it ends {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// A range covering `days` dates beginning at `start`.
    pub fn starting_at(start: NaiveDate, days: u32) -> Self {
        let span = i64::from(days.max(1)) - 1;
        Self {
            start,
            end: start + Duration::days(span),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Every date in the range, in calendar order.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }
}

/// An RRULE body (`FREQ=WEEKLY;BYDAY=MO,TU`) with an optional DTSTART anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub rrule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<NaiveDate>,
}

impl RecurrenceRule {
    pub fn new(rrule: impl Into<String>) -> Self {
        Self {
            rrule: rrule.into(),
            anchor: None,
        }
    }

    pub fn anchored(rrule: impl Into<String>, anchor: NaiveDate) -> Self {
        Self {
            rrule: rrule.into(),
            anchor: Some(anchor),
        }
    }

    /// Shorthand for a window that applies every day.
    pub fn daily() -> Self {
        Self::new("FREQ=DAILY")
    }

    /// The rule body with any leading `RRULE:` stripped.
    fn body(&self) -> &str {
        let trimmed = self.rrule.trim();
        trimmed.strip_prefix("RRULE:").unwrap_or(trimmed)
    }

    /// Check the rule without expanding it.
    pub fn validate(&self) -> Result<(), ServiceWindowError> {
        let body = self.body();
        if body.is_empty() {
            return Err(ServiceWindowError::InvalidRule("empty rule".to_string()));
        }
        if body.contains('\n') || body.to_ascii_uppercase().contains("DTSTART") {
            return Err(ServiceWindowError::InvalidRule(format!(
                "'{body}': give only the RRULE body; DTSTART comes from the anchor"
            )));
        }

        let mut freq = None;
        let mut keys = Vec::new();
        let mut needs_anchor = false;
        for part in body.split(';') {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                ServiceWindowError::InvalidRule(format!("'{body}': malformed part '{part}'"))
            })?;
            let key = key.trim().to_ascii_uppercase();
            match key.as_str() {
                "FREQ" => freq = Some(value.trim().to_ascii_uppercase()),
                "INTERVAL" => needs_anchor |= value.trim() != "1",
                "COUNT" | "UNTIL" => needs_anchor = true,
                _ => {}
            }
            keys.push(key);
        }

        let freq = match freq {
            None => {
                return Err(ServiceWindowError::InvalidRule(format!(
                    "'{body}': missing FREQ"
                )))
            }
            Some(f) if !DAY_FREQUENCIES.contains(&f.as_str()) => {
                return Err(ServiceWindowError::InvalidRule(format!(
                    "'{body}': FREQ={f} is finer than a day"
                )))
            }
            Some(f) => f,
        };

        if self.anchor.is_none() {
            if needs_anchor {
                return Err(ServiceWindowError::InvalidRule(format!(
                    "'{body}': INTERVAL, COUNT and UNTIL require an anchor date"
                )));
            }
            if day_comes_from_dtstart(&freq, &keys) {
                return Err(ServiceWindowError::InvalidRule(format!(
                    "'{body}': FREQ={freq} without a day selector repeats on the anchor's day; \
                     set an anchor date or add BYMONTHDAY/BYDAY"
                )));
            }
        }
        Ok(())
    }

    /// DTSTART for an expansion over `range`.
    fn dtstart(&self, range: &DateRange) -> NaiveDate {
        self.anchor.unwrap_or_else(|| {
            let offset = range.start.weekday().num_days_from_monday();
            range.start - Duration::days(i64::from(offset))
        })
    }

    /// Dates in `range` on which the rule occurs, ascending and deduplicated.
    pub fn occurrences(
        &self,
        range: &DateRange,
        tz: &Tz,
    ) -> Result<Vec<NaiveDate>, ServiceWindowError> {
        self.validate()?;

        let dtstart = self.dtstart(range);
        if dtstart > range.end {
            return Ok(Vec::new());
        }

        // Occurrences are pinned to local noon so DST transitions at midnight
        // cannot push them onto a neighbouring date.
        let source = if *tz == Tz::UTC {
            format!(
                "DTSTART:{}T120000Z\nRRULE:{}",
                dtstart.format("%Y%m%d"),
                self.body()
            )
        } else {
            format!(
                "DTSTART;TZID={}:{}T120000\nRRULE:{}",
                tz.name(),
                dtstart.format("%Y%m%d"),
                self.body()
            )
        };

        let set: RRuleSet = source
            .parse()
            .map_err(|e| ServiceWindowError::InvalidRule(format!("'{}': {e}", self.body())))?;

        let rtz: rrule::Tz = (*tz).into();
        let after = noon(tz, range.start - Duration::days(1))?.with_timezone(&rtz);
        let before = noon(tz, range.end + Duration::days(1))?.with_timezone(&rtz);

        let result = set.after(after).before(before).all(MAX_OCCURRENCES);
        if result.limited && result.dates.len() >= usize::from(MAX_OCCURRENCES) {
            return Err(ServiceWindowError::Expansion(format!(
                "'{}' produced more than {MAX_OCCURRENCES} occurrences between {} and {}",
                self.body(),
                range.start,
                range.end
            )));
        }

        let mut dates: Vec<NaiveDate> = result
            .dates
            .iter()
            .map(|dt| dt.with_timezone(tz).date_naive())
            .filter(|d| range.contains(*d))
            .collect();
        dates.sort();
        dates.dedup();
        Ok(dates)
    }
}

/// Whether a rule takes its day of month (or of year) from DTSTART.
fn day_comes_from_dtstart(freq: &str, keys: &[String]) -> bool {
    let has = |key: &str| keys.iter().any(|k| k == key);
    match freq {
        "MONTHLY" => !(has("BYMONTHDAY") || has("BYDAY") || has("BYYEARDAY") || has("BYWEEKNO")),
        "YEARLY" => {
            !((has("BYMONTH") && has("BYMONTHDAY"))
                || has("BYYEARDAY")
                || has("BYWEEKNO")
                || has("BYDAY"))
        }
        _ => false,
    }
}

fn noon(tz: &Tz, date: NaiveDate) -> Result<chrono::DateTime<chrono::Utc>, ServiceWindowError> {
    crate::zone::instant_at(tz, date, 12 * 60)
}

/// A time-of-day window that repeats on the dates selected by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawRecurringInterval", into = "RawRecurringInterval")]
pub struct RecurringInterval {
    pub interval: Interval,
    pub rule: RecurrenceRule,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRecurringInterval {
    start: u32,
    end: u32,
    rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    anchor: Option<NaiveDate>,
}

impl TryFrom<RawRecurringInterval> for RecurringInterval {
    type Error = ServiceWindowError;

    fn try_from(raw: RawRecurringInterval) -> Result<Self, Self::Error> {
        Ok(Self {
            interval: Interval::new(raw.start, raw.end)?,
            rule: RecurrenceRule {
                rrule: raw.rule,
                anchor: raw.anchor,
            },
        })
    }
}

impl From<RecurringInterval> for RawRecurringInterval {
    fn from(r: RecurringInterval) -> Self {
        Self {
            start: r.interval.start,
            end: r.interval.end,
            rule: r.rule.rrule,
            anchor: r.rule.anchor,
        }
    }
}

impl RecurringInterval {
    pub fn new(interval: Interval, rule: RecurrenceRule) -> Self {
        Self { interval, rule }
    }
}

/// Expand a recurring window into concrete dated intervals over `range`.
///
/// The result is sorted by date then start time and contains no duplicates.
/// Empty windows expand to nothing.
///
/// # Errors
///
/// Returns [`ServiceWindowError::InvalidRule`] if the rule cannot be parsed,
/// or [`ServiceWindowError::Expansion`] if it yields more occurrences than
/// [`MAX_OCCURRENCES`].
pub fn expand(
    recurring: &RecurringInterval,
    range: &DateRange,
    tz: &Tz,
) -> Result<Vec<DatedInterval>, ServiceWindowError> {
    if recurring.interval.is_empty() {
        recurring.rule.validate()?;
        return Ok(Vec::new());
    }
    let dates = recurring.rule.occurrences(range, tz)?;
    Ok(dates
        .into_iter()
        .map(|date| DatedInterval {
            date,
            interval: recurring.interval,
        })
        .collect())
}
