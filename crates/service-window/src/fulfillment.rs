//! Fulfillment channel configuration and per-date operating windows.
//!
//! A [`FulfillmentConfig`] describes one way an order can be completed
//! (pickup, delivery, dine-in): its recurring operating hours, date-specific
//! overrides and closures, and the lead time and slot granularity used when
//! picking a service time. Configs are read-only here; creating and storing
//! them belongs to the surrounding application.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ServiceWindowError;
use crate::interval::{merge_intervals, subtract_intervals, Interval, MINUTES_PER_DAY};
use crate::recurrence::{expand, DateRange, RecurringInterval};

/// Slot granularity used when a config does not set one.
pub const DEFAULT_TIME_STEP_MINUTES: u32 = 5;

/// The channel through which an order is completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceKind {
    Pickup,
    Delivery,
    DineIn,
}

/// Time-of-day intervals attached to one specific date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DateIntervals {
    pub date: NaiveDate,
    #[serde(default)]
    pub intervals: Vec<Interval>,
}

/// Operating configuration of one fulfillment channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FulfillmentConfig {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub service: ServiceKind,
    /// Windows that repeat according to their rules.
    #[serde(default)]
    pub operating_hours: Vec<RecurringInterval>,
    /// Replace the recurring hours on the listed dates. An entry with no
    /// intervals closes the channel for that date.
    #[serde(default)]
    pub special_hours: Vec<DateIntervals>,
    /// Subtracted from whatever hours apply on the listed dates.
    #[serde(default)]
    pub blocked_off: Vec<DateIntervals>,
    /// Minimum preparation time that must remain before a window closes.
    #[serde(default)]
    pub lead_time_minutes: u32,
    #[serde(default = "default_time_step")]
    pub time_step_minutes: u32,
    /// How long a single fulfillment event occupies.
    #[serde(default)]
    pub max_duration_minutes: u32,
}

fn default_time_step() -> u32 {
    DEFAULT_TIME_STEP_MINUTES
}

impl FulfillmentConfig {
    /// A config with no hours; add windows with the builder methods.
    pub fn new(id: impl Into<String>, service: ServiceKind) -> Self {
        let id = id.into();
        Self {
            display_name: id.clone(),
            id,
            service,
            operating_hours: Vec::new(),
            special_hours: Vec::new(),
            blocked_off: Vec::new(),
            lead_time_minutes: 0,
            time_step_minutes: DEFAULT_TIME_STEP_MINUTES,
            max_duration_minutes: 0,
        }
    }

    pub fn with_hours(mut self, hours: RecurringInterval) -> Self {
        self.operating_hours.push(hours);
        self
    }

    pub fn with_special_hours(mut self, date: NaiveDate, intervals: Vec<Interval>) -> Self {
        self.special_hours.push(DateIntervals { date, intervals });
        self
    }

    pub fn with_blocked_off(mut self, date: NaiveDate, intervals: Vec<Interval>) -> Self {
        self.blocked_off.push(DateIntervals { date, intervals });
        self
    }

    pub fn with_lead_time(mut self, minutes: u32) -> Self {
        self.lead_time_minutes = minutes;
        self
    }

    pub fn with_time_step(mut self, minutes: u32) -> Self {
        self.time_step_minutes = minutes;
        self
    }

    /// Whether the config defines any hours at all.
    pub fn has_operating_hours(&self) -> bool {
        self.operating_hours.iter().any(|r| !r.interval.is_empty())
            || self
                .special_hours
                .iter()
                .any(|s| s.intervals.iter().any(|i| !i.is_empty()))
    }

    /// Check the config for errors that would make every computation over it fail.
    pub fn validate(&self) -> Result<(), ServiceWindowError> {
        if self.id.trim().is_empty() {
            return Err(ServiceWindowError::InvalidConfig(
                "fulfillment id is empty".to_string(),
            ));
        }
        if self.time_step_minutes == 0 || self.time_step_minutes > MINUTES_PER_DAY {
            return Err(ServiceWindowError::InvalidConfig(format!(
                "{}: time_step_minutes must be within 1..={MINUTES_PER_DAY}, got {}",
                self.id, self.time_step_minutes
            )));
        }
        if self.lead_time_minutes >= MINUTES_PER_DAY {
            return Err(ServiceWindowError::InvalidConfig(format!(
                "{}: lead_time_minutes must be under a day, got {}",
                self.id, self.lead_time_minutes
            )));
        }
        for hours in &self.operating_hours {
            hours.rule.validate().map_err(|e| {
                ServiceWindowError::InvalidConfig(format!("{}: {e}", self.id))
            })?;
        }
        Ok(())
    }

    /// Lead time applied when a caller also asks for a minimum.
    pub fn effective_lead(&self, min_lead_minutes: u32) -> u32 {
        self.lead_time_minutes.max(min_lead_minutes)
    }
}

/// Operating windows of `config` on a single date.
pub fn windows_for_date(
    config: &FulfillmentConfig,
    date: NaiveDate,
    tz: &Tz,
) -> Result<Vec<Interval>, ServiceWindowError> {
    let range = DateRange { start: date, end: date };
    let mut by_date = windows_in_range(config, &range, tz)?;
    Ok(by_date.remove(&date).unwrap_or_default())
}

/// Operating windows of `config` for every date in `range` that has any.
///
/// For each date: special hours replace the recurring hours if present,
/// blocked-off intervals are subtracted, and the result is merged. Dates
/// that end up with no windows are omitted.
pub fn windows_in_range(
    config: &FulfillmentConfig,
    range: &DateRange,
    tz: &Tz,
) -> Result<BTreeMap<NaiveDate, Vec<Interval>>, ServiceWindowError> {
    let mut raw: BTreeMap<NaiveDate, Vec<Interval>> = BTreeMap::new();
    for hours in &config.operating_hours {
        for dated in expand(hours, range, tz)? {
            raw.entry(dated.date).or_default().push(dated.interval);
        }
    }

    for special in config.special_hours.iter().filter(|s| range.contains(s.date)) {
        raw.insert(special.date, special.intervals.clone());
    }

    for blocked in config.blocked_off.iter().filter(|b| range.contains(b.date)) {
        if let Some(windows) = raw.get_mut(&blocked.date) {
            *windows = subtract_intervals(windows, &blocked.intervals);
        }
    }

    Ok(raw
        .into_iter()
        .map(|(date, windows)| (date, merge_intervals(&windows)))
        .filter(|(_, windows)| !windows.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recurrence::RecurrenceRule;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn iv(start: u32, end: u32) -> Interval {
        Interval::new(start, end).unwrap()
    }

    fn weekday_pickup() -> FulfillmentConfig {
        FulfillmentConfig::new("pickup", ServiceKind::Pickup).with_hours(RecurringInterval::new(
            iv(540, 1020),
            RecurrenceRule::new("FREQ=WEEKLY;BYDAY=MO,TU,WE,TH,FR"),
        ))
    }

    #[test]
    fn test_windows_for_weekday_and_weekend() {
        let cfg = weekday_pickup();
        // Monday March 2 2026 / Sunday March 8 2026
        assert_eq!(
            windows_for_date(&cfg, date(2026, 3, 2), &Tz::UTC).unwrap(),
            vec![iv(540, 1020)]
        );
        assert!(windows_for_date(&cfg, date(2026, 3, 8), &Tz::UTC)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_special_hours_replace_recurring_hours() {
        let cfg = weekday_pickup().with_special_hours(date(2026, 3, 8), vec![iv(600, 840)]);
        assert_eq!(
            windows_for_date(&cfg, date(2026, 3, 8), &Tz::UTC).unwrap(),
            vec![iv(600, 840)]
        );
    }

    #[test]
    fn test_empty_special_hours_close_the_day() {
        let cfg = weekday_pickup().with_special_hours(date(2026, 3, 3), vec![]);
        assert!(windows_for_date(&cfg, date(2026, 3, 3), &Tz::UTC)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_blocked_off_is_subtracted() {
        let cfg = weekday_pickup().with_blocked_off(date(2026, 3, 4), vec![iv(720, 780)]);
        assert_eq!(
            windows_for_date(&cfg, date(2026, 3, 4), &Tz::UTC).unwrap(),
            vec![iv(540, 720), iv(780, 1020)]
        );
    }

    #[test]
    fn test_overlapping_recurring_windows_merge() {
        let cfg = weekday_pickup().with_hours(RecurringInterval::new(
            iv(1000, 1260),
            RecurrenceRule::daily(),
        ));
        assert_eq!(
            windows_for_date(&cfg, date(2026, 3, 2), &Tz::UTC).unwrap(),
            vec![iv(540, 1260)]
        );
        assert_eq!(
            windows_for_date(&cfg, date(2026, 3, 7), &Tz::UTC).unwrap(),
            vec![iv(1000, 1260)]
        );
    }

    #[test]
    fn test_windows_in_range_omits_closed_dates() {
        let cfg = weekday_pickup();
        let range = DateRange::new(date(2026, 3, 2), date(2026, 3, 8)).unwrap();
        let map = windows_in_range(&cfg, &range, &Tz::UTC).unwrap();
        assert_eq!(map.len(), 5);
        assert!(!map.contains_key(&date(2026, 3, 7)));
    }

    #[test]
    fn test_has_operating_hours() {
        assert!(weekday_pickup().has_operating_hours());
        assert!(!FulfillmentConfig::new("empty", ServiceKind::Delivery).has_operating_hours());
        let special_only = FulfillmentConfig::new("event", ServiceKind::DineIn)
            .with_special_hours(date(2026, 12, 24), vec![iv(600, 900)]);
        assert!(special_only.has_operating_hours());
    }

    #[test]
    fn test_validate_rejects_zero_step() {
        let err = weekday_pickup().with_time_step(0).validate().unwrap_err().to_string();
        assert!(err.contains("time_step_minutes"), "got: {err}");
    }

    #[test]
    fn test_validate_rejects_bad_rule() {
        let cfg = FulfillmentConfig::new("broken", ServiceKind::Pickup).with_hours(
            RecurringInterval::new(iv(540, 1020), RecurrenceRule::new("FREQ=SOMETIMES")),
        );
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("broken"), "got: {err}");
    }

    #[test]
    fn test_deserialize_defaults() {
        let json = r#"{
            "id": "delivery",
            "service": "delivery",
            "operating_hours": [{"start": 660, "end": 1320, "rule": "FREQ=DAILY"}]
        }"#;
        let cfg: FulfillmentConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.service, ServiceKind::Delivery);
        assert_eq!(cfg.time_step_minutes, DEFAULT_TIME_STEP_MINUTES);
        assert_eq!(cfg.lead_time_minutes, 0);
        assert!(cfg.validate().is_ok());
    }
}
