//! Availability resolution across fulfillment channels.
//!
//! Two questions drive ordering:
//!
//! - [`are_we_open_now`] — can an order be taken for immediate service?
//! - [`next_available_service_date`] — if not, when is the next servable slot?
//!
//! # Lead time
//!
//! A window `[start, end)` accepts a slot `s` only when `s + lead < end`:
//! the preparation time must fit before the window closes. For the open-now
//! check, `s` is `now` snapped up to the config's slot grid, so whatever
//! the fast path offers is itself a servable slot.
//!
//! # Malformed configs
//!
//! A config whose rule cannot be expanded is skipped with a warning; the
//! remaining configs are still evaluated.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ServiceWindowError;
use crate::fulfillment::{windows_for_date, windows_in_range, FulfillmentConfig};
use crate::interval::{Interval, MINUTES_PER_DAY};
use crate::recurrence::DateRange;
use crate::snapping::{ceil_to_step, snap_instant, ServiceDateTime};
use crate::zone::{instant_at_or_after, local_date_and_minute};

/// Days scanned forward when no horizon is configured.
pub const DEFAULT_HORIZON_DAYS: u32 = 60;

/// Hard ceiling on the forward scan, whatever the configuration says.
pub const MAX_HORIZON_DAYS: u32 = 366;

/// Tuning for the forward scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityOptions {
    /// Number of calendar days, starting with the `from` date, to search.
    pub horizon_days: u32,
}

impl Default for AvailabilityOptions {
    fn default() -> Self {
        Self {
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

impl AvailabilityOptions {
    pub fn with_horizon(horizon_days: u32) -> Self {
        Self { horizon_days }
    }

    /// The horizon actually scanned, clamped to `1..=MAX_HORIZON_DAYS`.
    pub fn effective_horizon(&self) -> u32 {
        self.horizon_days.clamp(1, MAX_HORIZON_DAYS)
    }
}

/// The earliest servable slot found by the forward scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableSlot {
    /// The config that offers the slot.
    pub fulfillment_id: String,
    pub service: ServiceDateTime,
    /// `service` as an absolute instant.
    pub instant: DateTime<Utc>,
}

// ── open now ────────────────────────────────────────────────────────────────

/// Whether at least one config is open for immediate service at `now`.
///
/// Returns `false` for an empty config list.
pub fn are_we_open_now(configs: &[FulfillmentConfig], now: DateTime<Utc>, tz: &Tz) -> bool {
    configs.iter().any(|config| is_open_or_skip(config, now, tz))
}

/// The configs that are open for immediate service at `now`, in input order.
pub fn open_fulfillments<'a>(
    configs: &'a [FulfillmentConfig],
    now: DateTime<Utc>,
    tz: &Tz,
) -> Vec<&'a FulfillmentConfig> {
    configs
        .iter()
        .filter(|config| is_open_or_skip(config, now, tz))
        .collect()
}

fn is_open_or_skip(config: &FulfillmentConfig, now: DateTime<Utc>, tz: &Tz) -> bool {
    match is_open(config, now, tz) {
        Ok(open) => open,
        Err(e) => {
            warn!(fulfillment = %config.id, error = %e, "skipping malformed fulfillment config");
            false
        }
    }
}

/// Whether a single config is open for immediate service at `now`.
///
/// # Errors
///
/// Returns the validation or expansion error of a malformed config.
pub fn is_open(
    config: &FulfillmentConfig,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<bool, ServiceWindowError> {
    config.validate()?;
    let (date, minute) = local_date_and_minute(now, tz);
    let windows = windows_for_date(config, date, tz)?;
    if windows.is_empty() {
        return Ok(false);
    }

    let snapped = ServiceDateTime::from_instant(
        snap_instant(now, tz, config.time_step_minutes),
        tz,
    );
    let snapped_minute = if snapped.selected_date > date {
        MINUTES_PER_DAY + snapped.selected_time
    } else {
        snapped.selected_time
    };
    let lead = config.lead_time_minutes;

    Ok(windows
        .iter()
        .any(|w| w.contains(minute) && snapped_minute + lead < w.end))
}

// ── next available ──────────────────────────────────────────────────────────

/// The next servable date and time at or after `from`.
///
/// `min_lead_minutes` raises every config's lead time to at least that
/// value. Returns `None` when no config offers a slot within the horizon,
/// including when `configs` is empty.
pub fn next_available_service_date(
    configs: &[FulfillmentConfig],
    from: DateTime<Utc>,
    min_lead_minutes: u32,
    tz: &Tz,
    options: &AvailabilityOptions,
) -> Option<ServiceDateTime> {
    next_available_slot(configs, from, min_lead_minutes, tz, options).map(|slot| slot.service)
}

/// Like [`next_available_service_date`], also reporting which config offers
/// the slot and its absolute instant.
///
/// Candidates are ordered by instant; ties go to the config listed first.
pub fn next_available_slot(
    configs: &[FulfillmentConfig],
    from: DateTime<Utc>,
    min_lead_minutes: u32,
    tz: &Tz,
    options: &AvailabilityOptions,
) -> Option<AvailableSlot> {
    let (from_date, _) = local_date_and_minute(from, tz);
    let range = DateRange::starting_at(from_date, options.effective_horizon());

    let mut best: Option<(DateTime<Utc>, usize, ServiceDateTime)> = None;
    for (idx, config) in configs.iter().enumerate() {
        let found = config
            .validate()
            .and_then(|_| first_slot(config, &range, from, min_lead_minutes, tz));
        match found {
            Ok(Some((instant, service))) => {
                let better = best
                    .as_ref()
                    .is_none_or(|(best_instant, _, _)| instant < *best_instant);
                if better {
                    best = Some((instant, idx, service));
                }
            }
            Ok(None) => {}
            Err(e) => {
                warn!(fulfillment = %config.id, error = %e, "skipping malformed fulfillment config");
            }
        }
    }

    best.map(|(instant, idx, service)| AvailableSlot {
        fulfillment_id: configs[idx].id.clone(),
        service,
        instant,
    })
}

/// Earliest slot of one config within `range` at or after `from`.
fn first_slot(
    config: &FulfillmentConfig,
    range: &DateRange,
    from: DateTime<Utc>,
    min_lead_minutes: u32,
    tz: &Tz,
) -> Result<Option<(DateTime<Utc>, ServiceDateTime)>, ServiceWindowError> {
    let lead = config.effective_lead(min_lead_minutes);
    let (from_date, from_minute) = local_date_and_minute(from, tz);

    for (date, windows) in windows_in_range(config, range, tz)? {
        let floor = if date == from_date { from_minute } else { 0 };
        for window in &windows {
            if let Some(found) =
                first_slot_in_window(config, date, window, floor, lead, from, tz)?
            {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

fn first_slot_in_window(
    config: &FulfillmentConfig,
    date: NaiveDate,
    window: &Interval,
    floor_minute: u32,
    lead: u32,
    from: DateTime<Utc>,
    tz: &Tz,
) -> Result<Option<(DateTime<Utc>, ServiceDateTime)>, ServiceWindowError> {
    let step = config.time_step_minutes;
    let mut minute = ceil_to_step(window.start.max(floor_minute), step);
    while minute + lead < window.end {
        let instant = instant_at_or_after(tz, date, minute, from)?;
        if instant >= from {
            return Ok(Some((instant, ServiceDateTime::new(date, minute))));
        }
        minute += step;
    }
    Ok(None)
}

// ── calendar options ────────────────────────────────────────────────────────

/// Every selectable slot of `config` on `date` that is not before `now`.
///
/// Slots sit on the config's step grid and leave room for its lead time
/// before the window closes.
pub fn options_for_date(
    config: &FulfillmentConfig,
    date: NaiveDate,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Result<Vec<ServiceDateTime>, ServiceWindowError> {
    config.validate()?;
    let step = config.time_step_minutes;
    let lead = config.lead_time_minutes;

    let mut options = Vec::new();
    for window in windows_for_date(config, date, tz)? {
        let mut minute = ceil_to_step(window.start, step);
        while minute + lead < window.end {
            if instant_at_or_after(tz, date, minute, now)? >= now {
                options.push(ServiceDateTime::new(date, minute));
            }
            minute += step;
        }
    }
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fulfillment::ServiceKind;
    use crate::recurrence::{RecurrenceRule, RecurringInterval};
    use crate::zone::parse_rfc3339;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        parse_rfc3339(s).unwrap()
    }

    fn daily(id: &str, start: u32, end: u32) -> FulfillmentConfig {
        FulfillmentConfig::new(id, ServiceKind::Pickup).with_hours(RecurringInterval::new(
            Interval::new(start, end).unwrap(),
            RecurrenceRule::daily(),
        ))
    }

    fn broken() -> FulfillmentConfig {
        FulfillmentConfig::new("broken", ServiceKind::Delivery).with_hours(
            RecurringInterval::new(Interval::new(0, 1440).unwrap(), RecurrenceRule::new("nope")),
        )
    }

    #[test]
    fn test_is_open_inside_window() {
        let cfg = daily("pickup", 540, 1020);
        assert!(is_open(&cfg, at("2026-03-16T10:00:00Z"), &Tz::UTC).unwrap());
        assert!(!is_open(&cfg, at("2026-03-16T08:59:59Z"), &Tz::UTC).unwrap());
    }

    #[test]
    fn test_last_slot_must_fit_before_close() {
        let cfg = daily("pickup", 540, 1020);
        // 16:54 snaps to 16:55, still before 17:00
        assert!(is_open(&cfg, at("2026-03-16T16:54:00Z"), &Tz::UTC).unwrap());
        // 16:56 snaps to 17:00, which is the close
        assert!(!is_open(&cfg, at("2026-03-16T16:56:00Z"), &Tz::UTC).unwrap());
    }

    #[test]
    fn test_lead_time_shrinks_close() {
        let cfg = daily("pickup", 540, 1020).with_lead_time(30);
        assert!(is_open(&cfg, at("2026-03-16T16:25:00Z"), &Tz::UTC).unwrap());
        assert!(!is_open(&cfg, at("2026-03-16T16:30:00Z"), &Tz::UTC).unwrap());
        assert!(!is_open(&cfg, at("2026-03-16T16:45:00Z"), &Tz::UTC).unwrap());
    }

    #[test]
    fn test_empty_configs_are_closed() {
        assert!(!are_we_open_now(&[], at("2026-03-16T10:00:00Z"), &Tz::UTC));
        assert!(next_available_service_date(
            &[],
            at("2026-03-16T10:00:00Z"),
            0,
            &Tz::UTC,
            &AvailabilityOptions::default()
        )
        .is_none());
    }

    #[test]
    fn test_malformed_config_is_skipped() {
        let configs = vec![broken(), daily("pickup", 540, 1020)];
        let now = at("2026-03-16T10:00:00Z");
        assert!(are_we_open_now(&configs, now, &Tz::UTC));
        let open = open_fulfillments(&configs, now, &Tz::UTC);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, "pickup");

        let slot = next_available_slot(
            &configs,
            at("2026-03-16T20:00:00Z"),
            0,
            &Tz::UTC,
            &AvailabilityOptions::default(),
        )
        .unwrap();
        assert_eq!(slot.fulfillment_id, "pickup");
    }

    #[test]
    fn test_next_available_later_same_day() {
        let configs = vec![daily("pickup", 540, 1020)];
        let next = next_available_service_date(
            &configs,
            at("2026-03-16T06:00:00Z"),
            0,
            &Tz::UTC,
            &AvailabilityOptions::default(),
        );
        assert_eq!(next, Some(ServiceDateTime::new(date(2026, 3, 16), 540)));
    }

    #[test]
    fn test_next_available_mid_window_snaps_forward() {
        let configs = vec![daily("pickup", 540, 1020).with_time_step(15)];
        let next = next_available_service_date(
            &configs,
            at("2026-03-16T10:07:00Z"),
            0,
            &Tz::UTC,
            &AvailabilityOptions::default(),
        );
        assert_eq!(next, Some(ServiceDateTime::new(date(2026, 3, 16), 615)));
    }

    #[test]
    fn test_min_lead_overrides_smaller_config_lead() {
        let configs = vec![daily("pickup", 540, 1020).with_lead_time(10)];
        // 16:20 + 45 = 17:05, past close; rolls to tomorrow
        let next = next_available_service_date(
            &configs,
            at("2026-03-16T16:20:00Z"),
            45,
            &Tz::UTC,
            &AvailabilityOptions::default(),
        );
        assert_eq!(next, Some(ServiceDateTime::new(date(2026, 3, 17), 540)));
    }

    #[test]
    fn test_tie_break_prefers_first_config() {
        let configs = vec![daily("delivery", 540, 1020), daily("pickup", 540, 1020)];
        let slot = next_available_slot(
            &configs,
            at("2026-03-16T20:00:00Z"),
            0,
            &Tz::UTC,
            &AvailabilityOptions::default(),
        )
        .unwrap();
        assert_eq!(slot.fulfillment_id, "delivery");
    }

    #[test]
    fn test_earliest_config_wins() {
        let configs = vec![daily("dinner", 1020, 1320), daily("lunch", 660, 840)];
        let slot = next_available_slot(
            &configs,
            at("2026-03-16T08:00:00Z"),
            0,
            &Tz::UTC,
            &AvailabilityOptions::default(),
        )
        .unwrap();
        assert_eq!(slot.fulfillment_id, "lunch");
        assert_eq!(slot.service.selected_time, 660);
        assert_eq!(slot.instant, at("2026-03-16T11:00:00Z"));
    }

    #[test]
    fn test_horizon_bounds_the_scan() {
        let far = FulfillmentConfig::new("event", ServiceKind::DineIn)
            .with_special_hours(date(2026, 6, 1), vec![Interval::new(600, 900).unwrap()]);
        let configs = vec![far];
        let from = at("2026-03-16T10:00:00Z");
        assert!(next_available_service_date(
            &configs,
            from,
            0,
            &Tz::UTC,
            &AvailabilityOptions::with_horizon(30)
        )
        .is_none());
        assert_eq!(
            next_available_service_date(
                &configs,
                from,
                0,
                &Tz::UTC,
                &AvailabilityOptions::with_horizon(90)
            ),
            Some(ServiceDateTime::new(date(2026, 6, 1), 600))
        );
    }

    #[test]
    fn test_horizon_is_clamped() {
        assert_eq!(AvailabilityOptions::with_horizon(0).effective_horizon(), 1);
        assert_eq!(
            AvailabilityOptions::with_horizon(100_000).effective_horizon(),
            MAX_HORIZON_DAYS
        );
    }

    #[test]
    fn test_blocked_off_day_rolls_forward() {
        let cfg = daily("pickup", 540, 1020)
            .with_blocked_off(date(2026, 3, 17), vec![Interval::new(0, 1440).unwrap()]);
        let next = next_available_service_date(
            &[cfg],
            at("2026-03-16T20:00:00Z"),
            0,
            &Tz::UTC,
            &AvailabilityOptions::default(),
        );
        assert_eq!(next, Some(ServiceDateTime::new(date(2026, 3, 18), 540)));
    }

    #[test]
    fn test_options_for_date() {
        let cfg = daily("pickup", 540, 600).with_time_step(15);
        let day = date(2026, 3, 16);
        let all = options_for_date(&cfg, day, at("2026-03-16T00:00:00Z"), &Tz::UTC).unwrap();
        let minutes: Vec<u32> = all.iter().map(|s| s.selected_time).collect();
        assert_eq!(minutes, vec![540, 555, 570, 585]);

        let later = options_for_date(&cfg, day, at("2026-03-16T09:20:00Z"), &Tz::UTC).unwrap();
        let minutes: Vec<u32> = later.iter().map(|s| s.selected_time).collect();
        assert_eq!(minutes, vec![570, 585]);
    }

    #[test]
    fn test_options_for_date_respects_lead() {
        let cfg = daily("pickup", 540, 600).with_time_step(15).with_lead_time(30);
        let day = date(2026, 3, 16);
        let options = options_for_date(&cfg, day, at("2026-03-15T00:00:00Z"), &Tz::UTC).unwrap();
        let minutes: Vec<u32> = options.iter().map(|s| s.selected_time).collect();
        assert_eq!(minutes, vec![540, 555]);
    }

    #[test]
    fn test_options_for_date_malformed_config_errors() {
        let result = options_for_date(
            &broken(),
            date(2026, 3, 16),
            at("2026-03-16T00:00:00Z"),
            &Tz::UTC,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_repeated_fall_back_hour_agrees_across_paths() {
        let tz: Tz = "America/Chicago".parse().unwrap();
        let cfg = daily("all_day", 0, 1440);
        let configs = vec![cfg.clone()];
        // Nov 1 2026: the second 01:30 in Chicago, now on CST.
        let now = at("2026-11-01T07:30:00Z");

        assert!(are_we_open_now(&configs, now, &tz));
        let served = snap_instant(now, &tz, cfg.time_step_minutes);
        assert_eq!(served, now);

        let slot = next_available_slot(&configs, now, 0, &tz, &AvailabilityOptions::default())
            .unwrap();
        assert_eq!(slot.instant, served);
        assert_eq!(slot.service, ServiceDateTime::new(date(2026, 11, 1), 90));

        let options = options_for_date(&cfg, date(2026, 11, 1), now, &tz).unwrap();
        assert_eq!(options.first(), Some(&ServiceDateTime::new(date(2026, 11, 1), 90)));
        assert_eq!(options.last(), Some(&ServiceDateTime::new(date(2026, 11, 1), 1435)));
    }
}
