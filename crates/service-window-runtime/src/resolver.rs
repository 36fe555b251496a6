//! Service time resolution for order intake.
//!
//! [`FulfillmentResolver`] owns the fulfillment configs and the business
//! zone and is handed explicitly to whatever needs a service time. It picks
//! the fast path when the business is open, scans forward otherwise, and
//! falls back to "now" when configuration leaves no window at all.

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use service_window::fulfillment::DEFAULT_TIME_STEP_MINUTES;
use service_window::{
    are_we_open_now, next_available_slot, open_fulfillments, options_for_date, snap_instant,
    AvailabilityOptions, AvailableSlot, FulfillmentConfig, ServiceDateTime, ServiceWindowError,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::clock::{ClockError, ServerClock};
use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown fulfillment: {0}")]
    UnknownFulfillment(String),
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error(transparent)]
    Window(#[from] ServiceWindowError),
}

/// Which branch produced a [`Resolution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPath {
    /// Open now; `now` snapped to the slot grid.
    Open,
    /// Closed now; the next servable slot.
    NextAvailable,
    /// Nothing within the horizon; `now` snapped, likely a configuration error.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub service: ServiceDateTime,
    pub instant: DateTime<Utc>,
    /// The config offering the slot; `None` on fallback.
    pub fulfillment_id: Option<String>,
    pub path: ResolutionPath,
}

#[derive(Debug, Clone)]
pub struct FulfillmentResolver {
    configs: Vec<FulfillmentConfig>,
    tz: Tz,
    options: AvailabilityOptions,
}

impl FulfillmentResolver {
    pub fn new(configs: Vec<FulfillmentConfig>, tz: Tz, options: AvailabilityOptions) -> Self {
        Self {
            configs,
            tz,
            options,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.fulfillments.clone(), config.timezone, config.availability)
    }

    pub fn configs(&self) -> &[FulfillmentConfig] {
        &self.configs
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn fulfillment(&self, id: &str) -> Result<&FulfillmentConfig, ResolveError> {
        self.configs
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| ResolveError::UnknownFulfillment(id.to_string()))
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        are_we_open_now(&self.configs, now, &self.tz)
    }

    /// Ids of the configs open for immediate service at `now`.
    pub fn open_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        open_fulfillments(&self.configs, now, &self.tz)
            .into_iter()
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn next_available(&self, from: DateTime<Utc>, min_lead_minutes: u32) -> Option<AvailableSlot> {
        next_available_slot(&self.configs, from, min_lead_minutes, &self.tz, &self.options)
    }

    pub fn options_for_date(
        &self,
        fulfillment_id: &str,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<ServiceDateTime>, ResolveError> {
        let config = self.fulfillment(fulfillment_id)?;
        Ok(options_for_date(config, date, now, &self.tz)?)
    }

    /// The service time for an order placed at `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> Resolution {
        let open = open_fulfillments(&self.configs, now, &self.tz);
        if let Some(config) = open.iter().min_by_key(|c| c.time_step_minutes) {
            let instant = snap_instant(now, &self.tz, config.time_step_minutes);
            debug!(fulfillment = %config.id, %instant, "open now; serving on the fast path");
            return Resolution {
                service: ServiceDateTime::from_instant(instant, &self.tz),
                instant,
                fulfillment_id: Some(config.id.clone()),
                path: ResolutionPath::Open,
            };
        }

        if let Some(slot) = self.next_available(now, 0) {
            debug!(fulfillment = %slot.fulfillment_id, service = %slot.service, "closed now; next available slot");
            return Resolution {
                service: slot.service,
                instant: slot.instant,
                fulfillment_id: Some(slot.fulfillment_id),
                path: ResolutionPath::NextAvailable,
            };
        }

        warn!(
            configs = self.configs.len(),
            horizon_days = self.options.effective_horizon(),
            "no fulfillment window within the horizon; falling back to now. Check that fulfillment hours are configured"
        );
        let instant = snap_instant(now, &self.tz, DEFAULT_TIME_STEP_MINUTES);
        Resolution {
            service: ServiceDateTime::from_instant(instant, &self.tz),
            instant,
            fulfillment_id: None,
            path: ResolutionPath::Fallback,
        }
    }

    /// [`resolve`](Self::resolve) at the synchronized server time.
    pub fn resolve_with_clock(&self, clock: &ServerClock) -> Result<Resolution, ResolveError> {
        Ok(self.resolve(clock.try_now()?))
    }
}
