//! Configuration file loading.
//!
//! The business time zone, scan horizon, job cadences and fulfillment
//! channels come from one TOML file:
//!
//! ```toml
//! timezone = "America/Chicago"
//! horizon_days = 60
//!
//! [jobs]
//! send_orders_every_secs = 60
//! poll_third_party_every_secs = 35
//! clear_orders_at = "00:00"
//!
//! [[fulfillment]]
//! id = "pickup"
//! service = "pickup"
//! lead_time_minutes = 20
//!
//! [[fulfillment.operating_hours]]
//! start = 660
//! end = 1320
//! rule = "FREQ=DAILY"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::Deserialize;
use service_window::{
    parse_timezone, AvailabilityOptions, FulfillmentConfig, DEFAULT_HORIZON_DAYS,
    MAX_HORIZON_DAYS,
};
use thiserror::Error;

pub const DEFAULT_SEND_ORDERS_SECS: u64 = 60;
pub const DEFAULT_POLL_THIRD_PARTY_SECS: u64 = 35;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub timezone: Tz,
    pub availability: AvailabilityOptions,
    pub jobs: JobsConfig,
    pub fulfillments: Vec<FulfillmentConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsConfig {
    pub send_orders_every: Duration,
    pub poll_third_party_every: Duration,
    /// Local time in the business zone at which past orders are cleared.
    pub clear_orders_at: NaiveTime,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            send_orders_every: Duration::from_secs(DEFAULT_SEND_ORDERS_SECS),
            poll_third_party_every: Duration::from_secs(DEFAULT_POLL_THIRD_PARTY_SECS),
            clear_orders_at: NaiveTime::MIN,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
    #[error("invalid horizon_days value: {0}")]
    InvalidHorizon(u32),
    #[error("invalid job cadence: {0}")]
    InvalidCadence(String),
    #[error("duplicate fulfillment id: {0}")]
    DuplicateFulfillment(String),
    #[error(transparent)]
    Fulfillment(#[from] service_window::ServiceWindowError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    timezone: String,
    horizon_days: Option<u32>,
    jobs: Option<JobsFile>,
    #[serde(default)]
    fulfillment: Vec<FulfillmentConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobsFile {
    send_orders_every_secs: Option<u64>,
    poll_third_party_every_secs: Option<u64>,
    clear_orders_at: Option<String>,
}

/// Read and validate the config file at `path`.
pub fn load(path: &Path) -> Result<AppConfig> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_at(&contents, path)
}

/// Parse and validate config text. `path` is only used in error messages.
pub fn parse_at(contents: &str, path: &Path) -> Result<AppConfig> {
    let file: ConfigFile = toml::from_str(contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(file)
}

fn validate(file: ConfigFile) -> Result<AppConfig> {
    let timezone = parse_timezone(&file.timezone)
        .map_err(|_| ConfigError::InvalidTimezone(file.timezone.clone()))?;

    let horizon_days = file.horizon_days.unwrap_or(DEFAULT_HORIZON_DAYS);
    if horizon_days == 0 || horizon_days > MAX_HORIZON_DAYS {
        return Err(ConfigError::InvalidHorizon(horizon_days));
    }

    let jobs = match file.jobs {
        Some(jobs) => validate_jobs(jobs)?,
        None => JobsConfig::default(),
    };

    let mut seen = HashSet::new();
    for fulfillment in &file.fulfillment {
        fulfillment.validate()?;
        if !seen.insert(fulfillment.id.as_str()) {
            return Err(ConfigError::DuplicateFulfillment(fulfillment.id.clone()));
        }
    }

    Ok(AppConfig {
        timezone,
        availability: AvailabilityOptions::with_horizon(horizon_days),
        jobs,
        fulfillments: file.fulfillment,
    })
}

fn validate_jobs(file: JobsFile) -> Result<JobsConfig> {
    let defaults = JobsConfig::default();
    let send_orders_every = match file.send_orders_every_secs {
        Some(0) => return Err(ConfigError::InvalidCadence("send_orders_every_secs is 0".into())),
        Some(secs) => Duration::from_secs(secs),
        None => defaults.send_orders_every,
    };
    let poll_third_party_every = match file.poll_third_party_every_secs {
        Some(0) => {
            return Err(ConfigError::InvalidCadence(
                "poll_third_party_every_secs is 0".into(),
            ))
        }
        Some(secs) => Duration::from_secs(secs),
        None => defaults.poll_third_party_every,
    };
    let clear_orders_at = match file.clear_orders_at {
        Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|_| {
            ConfigError::InvalidCadence(format!("clear_orders_at '{raw}' is not HH:MM"))
        })?,
        None => defaults.clear_orders_at,
    };
    Ok(JobsConfig {
        send_orders_every,
        poll_third_party_every,
        clear_orders_at,
    })
}
