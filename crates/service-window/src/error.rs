//! Error types for service-window operations.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceWindowError {
    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Invalid fulfillment config: {0}")]
    InvalidConfig(String),

    #[error("Expansion error: {0}")]
    Expansion(String),
}

pub type Result<T> = std::result::Result<T, ServiceWindowError>;
