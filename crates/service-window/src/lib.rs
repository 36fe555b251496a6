//! # service-window
//!
//! Deterministic fulfillment availability for online ordering.
//!
//! Given the business's fulfillment channels (pickup, delivery, dine-in),
//! their recurring operating windows and an authoritative "now", this crate
//! answers whether an order can be serviced immediately and, if not, when the
//! next servable slot is. Every function is pure and synchronous: the caller
//! supplies the clock and the canonical business time zone.
//!
//! ## Modules
//!
//! - [`interval`] — Minutes-of-day intervals, merging and subtraction
//! - [`recurrence`] — RRULE-driven recurring windows and their expansion
//! - [`fulfillment`] — Fulfillment channel configs and per-date operating windows
//! - [`availability`] — Open-now checks, next available service date, calendar options
//! - [`snapping`] — Slot snapping and local ↔ absolute service time conversion
//! - [`zone`] — Business time zone helpers
//! - [`error`] — Error types

pub mod availability;
pub mod error;
pub mod fulfillment;
pub mod interval;
pub mod recurrence;
pub mod snapping;
pub mod zone;

pub use availability::{
    are_we_open_now, is_open, next_available_service_date, next_available_slot,
    open_fulfillments, options_for_date, AvailabilityOptions, AvailableSlot,
    DEFAULT_HORIZON_DAYS, MAX_HORIZON_DAYS,
};
pub use error::ServiceWindowError;
pub use fulfillment::{
    windows_for_date, windows_in_range, DateIntervals, FulfillmentConfig, ServiceKind,
};
pub use interval::{merge_intervals, subtract_intervals, DatedInterval, Interval};
pub use recurrence::{expand, DateRange, RecurrenceRule, RecurringInterval};
pub use snapping::{
    compute_fulfillment_time, compute_service_date_time, snap_instant, ServiceDateTime,
};
pub use zone::parse_timezone;
