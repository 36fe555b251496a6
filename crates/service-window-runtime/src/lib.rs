//! Async runtime pieces around [`service_window`].
//!
//! - [`config`]: TOML configuration loading and validation
//! - [`clock`]: server clock sync with explicit init and teardown
//! - [`resolver`]: the service time resolver handed to order intake
//! - [`tasks`]: periodic job dispatch with skip-if-busy semantics
//! - [`jobs`]: the standing maintenance jobs
//! - [`logging`]: tracing subscriber setup for binaries

pub mod clock;
pub mod config;
pub mod jobs;
pub mod logging;
pub mod resolver;
pub mod tasks;

pub use clock::{ClockError, ClockSample, ServerClock};
pub use config::{AppConfig, ConfigError, JobsConfig};
pub use jobs::{
    ClearPastOrdersJob, OrderSubmitter, PollThirdPartyOrdersJob, SendPendingOrdersJob,
    ThirdPartyPoller, TicketClearer,
};
pub use resolver::{FulfillmentResolver, Resolution, ResolutionPath, ResolveError};
pub use tasks::{
    delay_until_daily, server_now, system_now, Cadence, Job, NowFn, RunnerHandle, TaskRunner,
};
