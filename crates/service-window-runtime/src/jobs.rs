//! The backend's standing maintenance jobs.
//!
//! The jobs only orchestrate; the actual work is done by collaborators
//! behind the [`OrderSubmitter`], [`TicketClearer`] and [`ThirdPartyPoller`]
//! traits so the storage and integration layers stay out of this crate.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use service_window::zone::{instant_at, local_date_and_minute};
use tracing::info;

use crate::config::JobsConfig;
use crate::tasks::{system_now, Cadence, Job, NowFn, TaskRunner};

pub const SEND_PENDING_ORDERS: &str = "send-pending-orders";
pub const CLEAR_PAST_ORDERS: &str = "clear-past-orders";
pub const POLL_THIRD_PARTY_ORDERS: &str = "poll-third-party-orders";

/// Pushes orders whose service time has come to the kitchen.
#[async_trait]
pub trait OrderSubmitter: Send + Sync + 'static {
    /// Returns how many orders were sent.
    async fn send_pending_orders(&self) -> anyhow::Result<usize>;
}

/// Removes finished tickets.
#[async_trait]
pub trait TicketClearer: Send + Sync + 'static {
    /// Clears tickets serviced before `cutoff`; returns how many.
    async fn clear_orders_before(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize>;
}

/// Pulls orders placed through third-party ordering platforms.
#[async_trait]
pub trait ThirdPartyPoller: Send + Sync + 'static {
    /// Returns how many new orders were imported.
    async fn poll_orders(&self) -> anyhow::Result<usize>;
}

pub struct SendPendingOrdersJob {
    submitter: Arc<dyn OrderSubmitter>,
}

impl SendPendingOrdersJob {
    pub fn new(submitter: Arc<dyn OrderSubmitter>) -> Self {
        Self { submitter }
    }
}

#[async_trait]
impl Job for SendPendingOrdersJob {
    fn name(&self) -> &str {
        SEND_PENDING_ORDERS
    }

    async fn run(&self) -> anyhow::Result<()> {
        let sent = self
            .submitter
            .send_pending_orders()
            .await
            .context("sending pending orders")?;
        if sent > 0 {
            info!(sent, "sent pending orders");
        }
        Ok(())
    }
}

/// Clears every ticket serviced before the current business day began.
pub struct ClearPastOrdersJob {
    clearer: Arc<dyn TicketClearer>,
    tz: Tz,
    now: NowFn,
}

impl ClearPastOrdersJob {
    pub fn new(clearer: Arc<dyn TicketClearer>, tz: Tz) -> Self {
        Self {
            clearer,
            tz,
            now: system_now(),
        }
    }

    pub fn with_now(mut self, now: NowFn) -> Self {
        self.now = now;
        self
    }

    /// Local midnight of the business day containing `now`, as an instant.
    pub fn cutoff(&self, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
        let (today, _) = local_date_and_minute(now, &self.tz);
        instant_at(&self.tz, today, 0)
            .with_context(|| format!("resolving start of business day {today}"))
    }
}

#[async_trait]
impl Job for ClearPastOrdersJob {
    fn name(&self) -> &str {
        CLEAR_PAST_ORDERS
    }

    async fn run(&self) -> anyhow::Result<()> {
        let cutoff = self.cutoff((self.now)())?;
        let cleared = self
            .clearer
            .clear_orders_before(cutoff)
            .await
            .with_context(|| format!("clearing orders before {cutoff}"))?;
        info!(cleared, %cutoff, "cleared past orders");
        Ok(())
    }
}

pub struct PollThirdPartyOrdersJob {
    poller: Arc<dyn ThirdPartyPoller>,
}

impl PollThirdPartyOrdersJob {
    pub fn new(poller: Arc<dyn ThirdPartyPoller>) -> Self {
        Self { poller }
    }
}

#[async_trait]
impl Job for PollThirdPartyOrdersJob {
    fn name(&self) -> &str {
        POLL_THIRD_PARTY_ORDERS
    }

    async fn run(&self) -> anyhow::Result<()> {
        let imported = self
            .poller
            .poll_orders()
            .await
            .context("polling third-party orders")?;
        if imported > 0 {
            info!(imported, "imported third-party orders");
        }
        Ok(())
    }
}

impl TaskRunner {
    /// A runner with the three standing jobs at the configured cadences.
    pub fn with_standard_jobs(
        tz: Tz,
        jobs: &JobsConfig,
        submitter: Arc<dyn OrderSubmitter>,
        clearer: Arc<dyn TicketClearer>,
        poller: Arc<dyn ThirdPartyPoller>,
    ) -> Self {
        Self::with_standard_jobs_using(system_now(), tz, jobs, submitter, clearer, poller)
    }

    /// Like [`with_standard_jobs`](Self::with_standard_jobs), reading the
    /// wall clock from `now` for both the midnight firing and the cutoff.
    pub fn with_standard_jobs_using(
        now: NowFn,
        tz: Tz,
        jobs: &JobsConfig,
        submitter: Arc<dyn OrderSubmitter>,
        clearer: Arc<dyn TicketClearer>,
        poller: Arc<dyn ThirdPartyPoller>,
    ) -> Self {
        let mut runner = TaskRunner::new(tz).with_now(Arc::clone(&now));
        runner
            .register(
                SendPendingOrdersJob::new(submitter),
                Cadence::Every(jobs.send_orders_every),
            )
            .register(
                ClearPastOrdersJob::new(clearer, tz).with_now(now),
                Cadence::DailyAt(jobs.clear_orders_at),
            )
            .register(
                PollThirdPartyOrdersJob::new(poller),
                Cadence::Every(jobs.poll_third_party_every),
            );
        runner
    }
}
