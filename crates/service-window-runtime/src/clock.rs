//! Authoritative server clock.
//!
//! Business decisions never use the local device clock directly. Instead the
//! server pushes its time over a channel and every reader interpolates from
//! the latest push using a monotonic local offset:
//!
//! ```text
//! now = last server time + (monotonic now - monotonic time of that push)
//! ```
//!
//! There is exactly one writer (the subscription task started by
//! [`ServerClock::init`]) and any number of readers. Readers see the latest
//! value eventually and must not rely on sub-second precision, so
//! [`ServerClock::now`] truncates to whole seconds.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClockError {
    #[error("server clock is already subscribed to a feed")]
    AlreadySubscribed,
    #[error("server clock has not received a time push yet")]
    NotSynchronized,
}

/// One server time push and the monotonic instant it arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    pub server_time: DateTime<Utc>,
    pub received_at: Instant,
}

impl ClockSample {
    /// Server time interpolated to the monotonic instant `at`.
    pub fn interpolate(&self, at: Instant) -> DateTime<Utc> {
        let elapsed = at.saturating_duration_since(self.received_at);
        let offset = TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::zero());
        self.server_time + offset
    }
}

struct Subscription {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Process-wide clock fed by server time pushes.
pub struct ServerClock {
    tx: Arc<watch::Sender<Option<ClockSample>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerClock {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            subscription: Mutex::new(None),
        }
    }

    /// Subscribe to a feed of server time pushes.
    ///
    /// Spawns the single writer task; must be called inside a tokio runtime.
    /// The subscription lasts until [`teardown`](Self::teardown) or until the
    /// feed closes.
    pub fn init(&self, mut feed: mpsc::Receiver<DateTime<Utc>>) -> Result<(), ClockError> {
        let mut slot = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.as_ref().is_some_and(|s| !s.task.is_finished()) {
            return Err(ClockError::AlreadySubscribed);
        }

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let tx = Arc::clone(&self.tx);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    pushed = feed.recv() => match pushed {
                        Some(server_time) => record(&tx, server_time),
                        None => {
                            debug!("server clock feed closed");
                            break;
                        }
                    },
                }
            }
        });

        info!("server clock subscribed");
        *slot = Some(Subscription { cancel, task });
        Ok(())
    }

    /// Unsubscribe from the feed and wait for the writer task to stop.
    ///
    /// The last known sample is kept, so readers keep interpolating from it.
    pub async fn teardown(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(Subscription { cancel, task }) = subscription {
            cancel.cancel();
            if let Err(e) = task.await {
                warn!(error = %e, "server clock task ended abnormally");
            }
            info!("server clock unsubscribed");
        }
    }

    /// Record a push directly, bypassing the feed.
    pub fn record(&self, server_time: DateTime<Utc>) {
        record(&self.tx, server_time);
    }

    /// The latest push, if any.
    pub fn latest(&self) -> Option<ClockSample> {
        *self.tx.borrow()
    }

    /// Current server time, interpolated and truncated to whole seconds.
    pub fn now(&self) -> Option<DateTime<Utc>> {
        self.latest()
            .map(|sample| sample.interpolate(Instant::now()).trunc_subsecs(0))
    }

    /// Like [`now`](Self::now), but an error before the first push.
    pub fn try_now(&self) -> Result<DateTime<Utc>, ClockError> {
        self.now().ok_or(ClockError::NotSynchronized)
    }

    /// A receiver notified on every accepted push.
    pub fn watch(&self) -> watch::Receiver<Option<ClockSample>> {
        self.tx.subscribe()
    }
}

/// Store a push unless it is older than the one already held.
fn record(tx: &watch::Sender<Option<ClockSample>>, server_time: DateTime<Utc>) {
    let received_at = Instant::now();
    let accepted = tx.send_if_modified(|current| match current {
        Some(existing) if existing.server_time > server_time => false,
        _ => {
            *current = Some(ClockSample {
                server_time,
                received_at,
            });
            true
        }
    });
    if !accepted {
        debug!(%server_time, "ignoring out-of-order server time push");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_is_none_before_first_push() {
        let clock = ServerClock::new();
        assert_eq!(clock.now(), None);
        assert_eq!(clock.try_now(), Err(ClockError::NotSynchronized));
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_interpolates_from_last_push() {
        let clock = ServerClock::new();
        clock.record(t("2026-03-16T15:00:00Z"));
        tokio::time::advance(Duration::from_millis(7_400)).await;
        assert_eq!(clock.now(), Some(t("2026-03-16T15:00:07Z")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_updates_clock() {
        let clock = ServerClock::new();
        let mut changes = clock.watch();
        let (tx, rx) = mpsc::channel(4);
        clock.init(rx).unwrap();

        tx.send(t("2026-03-16T15:00:00Z")).await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(clock.now(), Some(t("2026-03-16T15:00:00Z")));

        tx.send(t("2026-03-16T15:01:00Z")).await.unwrap();
        changes.changed().await.unwrap();
        assert_eq!(clock.now(), Some(t("2026-03-16T15:01:00Z")));

        clock.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_push_is_ignored() {
        let clock = ServerClock::new();
        clock.record(t("2026-03-16T15:01:00Z"));
        clock.record(t("2026-03-16T15:00:00Z"));
        assert_eq!(
            clock.latest().map(|s| s.server_time),
            Some(t("2026-03-16T15:01:00Z"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_init_rejected_until_teardown() {
        let clock = ServerClock::new();
        let (_tx1, rx1) = mpsc::channel(1);
        let (_tx2, rx2) = mpsc::channel(1);
        let (_tx3, rx3) = mpsc::channel(1);

        clock.init(rx1).unwrap();
        assert_eq!(clock.init(rx2), Err(ClockError::AlreadySubscribed));

        clock.teardown().await;
        assert!(clock.init(rx3).is_ok());
        clock.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_keeps_last_sample() {
        let clock = ServerClock::new();
        let mut changes = clock.watch();
        let (tx, rx) = mpsc::channel(1);
        clock.init(rx).unwrap();
        tx.send(t("2026-03-16T15:00:00Z")).await.unwrap();
        changes.changed().await.unwrap();

        clock.teardown().await;
        // Pushes after teardown go nowhere.
        assert!(tx.send(t("2026-03-16T16:00:00Z")).await.is_err());
        assert_eq!(clock.now(), Some(t("2026-03-16T15:00:00Z")));
    }
}
