//! Periodic maintenance task dispatch.
//!
//! Each registered [`Job`] gets its own timer task. When a timer fires while
//! the previous run of the same job is still in flight, that firing is
//! skipped rather than queued: the jobs are idempotent polls and the next
//! firing will catch up. Different jobs never wait on each other, and a job
//! that fails or panics is logged and simply runs again on its next firing.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use service_window::zone::local_to_utc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::clock::ServerClock;

/// Source of wall-clock time for [`Cadence::DailyAt`] and jobs that need "now".
pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// The process's system clock.
pub fn system_now() -> NowFn {
    Arc::new(Utc::now)
}

/// The synchronized server time, or the system clock before the first push.
pub fn server_now(clock: Arc<ServerClock>) -> NowFn {
    Arc::new(move || clock.now().unwrap_or_else(Utc::now))
}

/// A unit of background work.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    async fn run(&self) -> anyhow::Result<()>;
}

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Every fixed period, first firing one period after start.
    Every(Duration),
    /// Once a day at a local time in the business zone.
    DailyAt(NaiveTime),
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Every(period) => write!(f, "every {}s", period.as_secs()),
            Cadence::DailyAt(time) => write!(f, "daily at {}", time.format("%H:%M")),
        }
    }
}

impl Cadence {
    /// Delay from `now` until the next firing.
    pub fn next_delay(&self, tz: &Tz, now: DateTime<Utc>) -> Duration {
        match self {
            Cadence::Every(period) => *period,
            Cadence::DailyAt(time) => delay_until_daily(*time, tz, now),
        }
    }
}

/// Time from `now` until the next occurrence of local `at` in `tz`.
///
/// An occurrence exactly at `now` counts as already passed, so a job that
/// just fired waits a full day.
pub fn delay_until_daily(at: NaiveTime, tz: &Tz, now: DateTime<Utc>) -> Duration {
    let mut date = now.with_timezone(tz).date_naive();
    for _ in 0..3 {
        if let Ok(target) = local_to_utc(tz, date.and_time(at)) {
            if target > now {
                return (target - now).to_std().unwrap_or(Duration::ZERO);
            }
        }
        match date.succ_opt() {
            Some(next) => date = next,
            None => break,
        }
    }
    Duration::from_secs(24 * 60 * 60)
}

/// Marks a job as running; released on drop, including during a panic unwind.
struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl BusyGuard {
    fn try_acquire(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| BusyGuard {
                busy: Arc::clone(busy),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

struct Entry {
    job: Arc<dyn Job>,
    cadence: Cadence,
}

/// Collects jobs and their cadences, then runs them until shut down.
pub struct TaskRunner {
    tz: Tz,
    now: NowFn,
    entries: Vec<Entry>,
}

impl TaskRunner {
    /// `tz` is the business zone used by [`Cadence::DailyAt`].
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            now: system_now(),
            entries: Vec::new(),
        }
    }

    /// Use `now` instead of the system clock to place daily firings.
    pub fn with_now(mut self, now: NowFn) -> Self {
        self.now = now;
        self
    }

    pub fn now_source(&self) -> NowFn {
        Arc::clone(&self.now)
    }

    pub fn register<J: Job>(&mut self, job: J, cadence: Cadence) -> &mut Self {
        self.register_arc(Arc::new(job), cadence)
    }

    pub fn register_arc(&mut self, job: Arc<dyn Job>, cadence: Cadence) -> &mut Self {
        self.entries.push(Entry { job, cadence });
        self
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.job.name()).collect()
    }

    /// Start one timer task per job. Must be called inside a tokio runtime.
    pub fn start(self) -> RunnerHandle {
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        for Entry { job, cadence } in self.entries {
            info!(job = job.name(), %cadence, "scheduling job");
            tracker.spawn(run_timer(
                job,
                cadence,
                self.tz,
                Arc::clone(&self.now),
                cancel.clone(),
                tracker.clone(),
            ));
        }

        RunnerHandle { cancel, tracker }
    }
}

/// Handle to a started [`TaskRunner`].
pub struct RunnerHandle {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl RunnerHandle {
    /// Stop every timer and wait for runs already in flight to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("task runner stopped");
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

async fn run_timer(
    job: Arc<dyn Job>,
    cadence: Cadence,
    tz: Tz,
    now: NowFn,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    let busy = Arc::new(AtomicBool::new(false));
    let mut ticker = match cadence {
        Cadence::Every(period) => {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            Some(ticker)
        }
        Cadence::DailyAt(_) => None,
    };

    loop {
        let fire = async {
            match ticker.as_mut() {
                Some(ticker) => {
                    ticker.tick().await;
                }
                None => tokio::time::sleep(cadence.next_delay(&tz, now())).await,
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = fire => dispatch(&job, &busy, &tracker),
        }
    }
    debug!(job = job.name(), "job timer stopped");
}

fn dispatch(job: &Arc<dyn Job>, busy: &Arc<AtomicBool>, tracker: &TaskTracker) {
    let Some(guard) = BusyGuard::try_acquire(busy) else {
        debug!(job = job.name(), "previous run still in progress; skipping");
        return;
    };

    let job = Arc::clone(job);
    tracker.spawn(async move {
        let _guard = guard;
        let name = job.name().to_string();
        let started = Instant::now();
        // Run on its own task so a panic is reported here instead of tearing
        // down the guard holder.
        let outcome = tokio::spawn(async move { job.run().await }).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(())) => debug!(job = %name, elapsed_ms, "job finished"),
            Ok(Err(e)) => warn!(job = %name, elapsed_ms, error = %format!("{e:#}"), "job failed"),
            Err(e) if e.is_panic() => error!(job = %name, elapsed_ms, "job panicked"),
            Err(e) => warn!(job = %name, error = %e, "job was cancelled"),
        }
    });
}
