use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::clock::{Clock, SystemClock};
use super::options::ScheduleOptions;
use crate::cron::{next_execution_after, parse_cron, CronRules};
use crate::error::ScheduleError;
use crate::logging::{LogLevel, LogOptions};
use crate::query::Refetch;

const LOG_TARGET: &str = "schedule";

/// Where a schedule stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleStatus {
    Running,
    /// The cron loop stopped. Interval refetches, if any, keep going.
    Halted(ScheduleError),
    Cancelled,
}

/// Spawns refetch timers for queries.
#[derive(Clone)]
pub struct Scheduler {
    clock: Arc<dyn Clock>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Evaluate cron expressions against `clock` instead of the system time.
    pub fn with_clock(clock: impl Clock) -> Self {
        Self {
            clock: Arc::new(clock),
        }
    }

    /// Start refetching `query` according to `options` on the current tokio
    /// runtime.
    ///
    /// The initial fetch runs after `options.delay()` unless the query is
    /// disabled. Interval refetches follow each completed execution. Cron
    /// refetches run on their own loop, re-armed from the clock after every
    /// firing.
    pub fn spawn<Q: Refetch>(&self, query: Q, options: ScheduleOptions) -> ScheduleHandle {
        let (status, _) = watch::channel(ScheduleStatus::Running);
        let driver = Driver {
            query: Arc::new(query),
            clock: Arc::clone(&self.clock),
            token: CancellationToken::new(),
            shared: Arc::new(Shared {
                status,
                executions: AtomicU64::new(0),
            }),
            log: options.log,
        };

        let mut tasks = vec![tokio::spawn(
            driver
                .clone()
                .run_fixed(options.delay(), options.interval()),
        )];
        if let Some(expression) = options.active_cron() {
            tasks.push(tokio::spawn(
                driver
                    .clone()
                    .run_cron(expression.to_owned(), options.timezone),
            ));
        }

        tracing::debug!(
            key = driver.query.key(),
            delay_ms = options.delay_ms,
            interval_ms = ?options.interval_ms,
            cron = ?options.active_cron(),
            "schedule started"
        );

        ScheduleHandle { driver, tasks }
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

struct Shared {
    status: watch::Sender<ScheduleStatus>,
    executions: AtomicU64,
}

#[derive(Clone)]
struct Driver {
    query: Arc<dyn Refetch>,
    clock: Arc<dyn Clock>,
    token: CancellationToken,
    shared: Arc<Shared>,
    log: LogOptions,
}

impl Driver {
    /// Sleep for `duration`. `false` if cancelled first.
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    /// Run one refetch to completion. `false` if cancelled first.
    async fn fire(&self, trigger: &'static str) -> bool {
        tokio::select! {
            _ = self.token.cancelled() => false,
            _ = self.query.refetch() => {
                let executions = self.shared.executions.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(key = self.query.key(), trigger, executions, "schedule fired");
                true
            }
        }
    }

    async fn run_fixed(self, delay: Duration, interval: Option<Duration>) {
        if !delay.is_zero() && !self.sleep(delay).await {
            return;
        }
        if self.query.is_enabled() && !self.fire("initial").await {
            return;
        }
        let Some(interval) = interval else {
            return;
        };
        loop {
            if !self.sleep(interval).await || !self.fire("interval").await {
                return;
            }
        }
    }

    async fn run_cron(self, expression: String, tz: Tz) {
        let rules = match parse_cron(&expression) {
            Ok(rules) => rules,
            Err(source) => {
                self.halt(ScheduleError::Cron { expression, source });
                return;
            }
        };

        loop {
            let next = tokio::select! {
                _ = self.token.cancelled() => return,
                next = self.next_after(rules, tz) => next,
            };
            let next = match next {
                Ok(Some(next)) => next,
                Ok(None) => {
                    self.halt(ScheduleError::Exhausted { expression });
                    return;
                }
                Err(err) => {
                    tracing::warn!(key = self.query.key(), error = %err, "cron search aborted");
                    return;
                }
            };
            let wait = self.until(next);
            if wait.is_zero() {
                tracing::warn!(key = self.query.key(), %expression, "cron execution past due, firing now");
            } else if !self.sleep(wait).await {
                return;
            }
            if !self.fire("cron").await {
                return;
            }
        }
    }

    /// The first matching minute after the clock's current time in `tz`.
    /// The minute-by-minute search runs on the blocking pool.
    async fn next_after(
        &self,
        rules: CronRules,
        tz: Tz,
    ) -> Result<Option<DateTime<Utc>>, JoinError> {
        let from = self.clock.now().with_timezone(&tz);
        let next = tokio::task::spawn_blocking(move || next_execution_after(&rules, &from)).await?;
        Ok(next.map(|next| next.with_timezone(&Utc)))
    }

    /// Time left until `next`, zero if it is already due.
    fn until(&self, next: DateTime<Utc>) -> Duration {
        self.log.log(
            LogLevel::Log,
            LOG_TARGET,
            &format!("[{LOG_TARGET}] {}: next execution at {next}", self.query.key()),
        );

        let wait = (next - self.clock.now()).to_std().unwrap_or(Duration::ZERO);
        let wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(key = self.query.key(), %next, wait_ms, "cron armed");
        wait
    }

    fn halt(&self, error: ScheduleError) {
        tracing::warn!(key = self.query.key(), %error, "schedule halted");
        self.log.log(
            LogLevel::Error,
            LOG_TARGET,
            &format!("[{LOG_TARGET}] {}: {error}", self.query.key()),
        );
        self.shared.status.send_if_modified(|status| {
            if *status == ScheduleStatus::Running {
                *status = ScheduleStatus::Halted(error);
                true
            } else {
                false
            }
        });
    }
}

/// Owns the timers of one scheduled query. Dropping it cancels them.
#[must_use = "dropping the handle cancels the schedule"]
pub struct ScheduleHandle {
    driver: Driver,
    tasks: Vec<JoinHandle<()>>,
}

impl ScheduleHandle {
    /// Stop every timer. Idempotent.
    pub fn cancel(&self) {
        if self.driver.token.is_cancelled() {
            return;
        }
        self.driver.token.cancel();
        self.driver.shared.status.send_if_modified(|status| {
            if *status == ScheduleStatus::Running {
                *status = ScheduleStatus::Cancelled;
                true
            } else {
                false
            }
        });
        tracing::debug!(key = self.driver.query.key(), "schedule cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.driver.token.is_cancelled()
    }

    pub fn status(&self) -> ScheduleStatus {
        self.driver.shared.status.borrow().clone()
    }

    /// Receiver woken on every status change.
    pub fn watch_status(&self) -> watch::Receiver<ScheduleStatus> {
        self.driver.shared.status.subscribe()
    }

    /// Wait until the schedule leaves [`ScheduleStatus::Running`].
    ///
    /// Returns the error that halted it, or `None` if it was cancelled.
    pub async fn halted(&self) -> Option<ScheduleError> {
        let mut status = self.watch_status();
        let settled = status
            .wait_for(|status| *status != ScheduleStatus::Running)
            .await
            .ok()?;
        match &*settled {
            ScheduleStatus::Halted(error) => Some(error.clone()),
            _ => None,
        }
    }

    /// Completed refetches triggered by this schedule.
    pub fn executions(&self) -> u64 {
        self.driver.shared.executions.load(Ordering::SeqCst)
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("key", &self.driver.query.key())
            .field("status", &self.status())
            .field("executions", &self.executions())
            .finish()
    }
}
