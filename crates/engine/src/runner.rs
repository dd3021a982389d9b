//! Repeating runner
//!
//! A runner executes one [`WorkUnit`] on a dedicated thread under a
//! [`RunMode`]. The thread body is [`run_member`]; spawning and joining is
//! owned by the [`ThreadGroup`](crate::group::ThreadGroup).
//!
//! Lifecycle is `Idle -> Running -> Finished`. The loop is do-while shaped:
//! the continuation test runs after each invocation, so every runner performs
//! at least one invocation, even when cancelled before it was scheduled.

use crate::collector::ResultCollector;
use as3ap_core::{Connection, ConnectionProvider, WorkError, WorkUnit};
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, trace, warn};

/// How long a runner keeps invoking its work unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Exactly one invocation
    Once,
    /// Until [`RunnerHandle::cancel`] is called
    UntilCancelled,
    /// Until the wall-clock duration has elapsed, measured from the first invocation
    UntilDeadline(Duration),
}

/// Identity of a runner within its group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunnerId(pub u64);

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a runner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerStatus {
    /// Registered, thread not yet running
    Idle,
    /// Thread is inside its loop
    Running,
    /// Thread left its loop
    Finished,
}

/// How a single invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationOutcome {
    /// Recorded as Success
    Completed,
    /// Recorded as Failure
    Failed,
    /// Recorded as Error
    Errored,
    /// Lock conflict; nothing recorded
    Transient,
}

impl InvocationOutcome {
    /// True for every outcome except [`InvocationOutcome::Transient`]
    pub fn counts_as_completed(self) -> bool {
        !matches!(self, InvocationOutcome::Transient)
    }
}

/// Run `unit` once on `conn` and report the outcome to `collector`.
///
/// Panics inside the unit are caught and recorded as errors.
pub fn invoke(
    unit: &dyn WorkUnit,
    conn: &mut dyn Connection,
    collector: &ResultCollector,
) -> InvocationOutcome {
    let id = collector.on_start(unit.name());
    match catch_unwind(AssertUnwindSafe(|| unit.execute(conn))) {
        Ok(Ok(())) => {
            collector.on_end(id);
            InvocationOutcome::Completed
        }
        Ok(Err(WorkError::Assertion(detail))) => {
            warn!(target: "as3ap::runner", unit = unit.name(), %detail, "consistency check failed");
            collector.on_failure(id, detail);
            InvocationOutcome::Failed
        }
        Ok(Err(e)) if e.is_transient() => {
            trace!(
                target: "as3ap::runner",
                unit = unit.name(),
                error = %e,
                "transient failure, moving on"
            );
            collector.on_transient(id);
            InvocationOutcome::Transient
        }
        Ok(Err(e)) => {
            warn!(target: "as3ap::runner", unit = unit.name(), error = %e, "work unit failed");
            collector.on_error(id, e.to_string());
            InvocationOutcome::Errored
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(target: "as3ap::runner", unit = unit.name(), %message, "work unit panicked");
            collector.on_error(id, format!("panic: {}", message));
            InvocationOutcome::Errored
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "(non-string panic)".to_string())
}

/// Everything a runner thread needs besides its work unit
#[derive(Clone)]
pub struct RunContext {
    /// Source of the runner's dedicated connection
    pub provider: Arc<dyn ConnectionProvider>,
    /// Shared result sink
    pub collector: Arc<ResultCollector>,
    /// Pause between two invocations; zero disables it
    pub iteration_sleep: Duration,
}

impl RunContext {
    /// Context without inter-iteration sleep
    pub fn new(provider: Arc<dyn ConnectionProvider>, collector: Arc<ResultCollector>) -> Self {
        Self {
            provider,
            collector,
            iteration_sleep: Duration::ZERO,
        }
    }

    /// Set the pause between invocations
    pub fn with_iteration_sleep(mut self, sleep: Duration) -> Self {
        self.iteration_sleep = sleep;
        self
    }
}

struct Lifecycle {
    status: RunnerStatus,
    started: Option<Instant>,
    finished: Option<Instant>,
}

struct RunnerState {
    id: RunnerId,
    unit: String,
    mode: RunMode,
    cancelled: Mutex<bool>,
    wake: Condvar,
    completed: AtomicU64,
    transient: AtomicU64,
    errors: AtomicU64,
    lifecycle: Mutex<Lifecycle>,
}

/// Shared handle to one runner.
///
/// Cloning is cheap; all clones observe the same runner.
#[derive(Clone)]
pub struct RunnerHandle(Arc<RunnerState>);

impl RunnerHandle {
    pub(crate) fn new(id: RunnerId, unit: &str, mode: RunMode) -> Self {
        Self(Arc::new(RunnerState {
            id,
            unit: unit.to_string(),
            mode,
            cancelled: Mutex::new(false),
            wake: Condvar::new(),
            completed: AtomicU64::new(0),
            transient: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            lifecycle: Mutex::new(Lifecycle {
                status: RunnerStatus::Idle,
                started: None,
                finished: None,
            }),
        }))
    }

    /// Runner identity
    pub fn id(&self) -> RunnerId {
        self.0.id
    }

    /// Name of the work unit this runner executes
    pub fn unit_name(&self) -> &str {
        &self.0.unit
    }

    /// Configured mode
    pub fn mode(&self) -> RunMode {
        self.0.mode
    }

    /// Ask the runner to stop after its current invocation.
    ///
    /// Interrupts an inter-iteration sleep. Idempotent and non-blocking.
    pub fn cancel(&self) {
        let mut cancelled = self.0.cancelled.lock();
        *cancelled = true;
        // Notify under the lock so a runner between its check and its wait
        // cannot miss the wakeup.
        self.0.wake.notify_all();
    }

    /// True once [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        *self.0.cancelled.lock()
    }

    /// Current lifecycle state
    pub fn status(&self) -> RunnerStatus {
        self.0.lifecycle.lock().status
    }

    /// True once the runner thread left its loop
    pub fn is_finished(&self) -> bool {
        self.status() == RunnerStatus::Finished
    }

    /// Successful, failed and errored invocations.
    ///
    /// Only final once [`is_finished`](Self::is_finished) is true.
    pub fn completed_count(&self) -> u64 {
        self.0.completed.load(Ordering::Acquire)
    }

    /// Invocations discarded because of lock conflicts
    pub fn transient_count(&self) -> u64 {
        self.0.transient.load(Ordering::Acquire)
    }

    /// Invocations that ended in an error, including a failed connection acquire
    pub fn error_count(&self) -> u64 {
        self.0.errors.load(Ordering::Acquire)
    }

    /// Time spent running: until finish, or until now while still running
    pub fn elapsed(&self) -> Option<Duration> {
        let lifecycle = self.0.lifecycle.lock();
        let started = lifecycle.started?;
        Some(match lifecycle.finished {
            Some(finished) => finished.duration_since(started),
            None => started.elapsed(),
        })
    }

    fn mark_running(&self) {
        let mut lifecycle = self.0.lifecycle.lock();
        lifecycle.status = RunnerStatus::Running;
        lifecycle.started = Some(Instant::now());
    }

    fn mark_finished(&self) {
        let mut lifecycle = self.0.lifecycle.lock();
        lifecycle.status = RunnerStatus::Finished;
        lifecycle.finished = Some(Instant::now());
        if lifecycle.started.is_none() {
            lifecycle.started = lifecycle.finished;
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns true if cancelled.
    fn sleep_interruptibly(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let mut cancelled = self.0.cancelled.lock();
        while !*cancelled {
            if self.0.wake.wait_until(&mut cancelled, deadline).timed_out() {
                break;
            }
        }
        *cancelled
    }

    fn record(&self, outcome: InvocationOutcome) {
        match outcome {
            InvocationOutcome::Transient => {
                self.0.transient.fetch_add(1, Ordering::AcqRel);
            }
            InvocationOutcome::Errored => {
                self.0.errors.fetch_add(1, Ordering::AcqRel);
                self.0.completed.fetch_add(1, Ordering::AcqRel);
            }
            InvocationOutcome::Completed | InvocationOutcome::Failed => {
                self.0.completed.fetch_add(1, Ordering::AcqRel);
            }
        }
    }
}

impl fmt::Debug for RunnerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerHandle")
            .field("id", &self.0.id)
            .field("unit", &self.0.unit)
            .field("mode", &self.0.mode)
            .field("status", &self.status())
            .field("completed", &self.completed_count())
            .finish()
    }
}

/// Notifications a runner thread sends to its owner
pub(crate) trait MemberEvents: Send + Sync {
    /// The thread entered its body
    fn started(&self, id: RunnerId);
    /// The thread is about to exit. Sent exactly once, also on panic.
    fn finished(&self, id: RunnerId);
}

/// Marks the runner finished and notifies the owner on drop.
///
/// Runs on every exit path, including unwinding out of the provider.
struct ExitGuard<'a> {
    handle: &'a RunnerHandle,
    events: &'a dyn MemberEvents,
}

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.handle.mark_finished();
        debug!(
            target: "as3ap::runner",
            runner = %self.handle.id(),
            unit = self.handle.unit_name(),
            completed = self.handle.completed_count(),
            transient = self.handle.transient_count(),
            "runner finished"
        );
        self.events.finished(self.handle.id());
    }
}

/// Thread body of one runner
pub(crate) fn run_member(
    handle: RunnerHandle,
    unit: Arc<dyn WorkUnit>,
    ctx: RunContext,
    events: Arc<dyn MemberEvents>,
) {
    let _guard = ExitGuard {
        handle: &handle,
        events: events.as_ref(),
    };
    handle.mark_running();
    events.started(handle.id());
    debug!(
        target: "as3ap::runner",
        runner = %handle.id(),
        unit = unit.name(),
        mode = ?handle.mode(),
        "runner started"
    );

    let mut conn = match ctx.provider.acquire() {
        Ok(conn) => conn,
        Err(e) => {
            warn!(
                target: "as3ap::runner",
                unit = unit.name(),
                error = %e,
                "could not acquire connection"
            );
            let id = ctx.collector.on_start(unit.name());
            ctx.collector
                .on_error(id, format!("could not acquire connection: {}", e));
            handle.0.errors.fetch_add(1, Ordering::AcqRel);
            return;
        }
    };

    run_loop(&handle, unit.as_ref(), conn.as_mut(), &ctx);

    // Returned before the guard notifies, so a finished group holds no connections
    ctx.provider.release(conn);
}

fn run_loop(
    handle: &RunnerHandle,
    unit: &dyn WorkUnit,
    conn: &mut dyn Connection,
    ctx: &RunContext,
) {
    let started = Instant::now();
    loop {
        let outcome = invoke(unit, conn, &ctx.collector);
        handle.record(outcome);

        let keep_going = match handle.mode() {
            RunMode::Once => false,
            RunMode::UntilCancelled => !handle.is_cancelled(),
            RunMode::UntilDeadline(limit) => started.elapsed() < limit && !handle.is_cancelled(),
        };
        if !keep_going {
            break;
        }

        if !ctx.iteration_sleep.is_zero() {
            let pause = match handle.mode() {
                RunMode::UntilDeadline(limit) => ctx
                    .iteration_sleep
                    .min(limit.saturating_sub(started.elapsed())),
                _ => ctx.iteration_sleep,
            };
            if handle.sleep_interruptibly(pause) {
                break;
            }
            if let RunMode::UntilDeadline(limit) = handle.mode() {
                if started.elapsed() >= limit {
                    break;
                }
            }
        }
    }
}
