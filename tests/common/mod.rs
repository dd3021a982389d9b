//! Shared helpers for the integration suites.
//!
//! Import via `mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use as3ap::testing::{Event, EventRecord, RecordingDatabase, Response};
pub use as3ap::{
    BenchError, BenchmarkConfig, Connection, ConnectionProvider, FnWorkUnit, ResultCollector,
    RunContext, RunMode, RunnerHandle, ThreadGroup, WorkError, WorkResult, WorkUnit,
};

/// Generous bound for every wait in the suites
pub const AWAIT: Duration = Duration::from_secs(10);

/// Config small enough to run the whole protocol in well under a second
pub fn fast_config() -> BenchmarkConfig {
    BenchmarkConfig {
        user_count: 3,
        background_duration_ms: 20,
        performance_duration_ms: 30,
        inter_iteration_sleep_ms: 1,
        await_timeout_ms: 10_000,
        ..BenchmarkConfig::default()
    }
}

/// Run context over a recording database with a fresh collector
pub fn recording_context(db: &RecordingDatabase) -> (RunContext, Arc<ResultCollector>) {
    let collector = Arc::new(ResultCollector::new());
    let ctx = RunContext::new(Arc::new(db.clone()), Arc::clone(&collector));
    (ctx, collector)
}

/// Work unit counting its invocations, optionally sleeping in each
pub struct CountingUnit {
    name: String,
    pause: Duration,
    calls: AtomicUsize,
}

impl CountingUnit {
    pub fn new(name: &str) -> Arc<Self> {
        Self::sleeping(name, Duration::ZERO)
    }

    pub fn sleeping(name: &str, pause: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            pause,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl WorkUnit for CountingUnit {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, conn: &mut dyn Connection) -> WorkResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        conn.execute("SELECT 1", &[])?;
        if !self.pause.is_zero() {
            std::thread::sleep(self.pause);
        }
        Ok(())
    }
}

/// Poll `condition` until it holds or `timeout` elapses
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// Statements of the journal, in global order
pub fn executed_sql(events: &[EventRecord]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.event {
            Event::Execute { sql, .. } => Some(sql.clone()),
            _ => None,
        })
        .collect()
}
