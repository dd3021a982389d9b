//! Result collection
//!
//! Every work unit invocation is bracketed by `on_start` and exactly one of
//! `on_end` / `on_failure` / `on_error` / `on_transient`. Completed
//! invocations are folded into per-unit totals as they finish; transient ones
//! are dropped and only tallied. One collector is shared by reference by all
//! runners of a single benchmark run.
//!
//! Memory stays bounded for arbitrarily long runs: only the first
//! `record_limit` completed invocations are kept as [`ResultRecord`]s, and at
//! most [`DETAIL_LIMIT`] failure/error messages are kept per unit. Counts and
//! durations are always exact.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Completed invocations kept as [`ResultRecord`]s by [`ResultCollector::new`]
pub const DEFAULT_RECORD_LIMIT: usize = 10_000;

/// Failure and error messages kept per unit
pub const DETAIL_LIMIT: usize = 100;

/// Outcome of one completed invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    /// Finished without error
    Success,
    /// A consistency assertion did not hold
    Failure(String),
    /// Database error or panic
    Error(String),
}

/// Immutable record of one completed invocation
#[derive(Debug, Clone, Serialize)]
pub struct ResultRecord {
    /// Work unit name
    pub unit: String,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    pub ended_at: DateTime<Utc>,
    /// Monotonic duration of the invocation
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// How the invocation ended
    pub outcome: Outcome,
}

/// Token returned by [`ResultCollector::on_start`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InvocationId(u64);

struct Pending {
    unit: usize,
    started_at: DateTime<Utc>,
    started: Instant,
}

/// Running totals of one unit name
struct UnitTotals {
    name: Arc<str>,
    invocations: u64,
    total_duration: Duration,
    failures: u64,
    errors: u64,
    transient: u64,
    details: Vec<String>,
    details_omitted: u64,
}

impl UnitTotals {
    fn new(name: Arc<str>) -> Self {
        Self {
            name,
            invocations: 0,
            total_duration: Duration::ZERO,
            failures: 0,
            errors: 0,
            transient: 0,
            details: Vec::new(),
            details_omitted: 0,
        }
    }

    fn add(&mut self, duration: Duration, outcome: &Outcome) {
        self.invocations += 1;
        self.total_duration += duration;
        let detail = match outcome {
            Outcome::Success => return,
            Outcome::Failure(detail) => {
                self.failures += 1;
                format!("failure: {}", detail)
            }
            Outcome::Error(detail) => {
                self.errors += 1;
                format!("error: {}", detail)
            }
        };
        if self.details.len() < DETAIL_LIMIT {
            self.details.push(detail);
        } else {
            self.details_omitted += 1;
        }
    }

    fn summary(&self) -> UnitSummary {
        UnitSummary {
            unit: self.name.to_string(),
            invocations: self.invocations,
            total_duration: self.total_duration,
            failures: self.failures,
            errors: self.errors,
            transient_retries: self.transient,
            details: self.details.clone(),
            details_omitted: self.details_omitted,
        }
    }
}

struct CollectorState {
    next_id: u64,
    pending: HashMap<u64, Pending>,
    /// Per-unit totals in order of first start
    units: Vec<UnitTotals>,
    index: HashMap<Arc<str>, usize>,
    records: Vec<ResultRecord>,
    record_limit: usize,
    records_dropped: u64,
}

impl CollectorState {
    fn new(record_limit: usize) -> Self {
        Self {
            next_id: 0,
            pending: HashMap::new(),
            units: Vec::new(),
            index: HashMap::new(),
            records: Vec::new(),
            record_limit,
            records_dropped: 0,
        }
    }

    fn unit_index(&mut self, unit: &str) -> usize {
        if let Some(&i) = self.index.get(unit) {
            return i;
        }
        let name: Arc<str> = Arc::from(unit);
        let i = self.units.len();
        self.units.push(UnitTotals::new(Arc::clone(&name)));
        self.index.insert(name, i);
        i
    }

    fn complete(&mut self, id: InvocationId, outcome: Outcome) {
        let Some(pending) = self.pending.remove(&id.0) else {
            warn!(
                target: "as3ap::collector",
                id = id.0,
                "completion for unknown invocation ignored"
            );
            return;
        };
        let duration = pending.started.elapsed();
        let totals = &mut self.units[pending.unit];
        totals.add(duration, &outcome);

        if self.records.len() < self.record_limit {
            let unit = totals.name.to_string();
            self.records.push(ResultRecord {
                unit,
                started_at: pending.started_at,
                ended_at: Utc::now(),
                duration,
                outcome,
            });
        } else {
            self.records_dropped += 1;
        }
    }
}

/// Thread-safe sink for invocation results
pub struct ResultCollector {
    state: Mutex<CollectorState>,
}

impl Default for ResultCollector {
    fn default() -> Self {
        Self::with_record_limit(DEFAULT_RECORD_LIMIT)
    }
}

impl ResultCollector {
    /// Empty collector keeping up to [`DEFAULT_RECORD_LIMIT`] records
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty collector keeping at most `limit` individual records
    pub fn with_record_limit(limit: usize) -> Self {
        Self {
            state: Mutex::new(CollectorState::new(limit)),
        }
    }

    /// An invocation of `unit` begins
    pub fn on_start(&self, unit: &str) -> InvocationId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let unit = state.unit_index(unit);
        state.pending.insert(
            id,
            Pending {
                unit,
                started_at: Utc::now(),
                started: Instant::now(),
            },
        );
        InvocationId(id)
    }

    /// The invocation finished successfully
    pub fn on_end(&self, id: InvocationId) {
        self.state.lock().complete(id, Outcome::Success);
    }

    /// The invocation failed a consistency assertion
    pub fn on_failure(&self, id: InvocationId, detail: impl Into<String>) {
        self.state.lock().complete(id, Outcome::Failure(detail.into()));
    }

    /// The invocation raised a database error or panicked
    pub fn on_error(&self, id: InvocationId, detail: impl Into<String>) {
        self.state.lock().complete(id, Outcome::Error(detail.into()));
    }

    /// The invocation hit a lock conflict. No record is kept.
    pub fn on_transient(&self, id: InvocationId) {
        let mut state = self.state.lock();
        if let Some(pending) = state.pending.remove(&id.0) {
            state.units[pending.unit].transient += 1;
        }
    }

    /// Copy of the retained records, in completion order.
    ///
    /// Holds the first `record_limit` completed invocations; later ones only
    /// show up in [`summarize`](Self::summarize).
    pub fn records(&self) -> Vec<ResultRecord> {
        self.state.lock().records.clone()
    }

    /// Completed invocations that were counted but not kept as records
    pub fn records_dropped(&self) -> u64 {
        self.state.lock().records_dropped
    }

    /// Invocations started but not yet completed
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Aggregate per unit name, in order of first execution
    pub fn summarize(&self) -> Summary {
        let state = self.state.lock();
        Summary {
            units: state.units.iter().map(UnitTotals::summary).collect(),
        }
    }
}

/// Aggregated results of one work unit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitSummary {
    /// Work unit name
    pub unit: String,
    /// Completed (non-transient) invocations
    pub invocations: u64,
    /// Sum of invocation durations
    #[serde(rename = "total_ms", serialize_with = "serialize_millis")]
    pub total_duration: Duration,
    /// Invocations that ended in a failed assertion
    pub failures: u64,
    /// Invocations that ended in an error
    pub errors: u64,
    /// Invocations discarded because of lock conflicts
    pub transient_retries: u64,
    /// Failure and error messages, at most [`DETAIL_LIMIT`]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
    /// Messages beyond [`DETAIL_LIMIT`] that were counted but not kept
    #[serde(skip_serializing_if = "is_zero")]
    pub details_omitted: u64,
}

fn is_zero(n: &u64) -> bool {
    *n == 0
}

/// End-of-run summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Summary {
    /// One entry per distinct unit name
    pub units: Vec<UnitSummary>,
}

impl Summary {
    /// Entry for `name`, if it ran
    pub fn unit(&self, name: &str) -> Option<&UnitSummary> {
        self.units.iter().find(|u| u.unit == name)
    }

    /// Total failures plus errors over all units
    pub fn problem_count(&self) -> u64 {
        self.units.iter().map(|u| u.failures + u.errors).sum()
    }

    /// Write the textual report to `sink`
    pub fn write_report<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        write!(sink, "{}", self)?;
        sink.flush()
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for unit in &self.units {
            write!(
                f,
                "{} - {} time(s), in {} ms., {} failures, {} errors.",
                unit.unit,
                unit.invocations,
                unit.total_duration.as_millis(),
                unit.failures,
                unit.errors
            )?;
            if unit.transient_retries > 0 {
                write!(f, " ({} transient retries)", unit.transient_retries)?;
            }
            writeln!(f)?;
            for detail in &unit.details {
                writeln!(f, "    {}", detail)?;
            }
            if unit.details_omitted > 0 {
                writeln!(f, "    ... {} more", unit.details_omitted)?;
            }
        }
        Ok(())
    }
}

pub(crate) fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}
