//! In-memory recording database for tests
//!
//! [`RecordingDatabase`] is a [`ConnectionProvider`] that executes nothing.
//! It journals every statement and transaction event of every connection in
//! one global sequence, answers statements from scripted rules, and can add
//! per-statement latency or refuse connections outright. Protocol-level tests
//! assert on the journal.
//!
//! Unscripted statements get a neutral answer: `SELECT count(*)` returns a
//! single 0, other `SELECT`s return no rows, everything else affects 0 rows.

use as3ap_core::{
    Connection, ConnectionProvider, IsolationLevel, RowSet, SqlValue, WorkError, WorkResult,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One journaled call
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// `Connection::execute`
    Execute {
        /// Statement text
        sql: String,
        /// Bound parameters
        params: Vec<SqlValue>,
    },
    /// `Connection::set_isolation_level`
    IsolationLevel(IsolationLevel),
    /// `Connection::set_auto_commit`
    AutoCommit(bool),
    /// `Connection::commit`
    Commit,
    /// `Connection::rollback`
    Rollback,
}

/// A journal entry
#[derive(Debug, Clone, PartialEq)]
pub struct EventRecord {
    /// Global position, strictly increasing across connections
    pub seq: u64,
    /// Connection that produced the event
    pub connection: u64,
    /// What happened
    pub event: Event,
}

/// Scripted answer to a statement
#[derive(Debug, Clone)]
pub enum Response {
    /// Return these rows
    Rows(RowSet),
    /// Fail with this error
    Fail(WorkError),
}

struct Rule {
    fragment: String,
    response: Response,
}

#[derive(Default)]
struct Journal {
    next_seq: u64,
    events: Vec<EventRecord>,
}

#[derive(Default)]
struct Inner {
    journal: Mutex<Journal>,
    rules: Mutex<Vec<Rule>>,
    latency: Mutex<Duration>,
    refuse: AtomicBool,
    next_connection: AtomicU64,
    open: AtomicUsize,
    acquired: AtomicUsize,
}

/// Recording fake database; clones share the same journal and rules
#[derive(Clone, Default)]
pub struct RecordingDatabase {
    inner: Arc<Inner>,
}

impl RecordingDatabase {
    /// Empty journal, no rules, no latency
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `fragment` with `response`.
    ///
    /// Later rules take precedence over earlier ones.
    pub fn respond(&self, fragment: impl Into<String>, response: Response) {
        self.inner.rules.lock().push(Rule {
            fragment: fragment.into(),
            response,
        });
    }

    /// Fail statements containing `fragment` with `error`
    pub fn fail(&self, fragment: impl Into<String>, error: WorkError) {
        self.respond(fragment, Response::Fail(error));
    }

    /// Sleep this long inside every `execute`
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Make `acquire` fail while `refuse` is true
    pub fn refuse_connections(&self, refuse: bool) {
        self.inner.refuse.store(refuse, Ordering::Release);
    }

    /// Copy of the journal, in global order
    pub fn events(&self) -> Vec<EventRecord> {
        self.inner.journal.lock().events.clone()
    }

    /// Executed statement texts, in global order
    pub fn statements(&self) -> Vec<String> {
        self.inner
            .journal
            .lock()
            .events
            .iter()
            .filter_map(|record| match &record.event {
                Event::Execute { sql, .. } => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of executed statements containing `fragment`
    pub fn count_matching(&self, fragment: &str) -> usize {
        self.statements()
            .iter()
            .filter(|sql| sql.contains(fragment))
            .count()
    }

    /// Connections acquired and not yet released
    pub fn open_connections(&self) -> usize {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Connections handed out so far
    pub fn connections_acquired(&self) -> usize {
        self.inner.acquired.load(Ordering::Acquire)
    }

    /// Forget all journaled events
    pub fn clear(&self) {
        self.inner.journal.lock().events.clear();
    }

    fn record(&self, connection: u64, event: Event) {
        let mut journal = self.inner.journal.lock();
        let seq = journal.next_seq;
        journal.next_seq += 1;
        journal.events.push(EventRecord {
            seq,
            connection,
            event,
        });
    }

    fn answer(&self, sql: &str) -> WorkResult<RowSet> {
        let rules = self.inner.rules.lock();
        if let Some(rule) = rules.iter().rev().find(|r| sql.contains(&r.fragment)) {
            return match &rule.response {
                Response::Rows(rows) => Ok(rows.clone()),
                Response::Fail(e) => Err(e.clone()),
            };
        }
        drop(rules);

        let lower = sql.trim_start().to_ascii_lowercase();
        if lower.starts_with("select count(") {
            Ok(RowSet::scalar("count", SqlValue::Integer(0)))
        } else if lower.starts_with("select") {
            Ok(RowSet::empty())
        } else {
            Ok(RowSet::affected(0))
        }
    }
}

impl ConnectionProvider for RecordingDatabase {
    fn acquire(&self) -> WorkResult<Box<dyn Connection>> {
        if self.inner.refuse.load(Ordering::Acquire) {
            return Err(WorkError::fatal("connection refused"));
        }
        let id = self.inner.next_connection.fetch_add(1, Ordering::AcqRel);
        self.inner.open.fetch_add(1, Ordering::AcqRel);
        self.inner.acquired.fetch_add(1, Ordering::AcqRel);
        Ok(Box::new(RecordingConnection {
            id,
            db: self.clone(),
        }))
    }
}

struct RecordingConnection {
    id: u64,
    db: RecordingDatabase,
}

impl Connection for RecordingConnection {
    fn set_isolation_level(&mut self, level: IsolationLevel) -> WorkResult<()> {
        self.db.record(self.id, Event::IsolationLevel(level));
        Ok(())
    }

    fn set_auto_commit(&mut self, enabled: bool) -> WorkResult<()> {
        self.db.record(self.id, Event::AutoCommit(enabled));
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> WorkResult<RowSet> {
        self.db.record(
            self.id,
            Event::Execute {
                sql: sql.to_string(),
                params: params.to_vec(),
            },
        );
        let latency = *self.db.inner.latency.lock();
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        self.db.answer(sql)
    }

    fn commit(&mut self) -> WorkResult<()> {
        self.db.record(self.id, Event::Commit);
        Ok(())
    }

    fn rollback(&mut self) -> WorkResult<()> {
        self.db.record(self.id, Event::Rollback);
        Ok(())
    }
}

impl Drop for RecordingConnection {
    fn drop(&mut self) {
        self.db.inner.open.fetch_sub(1, Ordering::AcqRel);
    }
}
