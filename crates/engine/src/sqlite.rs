//! SQLite driver adapter
//!
//! Every [`ConnectionProvider::acquire`] opens a fresh SQLite connection in
//! WAL mode with a busy timeout. Transactions are managed by hand: with
//! auto-commit off, the first statement issues `BEGIN` and the transaction
//! stays open until `commit` or `rollback`.
//!
//! SQLite is always serializable; the only isolation knob it has is
//! `PRAGMA read_uncommitted`, which is switched on for
//! [`IsolationLevel::ReadUncommitted`] and off otherwise. Contention surfaces
//! as `SQLITE_BUSY` / `SQLITE_LOCKED`, which the [`ErrorClassifier`] turns
//! into transient failures.

use crate::config::BenchmarkConfig;
use as3ap_core::{
    Connection, ConnectionProvider, ErrorClassifier, IsolationLevel, RowSet, SqlValue, WorkError,
    WorkResult,
};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::trace;

/// Opens SQLite connections on one database file
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    path: PathBuf,
    busy_timeout: Duration,
    classifier: ErrorClassifier,
}

impl SqliteProvider {
    /// Provider for the database at `path` with a 5 s busy timeout
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::from_secs(5),
            classifier: ErrorClassifier::sqlite(),
        }
    }

    /// Provider for the `[database]` section of `config`
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self::new(config.database.path.clone()).with_busy_timeout(config.busy_timeout())
    }

    /// How long a statement waits on a lock before failing with `SQLITE_BUSY`
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Replace the transient error classification
    pub fn with_classifier(mut self, classifier: ErrorClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> WorkResult<rusqlite::Connection> {
        let conn = rusqlite::Connection::open(&self.path)
            .map_err(|e| map_error(&self.classifier, e))?;
        conn.busy_timeout(self.busy_timeout)
            .map_err(|e| map_error(&self.classifier, e))?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| map_error(&self.classifier, e))?;
        trace!(
            target: "as3ap::sqlite",
            path = %self.path.display(),
            journal_mode = %mode,
            "connection opened"
        );
        Ok(conn)
    }
}

impl ConnectionProvider for SqliteProvider {
    fn acquire(&self) -> WorkResult<Box<dyn Connection>> {
        Ok(Box::new(SqliteConnection {
            conn: self.open()?,
            classifier: self.classifier.clone(),
            auto_commit: true,
            in_transaction: false,
        }))
    }
}

struct SqliteConnection {
    conn: rusqlite::Connection,
    classifier: ErrorClassifier,
    auto_commit: bool,
    in_transaction: bool,
}

impl SqliteConnection {
    fn fail(&self, e: rusqlite::Error) -> WorkError {
        map_error(&self.classifier, e)
    }

    fn begin_if_needed(&mut self) -> WorkResult<()> {
        if !self.auto_commit && !self.in_transaction {
            self.conn.execute_batch("BEGIN").map_err(|e| self.fail(e))?;
            self.in_transaction = true;
        }
        Ok(())
    }

    fn end(&mut self, sql: &str) -> WorkResult<()> {
        if !self.in_transaction {
            return Ok(());
        }
        // The transaction is over either way; a failed COMMIT is rolled back by the caller
        self.in_transaction = false;
        self.conn.execute_batch(sql).map_err(|e| self.fail(e))
    }
}

impl Connection for SqliteConnection {
    fn set_isolation_level(&mut self, level: IsolationLevel) -> WorkResult<()> {
        let dirty = level == IsolationLevel::ReadUncommitted;
        self.conn
            .pragma_update(None, "read_uncommitted", dirty)
            .map_err(|e| self.fail(e))
    }

    fn set_auto_commit(&mut self, enabled: bool) -> WorkResult<()> {
        if enabled && self.in_transaction {
            self.end("COMMIT")?;
        }
        self.auto_commit = enabled;
        Ok(())
    }

    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> WorkResult<RowSet> {
        self.begin_if_needed()?;
        let classifier = &self.classifier;
        let fail = |e: rusqlite::Error| map_error(classifier, e);

        let mut stmt = self.conn.prepare(sql).map_err(fail)?;
        let bound = rusqlite::params_from_iter(params.iter().map(Param));

        if stmt.column_count() == 0 {
            let affected = stmt.execute(bound).map_err(fail)?;
            return Ok(RowSet::affected(affected as u64));
        }

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();
        let mut rows = Vec::new();
        let mut cursor = stmt.query(bound).map_err(fail)?;
        while let Some(row) = cursor.next().map_err(fail)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i).map_err(fail)?));
            }
            rows.push(values);
        }
        Ok(RowSet::with_rows(columns, rows))
    }

    fn commit(&mut self) -> WorkResult<()> {
        self.end("COMMIT")
    }

    fn rollback(&mut self) -> WorkResult<()> {
        self.end("ROLLBACK")
    }
}

/// Binds a [`SqlValue`] as a SQLite parameter
struct Param<'a>(&'a SqlValue);

impl ToSql for Param<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self.0 {
            SqlValue::Null => ToSqlOutput::Owned(Value::Null),
            SqlValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
        })
    }
}

fn from_value_ref(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) => SqlValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    }
}

fn map_error(classifier: &ErrorClassifier, e: rusqlite::Error) -> WorkError {
    match &e {
        rusqlite::Error::SqliteFailure(failure, _) => {
            // Primary result code lives in the low byte of the extended code
            let primary = i64::from(failure.extended_code & 0xff);
            classifier.classify(Some(primary), e.to_string())
        }
        _ => WorkError::fatal(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::Fixture;
    use crate::workload::{ClearStaging, Query, QueryUnit, RestoreStrategy, RestoreUpdates};
    use as3ap_core::WorkUnit;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn populated(rows: u32) -> (TempDir, SqliteProvider) {
        let dir = TempDir::new().unwrap();
        let provider = SqliteProvider::new(dir.path().join("as3ap.db"));
        let fixture = Fixture::new(Arc::new(provider.clone()));
        fixture.create_schema().unwrap();
        fixture.populate(rows, 42).unwrap();
        (dir, provider)
    }

    fn count(conn: &mut dyn Connection, table: &str) -> i64 {
        conn.execute(&format!("SELECT count(*) FROM {}", table), &[])
            .unwrap()
            .scalar_i64()
            .unwrap()
    }

    #[test]
    fn test_fixture_populates_relations() {
        let (_dir, provider) = populated(1200);
        let mut conn = provider.acquire().unwrap();
        assert_eq!(count(conn.as_mut(), "\"updates\""), 1200);
        assert_eq!(count(conn.as_mut(), "\"hundred\""), 1200);
        assert_eq!(count(conn.as_mut(), "\"tiny\""), 1);
        assert_eq!(count(conn.as_mut(), "\"saveupdates\""), 1200);
    }

    #[test]
    fn test_cross_section_then_checks_pass() {
        let (_dir, provider) = populated(1200);
        let mut conn = provider.acquire().unwrap();
        for query in Query::CROSS_SECTION {
            QueryUnit::new(query).execute(conn.as_mut()).unwrap();
        }
        assert_eq!(count(conn.as_mut(), "\"sel100seq\""), 100);
        assert_eq!(count(conn.as_mut(), "\"sel100rnd\""), 100);
        for query in Query::CHECKS {
            QueryUnit::new(query).execute(conn.as_mut()).unwrap();
        }
    }

    #[test]
    fn test_check_detects_unrestored_modification() {
        let (_dir, provider) = populated(1200);
        let mut conn = provider.acquire().unwrap();
        QueryUnit::new(Query::Select100Seq).execute(conn.as_mut()).unwrap();
        QueryUnit::new(Query::Modify100Seq).execute(conn.as_mut()).unwrap();
        let err = QueryUnit::new(Query::Check100Seq)
            .execute(conn.as_mut())
            .unwrap_err();
        assert_eq!(
            err,
            WorkError::assertion("Should have no records, but reported 100.")
        );
    }

    #[test]
    fn test_restore_strategies_reload_backup() {
        for strategy in [RestoreStrategy::DeleteAndReload, RestoreStrategy::DropAndRecreate] {
            let (_dir, provider) = populated(300);
            let mut conn = provider.acquire().unwrap();
            conn.execute("DELETE FROM \"updates\" WHERE \"key\" < 100", &[]).unwrap();
            assert_eq!(count(conn.as_mut(), "\"updates\""), 200);

            RestoreUpdates::new(strategy).execute(conn.as_mut()).unwrap();
            assert_eq!(count(conn.as_mut(), "\"updates\""), 300, "{:?}", strategy);
        }
    }

    #[test]
    fn test_clear_staging_empties_tables() {
        let (_dir, provider) = populated(1200);
        let mut conn = provider.acquire().unwrap();
        QueryUnit::new(Query::Select100Seq).execute(conn.as_mut()).unwrap();
        ClearStaging.execute(conn.as_mut()).unwrap();
        assert_eq!(count(conn.as_mut(), "\"sel100seq\""), 0);
    }

    #[test]
    fn test_rollback_discards_changes() {
        let (_dir, provider) = populated(10);
        let mut conn = provider.acquire().unwrap();
        conn.set_auto_commit(false).unwrap();
        conn.execute("DELETE FROM \"updates\"", &[]).unwrap();
        conn.rollback().unwrap();
        conn.set_auto_commit(true).unwrap();
        assert_eq!(count(conn.as_mut(), "\"updates\""), 10);
    }

    #[test]
    fn test_write_conflict_is_transient() {
        let (_dir, provider) = populated(10);
        let provider = provider.with_busy_timeout(Duration::ZERO);
        let mut writer = provider.acquire().unwrap();
        let mut other = provider.acquire().unwrap();

        writer.set_auto_commit(false).unwrap();
        writer
            .execute(Query::OltpUpdate.sql(), &[SqlValue::Integer(1)])
            .unwrap();

        let err = other
            .execute(Query::OltpUpdate.sql(), &[SqlValue::Integer(2)])
            .unwrap_err();
        assert!(err.is_transient(), "unexpected error: {}", err);
        assert_eq!(err.code(), Some(ErrorClassifier::SQLITE_BUSY));

        writer.commit().unwrap();
    }

    #[test]
    fn test_syntax_error_is_fatal() {
        let dir = TempDir::new().unwrap();
        let provider = SqliteProvider::new(dir.path().join("x.db"));
        let mut conn = provider.acquire().unwrap();
        let err = conn.execute("SELEC 1", &[]).unwrap_err();
        assert!(!err.is_transient());
    }
}
