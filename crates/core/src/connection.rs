//! Abstract database connection contract
//!
//! The engine never talks to a driver directly. Everything it needs from a
//! database is expressed by [`Connection`] and [`ConnectionProvider`]; driver
//! adapters (SQLite, the recording fake used in tests) implement them and are
//! responsible for classifying lock conflicts as
//! [`WorkError::Transient`](crate::WorkError::Transient).

use crate::error::WorkResult;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction isolation level requested per work unit invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Dirty reads allowed
    ReadUncommitted,
    /// Only committed data is visible
    ReadCommitted,
    /// Snapshot of the data as of transaction start
    RepeatableRead,
    /// Fully serializable
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        f.write_str(name)
    }
}

/// A statement parameter or result cell
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL
    Null,
    /// 64-bit signed integer
    Integer(i64),
    /// Double precision float
    Real(f64),
    /// Character data
    Text(String),
    /// Binary data
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Integer view of the value. Reals are truncated; other types yield `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Real(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// True for SQL NULL
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

/// Result of executing one statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names, empty for statements that return no rows
    pub columns: Vec<String>,
    /// Fetched rows, fully materialized on the client
    pub rows: Vec<Vec<SqlValue>>,
    /// Rows inserted, updated or deleted
    pub rows_affected: u64,
}

impl RowSet {
    /// Empty result
    pub fn empty() -> Self {
        Self::default()
    }

    /// Result of a data-modifying statement
    pub fn affected(rows_affected: u64) -> Self {
        Self {
            rows_affected,
            ..Self::default()
        }
    }

    /// Result of a query
    pub fn with_rows(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns,
            rows,
            rows_affected: 0,
        }
    }

    /// Single-row, single-column result such as `SELECT count(*)`
    pub fn scalar(column: impl Into<String>, value: SqlValue) -> Self {
        Self::with_rows(vec![column.into()], vec![vec![value]])
    }

    /// Number of fetched rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were fetched
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// First column of the first row as an integer
    pub fn scalar_i64(&self) -> Option<i64> {
        self.first_value().and_then(SqlValue::as_i64)
    }
}

/// One database session.
///
/// A connection is owned by exactly one runner thread for the duration of its
/// loop; it is never shared between threads.
pub trait Connection: Send {
    /// Set the isolation level used by subsequent statements
    fn set_isolation_level(&mut self, level: IsolationLevel) -> WorkResult<()>;

    /// Switch auto-commit on or off.
    ///
    /// With auto-commit off, statements accumulate into one transaction that
    /// ends with [`commit`](Connection::commit) or
    /// [`rollback`](Connection::rollback). Switching auto-commit back on
    /// commits any open transaction.
    fn set_auto_commit(&mut self, enabled: bool) -> WorkResult<()>;

    /// Execute one statement with positional parameters
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> WorkResult<RowSet>;

    /// Commit the open transaction, if any
    fn commit(&mut self) -> WorkResult<()>;

    /// Roll back the open transaction, if any
    fn rollback(&mut self) -> WorkResult<()>;
}

/// Source of database connections shared by all runners of a benchmark run
pub trait ConnectionProvider: Send + Sync {
    /// Open or borrow a connection
    fn acquire(&self) -> WorkResult<Box<dyn Connection>>;

    /// Return a connection. The default implementation closes it.
    fn release(&self, connection: Box<dyn Connection>) {
        drop(connection);
    }
}

/// Run `f` as a single transaction on `conn`.
///
/// Auto-commit is disabled for the duration of `f`. On success the
/// transaction is committed; on any error it is rolled back so no partial
/// state survives. Auto-commit is re-enabled in both cases.
pub fn transaction<T, F>(conn: &mut dyn Connection, f: F) -> WorkResult<T>
where
    F: FnOnce(&mut dyn Connection) -> WorkResult<T>,
{
    conn.set_auto_commit(false)?;
    match f(&mut *conn) {
        Ok(value) => {
            if let Err(e) = conn.commit() {
                let _ = conn.rollback();
                let _ = conn.set_auto_commit(true);
                return Err(e);
            }
            conn.set_auto_commit(true)?;
            Ok(value)
        }
        Err(e) => {
            // Report the original failure even if the rollback itself fails
            let _ = conn.rollback();
            let _ = conn.set_auto_commit(true);
            Err(e)
        }
    }
}
