//! Error types for the benchmark engine
//!
//! Two layers of failure exist:
//! - [`WorkError`]: raised by a single work unit invocation. These never escape
//!   a runner loop; they are converted into collector records.
//! - [`BenchError`]: raised by the engine itself (configuration, setup,
//!   orchestration). Orchestration errors abort the whole run.
//!
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for work unit invocations
pub type WorkResult<T> = std::result::Result<T, WorkError>;

/// Result type alias for engine operations
pub type BenchResult<T> = std::result::Result<T, BenchError>;

/// Failure of one work unit invocation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkError {
    /// Lock conflict, deadlock or serialization failure.
    ///
    /// Expected under concurrency; the runner simply moves on to the next
    /// iteration.
    #[error("transient failure: {message}")]
    Transient {
        /// Driver error code, if the driver reported one
        code: Option<i64>,
        /// Driver message
        message: String,
    },

    /// Any other database or connectivity error
    #[error("database error: {message}")]
    Fatal {
        /// Driver error code, if the driver reported one
        code: Option<i64>,
        /// Driver message
        message: String,
    },

    /// A consistency check did not hold
    #[error("assertion failed: {0}")]
    Assertion(String),
}

impl WorkError {
    /// Transient failure without an error code
    pub fn transient(message: impl Into<String>) -> Self {
        WorkError::Transient {
            code: None,
            message: message.into(),
        }
    }

    /// Fatal failure without an error code
    pub fn fatal(message: impl Into<String>) -> Self {
        WorkError::Fatal {
            code: None,
            message: message.into(),
        }
    }

    /// Failed consistency assertion
    pub fn assertion(message: impl Into<String>) -> Self {
        WorkError::Assertion(message.into())
    }

    /// True for lock conflicts and deadlocks
    pub fn is_transient(&self) -> bool {
        matches!(self, WorkError::Transient { .. })
    }

    /// Driver error code, when one was reported
    pub fn code(&self) -> Option<i64> {
        match self {
            WorkError::Transient { code, .. } | WorkError::Fatal { code, .. } => *code,
            WorkError::Assertion(_) => None,
        }
    }
}

/// Engine-level errors
#[derive(Debug, Error)]
pub enum BenchError {
    /// Invalid or unreadable configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (report sink, config file)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The initial database connection could not be acquired
    #[error("could not acquire database connection: {0}")]
    Connection(#[source] WorkError),

    /// Schema creation or data population failed
    #[error("fixture setup failed: {0}")]
    Setup(#[source] WorkError),

    /// A thread group did not finish within the await timeout
    #[error("thread group '{group}' did not finish within {timeout:?} ({remaining} runner(s) still active)")]
    AwaitTimeout {
        /// Group name
        group: String,
        /// Timeout that elapsed
        timeout: Duration,
        /// Members still registered when the timeout elapsed
        remaining: usize,
    },

    /// A thread group could not spawn its runner threads
    #[error("failed to start thread group '{group}': {reason}")]
    StartFailed {
        /// Group name
        group: String,
        /// Underlying spawn error
        reason: String,
    },

    /// Operation not valid in the current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl BenchError {
    /// True for failures of the orchestration machinery itself.
    ///
    /// These are the only errors that abort a benchmark run after it started.
    pub fn is_orchestration(&self) -> bool {
        matches!(
            self,
            BenchError::AwaitTimeout { .. }
                | BenchError::StartFailed { .. }
                | BenchError::InvalidState(_)
        )
    }
}
