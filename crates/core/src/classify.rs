//! Driver error code classification
//!
//! Which error codes mean "lock conflict" or "deadlock" is database specific.
//! Driver adapters own an [`ErrorClassifier`] and use it to turn raw driver
//! errors into [`WorkError::Transient`] or [`WorkError::Fatal`], so the engine
//! itself never looks at numeric codes.

use crate::error::WorkError;
use std::collections::BTreeSet;

/// Maps driver error codes to transient or fatal failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    transient_codes: BTreeSet<i64>,
}

impl ErrorClassifier {
    /// Firebird `isc_deadlock`
    pub const FIREBIRD_DEADLOCK: i64 = 335544451;
    /// Firebird `isc_lock_conflict` raised for update conflicts
    pub const FIREBIRD_UPDATE_CONFLICT: i64 = 335544336;
    /// Firebird `isc_lock_conflict`
    pub const FIREBIRD_LOCK_CONFLICT: i64 = 335544345;
    /// SQLite `SQLITE_BUSY`
    pub const SQLITE_BUSY: i64 = 5;
    /// SQLite `SQLITE_LOCKED`
    pub const SQLITE_LOCKED: i64 = 6;

    /// Classifier treating exactly `codes` as transient
    pub fn new(codes: impl IntoIterator<Item = i64>) -> Self {
        Self {
            transient_codes: codes.into_iter().collect(),
        }
    }

    /// Deadlock and lock-conflict codes reported by Firebird / InterBase
    pub fn firebird() -> Self {
        Self::new([
            Self::FIREBIRD_DEADLOCK,
            Self::FIREBIRD_UPDATE_CONFLICT,
            Self::FIREBIRD_LOCK_CONFLICT,
        ])
    }

    /// Primary result codes SQLite uses for contention
    pub fn sqlite() -> Self {
        Self::new([Self::SQLITE_BUSY, Self::SQLITE_LOCKED])
    }

    /// Add one more transient code
    pub fn with_code(mut self, code: i64) -> Self {
        self.transient_codes.insert(code);
        self
    }

    /// True if `code` denotes contention
    pub fn is_transient(&self, code: i64) -> bool {
        self.transient_codes.contains(&code)
    }

    /// Build the [`WorkError`] for a driver failure
    pub fn classify(&self, code: Option<i64>, message: impl Into<String>) -> WorkError {
        let message = message.into();
        match code {
            Some(c) if self.is_transient(c) => WorkError::Transient { code, message },
            _ => WorkError::Fatal { code, message },
        }
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::firebird()
    }
}
