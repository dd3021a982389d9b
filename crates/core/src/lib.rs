//! Core types and traits for the AS3AP benchmark engine
//!
//! This crate defines the contracts shared by every layer:
//! - Connection / ConnectionProvider: the abstract database the workload drives
//! - IsolationLevel, SqlValue, RowSet: statement parameters and results
//! - WorkUnit: one named, repeatable unit of database work
//! - ErrorClassifier: maps driver error codes to transient/fatal failures
//! - Error: the WorkError / BenchError hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod connection;
pub mod error;
pub mod work;

pub use classify::ErrorClassifier;
pub use connection::{transaction, Connection, ConnectionProvider, IsolationLevel, RowSet, SqlValue};
pub use error::{BenchError, BenchResult, WorkError, WorkResult};
pub use work::{FnWorkUnit, WorkUnit};
