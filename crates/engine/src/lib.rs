//! Multi-user benchmark engine
//!
//! This crate drives the AS3AP multi-user protocol on top of the contracts in
//! `as3ap-core`:
//! - Runner: one thread executing a work unit once, until cancelled, or until a deadline
//! - ThreadGroup: a cancelable, joinable set of runners
//! - ResultCollector: per-invocation records and the end-of-run summary
//! - Orchestrator: the fixed 11-step phase sequence
//! - Workload: the AS3AP work units, schema strings and restore strategies
//! - Fixture: schema creation and deterministic data population
//!
//! Orchestration never touches a driver. Connections come from the
//! `ConnectionProvider` handed to the orchestrator; the `sqlite` feature adds
//! one backed by `rusqlite`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod collector;
pub mod config;
pub mod fixture;
pub mod group;
pub mod orchestrator;
pub mod runner;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod testing;
pub mod workload;

pub use collector::{
    InvocationId, Outcome, ResultCollector, ResultRecord, Summary, UnitSummary,
    DEFAULT_RECORD_LIMIT, DETAIL_LIMIT,
};
pub use config::{BenchmarkConfig, DatabaseSection, FixtureSection, CONFIG_FILE_NAME};
pub use fixture::Fixture;
pub use group::ThreadGroup;
pub use orchestrator::{
    BackgroundMix, BenchmarkReport, Orchestrator, Phase, PhaseTiming, ThroughputSample,
};
pub use runner::{
    invoke, InvocationOutcome, RunContext, RunMode, RunnerHandle, RunnerId, RunnerStatus,
};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProvider;
pub use workload::{Query, QueryUnit, RestoreStrategy, Workload};
