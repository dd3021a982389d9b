//! AS3AP multi-user database benchmark
//!
//! Drives the AS3AP multi-user protocol: a pool of background users hammers
//! the database with information-retrieval or OLTP queries while a foreground
//! runner measures throughput and a cross-section of mixed reads and writes
//! runs once under contention.
//!
//! # Quick Start
//!
//! ```ignore
//! use as3ap::{BenchmarkConfig, Orchestrator, SqliteProvider};
//! use std::sync::Arc;
//!
//! let config = BenchmarkConfig::from_file("as3ap.toml".as_ref())?;
//! let provider = Arc::new(SqliteProvider::from_config(&config));
//! let report = Orchestrator::new(config, provider).run()?;
//! report.write_text(&mut std::io::stdout())?;
//! ```
//!
//! # Architecture
//!
//! - `as3ap-core`: errors, the `Connection` / `ConnectionProvider` seam and `WorkUnit`
//! - `as3ap-engine`: runners, thread groups, the collector, the orchestrator
//!   and the AS3AP workload
//!
//! Any driver can be plugged in by implementing `ConnectionProvider`.

pub use as3ap_core::*;
pub use as3ap_engine::*;
