//! Multi-user protocol integration suite
//!
//! - supervisor: thread group start/cancel/await semantics
//! - runner: run modes, transient handling, interruptible sleep
//! - protocol: the full 11-step run against the recording database
//! - restore: both restore strategies through the orchestrator

#[path = "../common/mod.rs"]
mod common;

mod protocol;
mod restore;
mod runner;
mod supervisor;
