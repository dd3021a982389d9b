//! The AS3AP multi-user workload
//!
//! - `schema`: relation names and DDL, consumed as opaque statement text
//! - `units`: the IR / OLTP background queries, the cross-section and the checks
//! - `restore`: repairing `updates` and emptying the staging relations

pub mod restore;
pub mod schema;
pub mod units;

pub use restore::{ClearStaging, RestoreStrategy, RestoreUpdates};
pub use units::{Query, QueryUnit, DEFAULT_KEY_RANGE};

use crate::config::BenchmarkConfig;
use as3ap_core::WorkUnit;
use std::sync::Arc;

/// Every work unit the orchestrator runs, grouped by protocol role.
///
/// Tests substitute individual units to script failures.
#[derive(Clone)]
pub struct Workload {
    /// Background unit of the first half
    pub ir_select: Arc<dyn WorkUnit>,
    /// Background unit of the second half
    pub oltp_update: Arc<dyn WorkUnit>,
    /// Units run once each, in order, while background load is live
    pub cross_section: Vec<Arc<dyn WorkUnit>>,
    /// Consistency checks run after the background load drained
    pub checks: Vec<Arc<dyn WorkUnit>>,
    /// Repairs `updates` after the first half
    pub restore: Arc<dyn WorkUnit>,
    /// Empties the staging relations after the first half
    pub clear_staging: Arc<dyn WorkUnit>,
}

impl Workload {
    /// The standard AS3AP workload for `config`
    pub fn as3ap(config: &BenchmarkConfig) -> Self {
        let unit = |q: Query| -> Arc<dyn WorkUnit> {
            Arc::new(QueryUnit::with_key_range(q, config.key_range))
        };
        Self {
            ir_select: unit(Query::IrSelect),
            oltp_update: unit(Query::OltpUpdate),
            cross_section: Query::CROSS_SECTION.iter().map(|&q| unit(q)).collect(),
            checks: Query::CHECKS.iter().map(|&q| unit(q)).collect(),
            restore: Arc::new(RestoreUpdates::new(config.restore_strategy())),
            clear_staging: Arc::new(ClearStaging),
        }
    }
}
