//! Restoring `updates` and clearing the staging relations
//!
//! The cross-section copies 200 rows into the staging relations and modifies
//! and unmodifies 200 rows of `updates`. Before the second half of the
//! protocol both are put back: `updates` from its `saveupdates` backup, the
//! staging relations emptied. Each unit runs as one transaction.

use super::schema;
use as3ap_core::{transaction, Connection, IsolationLevel, WorkResult, WorkUnit};
use serde::{Deserialize, Serialize};

/// How `updates` is restored from `saveupdates`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStrategy {
    /// `DELETE` all rows, then reload from the backup
    DeleteAndReload,
    /// `DROP` and `CREATE` the relation, then reload from the backup
    DropAndRecreate,
}

const DELETE_UPDATES: &str = r#"DELETE FROM "updates""#;
const RELOAD_UPDATES: &str = r#"INSERT INTO "updates" SELECT * FROM "saveupdates""#;

const DELETE_AND_RELOAD: [&str; 2] = [DELETE_UPDATES, RELOAD_UPDATES];
const DROP_AND_RECREATE: [&str; 3] = [schema::DROP_UPDATES, schema::CREATE_UPDATES, RELOAD_UPDATES];

impl RestoreStrategy {
    /// Statements executed, in order
    pub fn statements(self) -> &'static [&'static str] {
        match self {
            RestoreStrategy::DeleteAndReload => &DELETE_AND_RELOAD,
            RestoreStrategy::DropAndRecreate => &DROP_AND_RECREATE,
        }
    }
}

/// Work unit restoring `updates` with a [`RestoreStrategy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreUpdates {
    strategy: RestoreStrategy,
}

impl RestoreUpdates {
    /// Unit name in reports
    pub const NAME: &'static str = "mu_restore_updates";

    /// Restore with `strategy`
    pub fn new(strategy: RestoreStrategy) -> Self {
        Self { strategy }
    }

    /// Configured strategy
    pub fn strategy(&self) -> RestoreStrategy {
        self.strategy
    }
}

impl WorkUnit for RestoreUpdates {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn execute(&self, conn: &mut dyn Connection) -> WorkResult<()> {
        conn.set_isolation_level(IsolationLevel::ReadCommitted)?;
        transaction(conn, |tx| {
            for sql in self.strategy.statements() {
                tx.execute(sql, &[])?;
            }
            Ok(())
        })
    }
}

/// Work unit emptying `sel100seq` and `sel100rnd`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearStaging;

impl ClearStaging {
    /// Unit name in reports
    pub const NAME: &'static str = "mu_clear_staging";

    /// Statements executed, in order
    pub const STATEMENTS: [&'static str; 2] =
        [r#"DELETE FROM "sel100seq""#, r#"DELETE FROM "sel100rnd""#];
}

impl WorkUnit for ClearStaging {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn execute(&self, conn: &mut dyn Connection) -> WorkResult<()> {
        conn.set_isolation_level(IsolationLevel::ReadCommitted)?;
        transaction(conn, |tx| {
            for sql in Self::STATEMENTS {
                tx.execute(sql, &[])?;
            }
            Ok(())
        })
    }
}
