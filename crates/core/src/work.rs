//! Work units
//!
//! A work unit is one named database operation that a runner may execute many
//! times. Whether it runs once, in the background until cancelled, or for a
//! fixed measurement window is decided by the runner mode, not by the unit.

use crate::connection::Connection;
use crate::error::WorkResult;
use std::fmt;

/// One named, repeatable unit of database work.
///
/// Implementations must be immutable once constructed: the same unit is
/// shared by every runner of a thread group and invoked concurrently, each
/// time with that runner's own connection.
pub trait WorkUnit: Send + Sync {
    /// Name used for result aggregation
    fn name(&self) -> &str;

    /// Perform one invocation.
    ///
    /// Lock conflicts must surface as `WorkError::Transient`, failed
    /// consistency checks as `WorkError::Assertion`.
    fn execute(&self, connection: &mut dyn Connection) -> WorkResult<()>;
}

/// Work unit backed by a closure
pub struct FnWorkUnit<F> {
    name: String,
    f: F,
}

impl<F> FnWorkUnit<F>
where
    F: Fn(&mut dyn Connection) -> WorkResult<()> + Send + Sync,
{
    /// Wrap `f` under `name`
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> WorkUnit for FnWorkUnit<F>
where
    F: Fn(&mut dyn Connection) -> WorkResult<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute(&self, connection: &mut dyn Connection) -> WorkResult<()> {
        (self.f)(connection)
    }
}

impl<F> fmt::Debug for FnWorkUnit<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnWorkUnit").field("name", &self.name).finish()
    }
}
