//! AS3AP multi-user queries as work units

use as3ap_core::{Connection, IsolationLevel, SqlValue, WorkError, WorkResult, WorkUnit};
use rand::Rng;
use serde::Serialize;

/// Default upper bound (exclusive) for random keys
pub const DEFAULT_KEY_RANGE: u32 = 10_000;

/// One query of the multi-user test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Information-retrieval single-row select by random key
    IrSelect,
    /// OLTP single-row increment by random key
    OltpUpdate,
    /// Scan of the one-row `tiny` relation
    ModeTiny,
    /// Scan of the first thousand `hundred` rows
    Mode100k,
    /// Select on the non-clustered `code` column, three times at varying isolation
    Select1NonClustered,
    /// Average over a join of `updates` and `hundred`
    SimpleReport,
    /// Copy keys 1001..=1100 into `sel100seq`
    Select100Seq,
    /// Copy `int` 1001..=1100 into `sel100rnd`
    Select100Rand,
    /// Add 100000000 to `double` for keys 1001..=1100
    Modify100Seq,
    /// Add 100000000 to `double` for `int` 1001..=1100
    Modify100Rand,
    /// Undo [`Query::Modify100Seq`]
    Unmodify100Seq,
    /// Undo [`Query::Modify100Rand`]
    Unmodify100Rand,
    /// Count `updates` rows that differ from `sel100seq`; must be 0
    Check100Seq,
    /// Count `updates` rows that differ from `sel100rnd`; must be 0
    Check100Rand,
}

impl Query {
    /// Every query
    pub const ALL: [Query; 14] = [
        Query::IrSelect,
        Query::OltpUpdate,
        Query::ModeTiny,
        Query::Mode100k,
        Query::Select1NonClustered,
        Query::SimpleReport,
        Query::Select100Seq,
        Query::Select100Rand,
        Query::Modify100Seq,
        Query::Modify100Rand,
        Query::Unmodify100Seq,
        Query::Unmodify100Rand,
        Query::Check100Seq,
        Query::Check100Rand,
    ];

    /// The cross-section batch, in execution order
    pub const CROSS_SECTION: [Query; 10] = [
        Query::ModeTiny,
        Query::Mode100k,
        Query::Select1NonClustered,
        Query::SimpleReport,
        Query::Select100Seq,
        Query::Select100Rand,
        Query::Modify100Seq,
        Query::Modify100Rand,
        Query::Unmodify100Seq,
        Query::Unmodify100Rand,
    ];

    /// The consistency checks, in execution order
    pub const CHECKS: [Query; 2] = [Query::Check100Seq, Query::Check100Rand];

    /// Work unit name used in reports
    pub fn name(self) -> &'static str {
        match self {
            Query::IrSelect => "ir_select",
            Query::OltpUpdate => "oltp_update",
            Query::ModeTiny => "o_mode_tiny",
            Query::Mode100k => "o_mode_100k",
            Query::Select1NonClustered => "sel_1_ncl",
            Query::SimpleReport => "agg_simple_report",
            Query::Select100Seq => "mu_sel_100_seq",
            Query::Select100Rand => "mu_sel_100_rand",
            Query::Modify100Seq => "mu_mod_100_seq",
            Query::Modify100Rand => "mu_mod_100_rand",
            Query::Unmodify100Seq => "mu_unmod_100_seq",
            Query::Unmodify100Rand => "mu_unmod_100_rand",
            Query::Check100Seq => "mu_checkmod_100_seq",
            Query::Check100Rand => "mu_checkmod_100_rand",
        }
    }

    /// Statement text
    pub fn sql(self) -> &'static str {
        match self {
            Query::IrSelect => {
                r#"SELECT "key", "code", "date", "signed", "name" FROM "updates" WHERE "key" = ?"#
            }
            Query::OltpUpdate => r#"UPDATE "updates" SET "signed" = "signed" + 1 WHERE "key" = ?"#,
            Query::ModeTiny => r#"SELECT "key" FROM "tiny""#,
            Query::Mode100k => {
                r#"SELECT "key", "int", "signed", "float", "double", "decim", "date", "code", "name", "address" FROM "hundred" WHERE "key" <= 1000"#
            }
            Query::Select1NonClustered => {
                r#"SELECT "key", "int", "signed", "code", "double", "name" FROM "updates" WHERE "code" = 'BENCHMARKS'"#
            }
            Query::SimpleReport => {
                r#"SELECT avg("updates"."decim") FROM "updates" WHERE "updates"."key" IN (SELECT "updates"."key" FROM "updates", "hundred" WHERE "hundred"."key" = "updates"."key" AND "updates"."decim" > 980000000)"#
            }
            Query::Select100Seq => {
                r#"INSERT INTO "sel100seq" SELECT * FROM "updates" WHERE "updates"."key" BETWEEN 1001 AND 1100"#
            }
            Query::Select100Rand => {
                r#"INSERT INTO "sel100rnd" SELECT * FROM "updates" WHERE "updates"."int" BETWEEN 1001 AND 1100"#
            }
            Query::Modify100Seq => {
                r#"UPDATE "updates" SET "double" = "double" + 100000000 WHERE "key" BETWEEN 1001 AND 1100"#
            }
            Query::Modify100Rand => {
                r#"UPDATE "updates" SET "double" = "double" + 100000000 WHERE "int" BETWEEN 1001 AND 1100"#
            }
            Query::Unmodify100Seq => {
                r#"UPDATE "updates" SET "double" = "double" - 100000000 WHERE "key" BETWEEN 1001 AND 1100"#
            }
            Query::Unmodify100Rand => {
                r#"UPDATE "updates" SET "double" = "double" - 100000000 WHERE "int" BETWEEN 1001 AND 1100"#
            }
            Query::Check100Seq => {
                r#"SELECT count(*) FROM "updates", "sel100seq" WHERE "updates"."key" = "sel100seq"."key" AND NOT "updates"."double" = "sel100seq"."double""#
            }
            Query::Check100Rand => {
                r#"SELECT count(*) FROM "updates", "sel100rnd" WHERE "updates"."key" = "sel100rnd"."key" AND NOT "updates"."double" = "sel100rnd"."double""#
            }
        }
    }

    /// Isolation level set before the statement runs
    pub fn isolation(self) -> IsolationLevel {
        match self {
            Query::Mode100k | Query::SimpleReport => IsolationLevel::ReadCommitted,
            _ => IsolationLevel::RepeatableRead,
        }
    }

    /// True for queries drawing a random key
    pub fn takes_key(self) -> bool {
        matches!(self, Query::IrSelect | Query::OltpUpdate)
    }

    /// True for the consistency checks
    pub fn is_check(self) -> bool {
        matches!(self, Query::Check100Seq | Query::Check100Rand)
    }
}

/// A [`Query`] bound to a key range, usable as a [`WorkUnit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryUnit {
    query: Query,
    key_range: u32,
}

impl QueryUnit {
    /// Unit with the default key range
    pub fn new(query: Query) -> Self {
        Self::with_key_range(query, DEFAULT_KEY_RANGE)
    }

    /// Unit drawing keys from `[0, key_range)`
    pub fn with_key_range(query: Query, key_range: u32) -> Self {
        Self { query, key_range }
    }

    /// Wrapped query
    pub fn query(&self) -> Query {
        self.query
    }

    fn random_key(&self) -> SqlValue {
        let key = rand::thread_rng().gen_range(0..self.key_range.max(1));
        SqlValue::from(key)
    }

    fn check(&self, conn: &mut dyn Connection) -> WorkResult<()> {
        let rows = conn.execute(self.query.sql(), &[])?;
        let count = rows
            .scalar_i64()
            .ok_or_else(|| WorkError::assertion("Should have at least one row."))?;
        if count != 0 {
            return Err(WorkError::assertion(format!(
                "Should have no records, but reported {}.",
                count
            )));
        }
        Ok(())
    }
}

impl WorkUnit for QueryUnit {
    fn name(&self) -> &str {
        self.query.name()
    }

    fn execute(&self, conn: &mut dyn Connection) -> WorkResult<()> {
        match self.query {
            Query::Select1NonClustered => {
                for level in [
                    IsolationLevel::ReadCommitted,
                    IsolationLevel::ReadCommitted,
                    IsolationLevel::RepeatableRead,
                ] {
                    conn.set_isolation_level(level)?;
                    conn.execute(self.query.sql(), &[])?;
                }
                Ok(())
            }
            query => {
                conn.set_isolation_level(query.isolation())?;
                if query.is_check() {
                    return self.check(conn);
                }
                if query.takes_key() {
                    conn.execute(query.sql(), &[self.random_key()])?;
                } else {
                    conn.execute(query.sql(), &[])?;
                }
                Ok(())
            }
        }
    }
}
