//! Schema creation and deterministic data population
//!
//! The generated `updates` relation follows the AS3AP column domains closely
//! enough for the multi-user queries to touch the intended number of rows:
//! `key` is dense from 0, `int` is a permutation of the keys, `double` holds
//! integer values so the modify/unmodify pair restores them exactly, and
//! exactly one row carries the code `BENCHMARKS`.

use crate::workload::schema;
use as3ap_core::{transaction, BenchError, BenchResult, Connection, ConnectionProvider, SqlValue};
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::info;

/// Code value selected by `sel_1_ncl`
pub const BENCHMARKS_CODE: &str = "BENCHMARKS";

const LETTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Creates and fills the AS3AP relations through a [`ConnectionProvider`]
pub struct Fixture {
    provider: Arc<dyn ConnectionProvider>,
}

impl Fixture {
    /// Fixture writing through `provider`
    pub fn new(provider: Arc<dyn ConnectionProvider>) -> Self {
        Self { provider }
    }

    /// Create all six relations in one transaction
    pub fn create_schema(&self) -> BenchResult<()> {
        self.with_connection(|conn| {
            transaction(conn, |tx| {
                for ddl in schema::CREATE_ALL {
                    tx.execute(ddl, &[])?;
                }
                Ok(())
            })
            .map_err(BenchError::Setup)
        })?;
        info!(target: "as3ap::fixture", relations = schema::CREATE_ALL.len(), "schema created");
        Ok(())
    }

    /// Insert `rows` generated rows into `updates`, then derive `hundred`,
    /// `tiny` and the `saveupdates` backup. One transaction.
    pub fn populate(&self, rows: u32, seed: u64) -> BenchResult<()> {
        let data = Self::generate_rows(rows, seed);
        self.with_connection(|conn| {
            transaction(conn, |tx| {
                for row in &data {
                    tx.execute(schema::INSERT_UPDATES, row)?;
                }
                tx.execute(schema::FILL_HUNDRED, &[])?;
                tx.execute(schema::FILL_TINY, &[])?;
                tx.execute(schema::BACKUP_UPDATES, &[])?;
                Ok(())
            })
            .map_err(BenchError::Setup)
        })?;
        info!(target: "as3ap::fixture", rows, seed, "relations populated");
        Ok(())
    }

    /// The `updates` rows for `rows` and `seed`, in column order.
    ///
    /// The same arguments always produce the same rows.
    pub fn generate_rows(rows: u32, seed: u64) -> Vec<Vec<SqlValue>> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut ints: Vec<u32> = (0..rows).collect();
        ints.shuffle(&mut rng);
        let benchmarks_row = if rows > 0 { rng.gen_range(0..rows) } else { 0 };

        let base = NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or_default();

        (0..rows)
            .map(|key| {
                let date = base + ChronoDuration::days(rng.gen_range(0..36_500));
                let seconds = rng.gen_range(0..86_400);
                let time =
                    NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0).unwrap_or_default();
                let code = if key == benchmarks_row {
                    BENCHMARKS_CODE.to_string()
                } else {
                    random_code(&mut rng)
                };
                let address_len = rng.gen_range(20..=80);

                vec![
                    SqlValue::from(key),
                    SqlValue::from(ints[key as usize]),
                    SqlValue::Integer(rng.gen_range(-100_000_000..100_000_000)),
                    SqlValue::Real(rng.gen_range(-500_000_000.0..500_000_000.0)),
                    SqlValue::Real(rng.gen_range(-1_000_000_000i64..1_000_000_000) as f64),
                    SqlValue::Real(
                        (rng.gen_range(0.0..1_000_000_000.0f64) * 100.0).round() / 100.0,
                    ),
                    SqlValue::Text(date.and_time(time).format("%Y-%m-%d %H:%M:%S").to_string()),
                    SqlValue::Text(code),
                    SqlValue::Text(random_text(&mut rng, 20)),
                    SqlValue::Text(random_text(&mut rng, address_len)),
                ]
            })
            .collect()
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut dyn Connection) -> BenchResult<T>,
    ) -> BenchResult<T> {
        let mut conn = self.provider.acquire().map_err(BenchError::Connection)?;
        let result = f(conn.as_mut());
        self.provider.release(conn);
        result
    }
}

fn random_text(rng: &mut StdRng, len: usize) -> String {
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

fn random_code(rng: &mut StdRng) -> String {
    loop {
        let code = random_text(rng, 10);
        if code != BENCHMARKS_CODE {
            return code;
        }
    }
}
