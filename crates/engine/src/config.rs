//! Benchmark configuration via `as3ap.toml`
//!
//! Every field has a default, so an empty file is a valid configuration.
//! `as3ap init` writes the commented default file; edit it and rerun.

use crate::workload::RestoreStrategy;
use as3ap_core::{BenchError, BenchResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "as3ap.toml";

fn default_user_count() -> usize {
    10
}

fn default_key_range() -> u32 {
    10_000
}

fn default_background_duration_ms() -> u64 {
    15 * 60 * 1000
}

fn default_performance_duration_ms() -> u64 {
    5 * 60 * 1000
}

fn default_await_timeout_ms() -> u64 {
    60 * 1000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("as3ap.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

fn default_fixture_rows() -> u32 {
    10_000
}

fn default_fixture_seed() -> u64 {
    42
}

/// `[database]` section: where the SQLite adapter keeps its data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// Database file
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
    /// How long a statement waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// `[fixture]` section: size and seed of the generated dataset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSection {
    /// Rows in the `updates` relation
    #[serde(default = "default_fixture_rows")]
    pub rows: u32,
    /// Random seed; the same seed yields the same dataset
    #[serde(default = "default_fixture_seed")]
    pub seed: u64,
}

impl Default for FixtureSection {
    fn default() -> Self {
        Self {
            rows: default_fixture_rows(),
            seed: default_fixture_seed(),
        }
    }
}

/// Benchmark configuration loaded from `as3ap.toml`.
///
/// # Example
///
/// ```toml
/// user_count = 10
/// background_duration_ms = 900000
/// performance_duration_ms = 300000
///
/// [database]
/// path = "as3ap.db"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Concurrent background users per workload
    #[serde(default = "default_user_count")]
    pub user_count: usize,
    /// Upper bound (exclusive) of the random keys drawn by IR and OLTP units
    #[serde(default = "default_key_range")]
    pub key_range: u32,
    /// How long background load runs before the measurement starts
    #[serde(default = "default_background_duration_ms")]
    pub background_duration_ms: u64,
    /// Length of each throughput measurement
    #[serde(default = "default_performance_duration_ms")]
    pub performance_duration_ms: u64,
    /// Pause between two invocations of a repeating runner; 0 disables it
    #[serde(default)]
    pub inter_iteration_sleep_ms: u64,
    /// Restore `updates` by drop-and-recreate instead of delete-and-reload
    #[serde(default)]
    pub recreate_table_on_cleanup: bool,
    /// Upper bound on every wait for a thread group
    #[serde(default = "default_await_timeout_ms")]
    pub await_timeout_ms: u64,
    /// Database location
    #[serde(default)]
    pub database: DatabaseSection,
    /// Generated dataset
    #[serde(default)]
    pub fixture: FixtureSection,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            user_count: default_user_count(),
            key_range: default_key_range(),
            background_duration_ms: default_background_duration_ms(),
            performance_duration_ms: default_performance_duration_ms(),
            inter_iteration_sleep_ms: 0,
            recreate_table_on_cleanup: false,
            await_timeout_ms: default_await_timeout_ms(),
            database: DatabaseSection::default(),
            fixture: FixtureSection::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# AS3AP multi-user benchmark configuration

# Concurrent background users per workload (default: 10)
user_count = 10

# Random keys are drawn from [0, key_range) (default: 10000)
key_range = 10000

# Background load before each measurement, in ms (default: 15 minutes)
background_duration_ms = 900000

# Length of each throughput measurement, in ms (default: 5 minutes)
performance_duration_ms = 300000

# Pause between two invocations of a repeating runner, in ms (default: 0)
inter_iteration_sleep_ms = 0

# Restore the updates relation with DROP + CREATE instead of DELETE (default: false)
recreate_table_on_cleanup = false

# Upper bound on every wait for a thread group, in ms (default: 60000)
await_timeout_ms = 60000

[database]
path = "as3ap.db"
busy_timeout_ms = 5000

[fixture]
rows = 10000
seed = 42
"#
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> BenchResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BenchError::Config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: BenchmarkConfig = toml::from_str(&content).map_err(|e| {
            BenchError::Config(format!(
                "failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    ///
    /// Returns true if the file was created.
    pub fn write_default_if_missing(path: &Path) -> BenchResult<bool> {
        if path.exists() {
            return Ok(false);
        }
        std::fs::write(path, Self::default_toml())?;
        Ok(true)
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> BenchResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BenchError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the protocol cannot run with
    pub fn validate(&self) -> BenchResult<()> {
        if self.user_count == 0 {
            return Err(BenchError::Config(
                "user_count must be at least 1: the cross-section replaces one background user"
                    .into(),
            ));
        }
        if self.key_range == 0 {
            return Err(BenchError::Config("key_range must be at least 1".into()));
        }
        if self.await_timeout_ms == 0 {
            return Err(BenchError::Config("await_timeout_ms must be positive".into()));
        }
        if self.fixture.rows == 0 {
            return Err(BenchError::Config("fixture.rows must be at least 1".into()));
        }
        Ok(())
    }

    /// Background load duration
    pub fn background_duration(&self) -> Duration {
        Duration::from_millis(self.background_duration_ms)
    }

    /// Measurement duration
    pub fn performance_duration(&self) -> Duration {
        Duration::from_millis(self.performance_duration_ms)
    }

    /// Pause between invocations
    pub fn inter_iteration_sleep(&self) -> Duration {
        Duration::from_millis(self.inter_iteration_sleep_ms)
    }

    /// Thread group await bound
    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.await_timeout_ms)
    }

    /// SQLite busy timeout
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    /// Restore strategy selected by `recreate_table_on_cleanup`
    pub fn restore_strategy(&self) -> RestoreStrategy {
        if self.recreate_table_on_cleanup {
            RestoreStrategy::DropAndRecreate
        } else {
            RestoreStrategy::DeleteAndReload
        }
    }
}
