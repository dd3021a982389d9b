//! Clap command tree and flag overrides.

use as3ap_engine::{BenchmarkConfig, CONFIG_FILE_NAME};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("as3ap")
        .about("AS3AP multi-user database benchmark")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Configuration file (default: as3ap.toml)")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("db")
                .long("db")
                .help("SQLite database path, overrides [database] path")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Debug logging (RUST_LOG takes precedence)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(build_init())
        .subcommand(build_setup())
        .subcommand(build_run())
}

fn build_init() -> Command {
    Command::new("init")
        .about("Write the default configuration file")
        .arg(
            Arg::new("force")
                .long("force")
                .help("Overwrite an existing file")
                .action(ArgAction::SetTrue),
        )
}

fn build_setup() -> Command {
    Command::new("setup")
        .about("Create and populate the benchmark database")
        .arg(
            Arg::new("rows")
                .long("rows")
                .help("Rows generated into the updates relation")
                .value_parser(value_parser!(u32)),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .help("Random seed for data generation")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("force")
                .long("force")
                .help("Delete an existing database first")
                .action(ArgAction::SetTrue),
        )
}

fn build_run() -> Command {
    Command::new("run")
        .about("Execute the multi-user test")
        .arg(
            Arg::new("users")
                .long("users")
                .help("Concurrent background users")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("bg-duration-ms")
                .long("bg-duration-ms")
                .help("Background warm-up before each measurement")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("perf-duration-ms")
                .long("perf-duration-ms")
                .help("Length of each throughput measurement")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("sleep-ms")
                .long("sleep-ms")
                .help("Pause between iterations of a repeating runner")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("await-timeout-ms")
                .long("await-timeout-ms")
                .help("Bound on waiting for a thread group to finish")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("recreate-table")
                .long("recreate-table")
                .help("Restore updates by DROP and CREATE instead of DELETE")
                .action(ArgAction::SetTrue),
        )
}

/// Path of the configuration file named by `--config`
pub fn config_path(matches: &ArgMatches) -> PathBuf {
    matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// Apply the global and subcommand flags present in `matches` to `config`.
///
/// `sub` is the subcommand's own matches; flags it does not define are ignored.
pub fn apply_overrides(config: &mut BenchmarkConfig, matches: &ArgMatches, sub: &ArgMatches) {
    if let Some(db) = matches.get_one::<PathBuf>("db") {
        config.database.path = db.clone();
    }

    if let Ok(Some(rows)) = sub.try_get_one::<u32>("rows") {
        config.fixture.rows = *rows;
    }
    if let Ok(Some(seed)) = sub.try_get_one::<u64>("seed") {
        config.fixture.seed = *seed;
    }

    if let Ok(Some(users)) = sub.try_get_one::<usize>("users") {
        config.user_count = *users;
    }
    if let Ok(Some(ms)) = sub.try_get_one::<u64>("bg-duration-ms") {
        config.background_duration_ms = *ms;
    }
    if let Ok(Some(ms)) = sub.try_get_one::<u64>("perf-duration-ms") {
        config.performance_duration_ms = *ms;
    }
    if let Ok(Some(ms)) = sub.try_get_one::<u64>("sleep-ms") {
        config.inter_iteration_sleep_ms = *ms;
    }
    if let Ok(Some(ms)) = sub.try_get_one::<u64>("await-timeout-ms") {
        config.await_timeout_ms = *ms;
    }
    if let Ok(Some(&true)) = sub.try_get_one::<bool>("recreate-table") {
        config.recreate_table_on_cleanup = true;
    }
}
