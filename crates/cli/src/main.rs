//! `as3ap`: driver for the AS3AP multi-user benchmark.
//!
//! - `as3ap init`: write the default `as3ap.toml`
//! - `as3ap setup`: create and populate the SQLite benchmark database
//! - `as3ap run`: execute the multi-user test and print the report
//!
//! Exit codes: 0 clean run, 1 run completed with failures or errors (or a
//! configuration/setup error), 2 run aborted by an orchestration error.

mod commands;
mod format;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use as3ap_core::{BenchError, BenchResult};
use as3ap_engine::{BenchmarkConfig, Fixture, Orchestrator, SqliteProvider};
use clap::ArgMatches;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use commands::{apply_overrides, build_cli, config_path};
use format::{format_error, format_init, format_report, format_setup, OutputMode};

const EXIT_CLEAN: i32 = 0;
const EXIT_PROBLEMS: i32 = 1;
const EXIT_ABORTED: i32 = 2;

fn main() {
    let matches = build_cli().get_matches();

    init_logging(matches.get_flag("verbose"));

    let mode = if matches.get_flag("json") {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let result = match matches.subcommand() {
        Some(("init", sub)) => run_init(&matches, sub, mode),
        Some(("setup", sub)) => run_setup(&matches, sub, mode),
        Some(("run", sub)) => run_benchmark(&matches, sub, mode),
        _ => Err(BenchError::InvalidState("no subcommand given".into())),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            exit_code_for(&e)
        }
    };
    process::exit(code);
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // Logs go to stderr so `--json` output on stdout stays parseable
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn exit_code_for(err: &BenchError) -> i32 {
    if err.is_orchestration() {
        EXIT_ABORTED
    } else {
        EXIT_PROBLEMS
    }
}

/// Config from `--config` if the file exists, defaults otherwise, with flag overrides applied
fn load_config(matches: &ArgMatches, sub: &ArgMatches) -> BenchResult<BenchmarkConfig> {
    let path = config_path(matches);
    let mut config = if path.exists() {
        debug!(target: "as3ap::cli", path = %path.display(), "loading configuration");
        BenchmarkConfig::from_file(&path)?
    } else {
        debug!(
            target: "as3ap::cli",
            path = %path.display(),
            "no configuration file, using defaults"
        );
        BenchmarkConfig::default()
    };
    apply_overrides(&mut config, matches, sub);
    config.validate()?;
    Ok(config)
}

fn run_init(matches: &ArgMatches, sub: &ArgMatches, mode: OutputMode) -> BenchResult<i32> {
    let path = config_path(matches);
    let written = if sub.get_flag("force") {
        std::fs::write(&path, BenchmarkConfig::default_toml())?;
        true
    } else {
        BenchmarkConfig::write_default_if_missing(&path)?
    };
    println!("{}", format_init(&path, written, mode));
    Ok(EXIT_CLEAN)
}

fn run_setup(matches: &ArgMatches, sub: &ArgMatches, mode: OutputMode) -> BenchResult<i32> {
    let config = load_config(matches, sub)?;
    let db_path = config.database.path.clone();

    if db_path.exists() {
        if !sub.get_flag("force") {
            return Err(BenchError::Config(format!(
                "database '{}' already exists (use --force to recreate it)",
                db_path.display()
            )));
        }
        remove_database(&db_path)?;
    }

    let fixture = Fixture::new(Arc::new(SqliteProvider::from_config(&config)));
    fixture.create_schema()?;
    fixture.populate(config.fixture.rows, config.fixture.seed)?;

    println!(
        "{}",
        format_setup(&db_path, config.fixture.rows, config.fixture.seed, mode)
    );
    Ok(EXIT_CLEAN)
}

fn run_benchmark(matches: &ArgMatches, sub: &ArgMatches, mode: OutputMode) -> BenchResult<i32> {
    let config = load_config(matches, sub)?;
    if !config.database.path.exists() {
        return Err(BenchError::Config(format!(
            "database '{}' not found (run `as3ap setup` first)",
            config.database.path.display()
        )));
    }

    let provider = Arc::new(SqliteProvider::from_config(&config));
    let report = Orchestrator::new(config, provider).run()?;

    println!("{}", format_report(&report, mode));
    if report.has_problems() {
        info!(
            target: "as3ap::cli",
            problems = report.summary.problem_count(),
            "run completed with problems"
        );
        Ok(EXIT_PROBLEMS)
    } else {
        Ok(EXIT_CLEAN)
    }
}

/// Delete the database file and its WAL companions
fn remove_database(path: &Path) -> BenchResult<()> {
    std::fs::remove_file(path)?;
    for suffix in ["-wal", "-shm"] {
        let mut companion = path.as_os_str().to_owned();
        companion.push(suffix);
        let companion = PathBuf::from(companion);
        if companion.exists() {
            std::fs::remove_file(&companion)?;
        }
    }
    debug!(target: "as3ap::cli", path = %path.display(), "removed existing database");
    Ok(())
}
