//! Report and error → human/json string formatting.
//!
//! - **Human** (default): the plain-text benchmark report
//! - **JSON** (`--json`): `serde_json::to_string_pretty`

use as3ap_core::BenchError;
use as3ap_engine::BenchmarkReport;
use std::path::Path;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

/// Format a finished benchmark report.
pub fn format_report(report: &BenchmarkReport, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => report
            .to_json()
            .unwrap_or_else(|e| json_error(&format!("failed to serialize report: {}", e))),
        OutputMode::Human => {
            let mut buf = Vec::new();
            match report.write_text(&mut buf) {
                Ok(()) => String::from_utf8_lossy(&buf).trim_end().to_string(),
                Err(e) => format!("(error) failed to render report: {}", e),
            }
        }
    }
}

/// Format an error that ended a command.
pub fn format_error(err: &BenchError, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => json_error(&err.to_string()),
        OutputMode::Human => format!("(error) {}", err),
    }
}

/// Format the result of `init`.
pub fn format_init(path: &Path, written: bool, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_pretty(&serde_json::json!({
            "config": path.display().to_string(),
            "written": written,
        })),
        OutputMode::Human if written => format!("Wrote {}", path.display()),
        OutputMode::Human => {
            format!("{} already exists (use --force to overwrite)", path.display())
        }
    }
}

/// Format the result of `setup`.
pub fn format_setup(path: &Path, rows: u32, seed: u64, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => to_pretty(&serde_json::json!({
            "database": path.display().to_string(),
            "rows": rows,
            "seed": seed,
        })),
        OutputMode::Human => format!(
            "Created {} with {} rows (seed {})",
            path.display(),
            rows,
            seed
        ),
    }
}

fn json_error(message: &str) -> String {
    to_pretty(&serde_json::json!({ "error": message }))
}

fn to_pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
