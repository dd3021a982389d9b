//! Restoring `updates` between the two halves

use crate::common::*;
use as3ap::Orchestrator;
use std::sync::Arc;

fn restore_statements(recreate: bool) -> Vec<String> {
    let db = RecordingDatabase::new();
    let config = BenchmarkConfig {
        recreate_table_on_cleanup: recreate,
        ..fast_config()
    };
    let report = Orchestrator::new(config, Arc::new(db.clone())).run().unwrap();
    assert_eq!(report.summary.unit("mu_restore_updates").unwrap().invocations, 1);

    executed_sql(&db.events())
        .into_iter()
        .filter(|s| {
            s.contains(r#""updates""#) && !s.starts_with("SELECT") && !s.starts_with("UPDATE")
        })
        .filter(|s| !s.starts_with(r#"INSERT INTO "sel100"#))
        .collect()
}

#[test]
fn delete_and_reload_by_default() {
    let statements = restore_statements(false);
    assert_eq!(
        statements,
        vec![
            r#"DELETE FROM "updates""#.to_string(),
            r#"INSERT INTO "updates" SELECT * FROM "saveupdates""#.to_string(),
        ]
    );
}

#[test]
fn drop_and_recreate_when_configured() {
    let statements = restore_statements(true);
    assert_eq!(statements.len(), 3);
    assert_eq!(statements[0], r#"DROP TABLE "updates""#);
    assert!(statements[1].starts_with(r#"CREATE TABLE "updates""#));
    assert_eq!(statements[2], r#"INSERT INTO "updates" SELECT * FROM "saveupdates""#);
}

#[test]
fn staging_is_cleared_after_restore() {
    let db = RecordingDatabase::new();
    Orchestrator::new(fast_config(), Arc::new(db.clone())).run().unwrap();

    let statements = executed_sql(&db.events());
    let reload = statements
        .iter()
        .position(|s| s == r#"INSERT INTO "updates" SELECT * FROM "saveupdates""#)
        .unwrap();
    let seq = statements
        .iter()
        .position(|s| s == r#"DELETE FROM "sel100seq""#)
        .unwrap();
    let rnd = statements
        .iter()
        .position(|s| s == r#"DELETE FROM "sel100rnd""#)
        .unwrap();
    assert!(reload < seq && seq < rnd);
}

#[test]
fn failed_restore_is_an_error_not_an_abort() {
    let db = RecordingDatabase::new();
    db.fail(
        r#"SELECT * FROM "saveupdates""#,
        WorkError::fatal("no such table: saveupdates"),
    );
    let report = Orchestrator::new(fast_config(), Arc::new(db.clone())).run().unwrap();

    assert_eq!(report.summary.unit("mu_restore_updates").unwrap().errors, 1);
    assert_eq!(report.phases.len(), 11);
    assert!(db
        .events()
        .iter()
        .any(|e| e.event == Event::Rollback));
}
