//! The two-half multi-user protocol against the recording database

use crate::common::*;
use as3ap::{BackgroundMix, Orchestrator, Phase, Query, Workload};
use std::collections::HashSet;
use std::sync::Arc;

fn position(statements: &[String], from: usize, sql: &str) -> usize {
    statements[from..]
        .iter()
        .position(|s| s == sql)
        .map(|p| p + from)
        .unwrap_or_else(|| panic!("{} not executed after position {}", sql, from))
}

fn last_position(statements: &[String], sql: &str) -> usize {
    statements
        .iter()
        .rposition(|s| s == sql)
        .unwrap_or_else(|| panic!("{} never executed", sql))
}

/// Statements one foreground batch is expected to issue
fn cross_section_statements() -> Vec<String> {
    let mut expected = Vec::new();
    for query in Query::CROSS_SECTION {
        let repeats = if query == Query::Select1NonClustered { 3 } else { 1 };
        for _ in 0..repeats {
            expected.push(query.sql().to_string());
        }
    }
    expected
}

#[test]
fn statement_sequence_follows_the_protocol() {
    let db = RecordingDatabase::new();
    let config = fast_config();
    let report = Orchestrator::new(config.clone(), Arc::new(db.clone()))
        .run()
        .unwrap();
    assert!(!report.has_problems(), "{:?}", report.summary);

    let statements = executed_sql(&db.events());
    let ir = Query::IrSelect.sql();
    let oltp = Query::OltpUpdate.sql();
    let first_cross = Query::ModeTiny.sql();
    let check = Query::Check100Seq.sql();
    let reload = r#"INSERT INTO "updates" SELECT * FROM "saveupdates""#;
    let clear = r#"DELETE FROM "sel100seq""#;

    let ir_first = position(&statements, 0, ir);
    let cross_1 = position(&statements, ir_first, first_cross);
    let check_1 = position(&statements, cross_1, check);
    let restore = position(&statements, check_1, reload);
    let cleared = position(&statements, restore, clear);
    let oltp_first = position(&statements, cleared, oltp);
    let cross_2 = position(&statements, oltp_first, first_cross);
    let check_2 = position(&statements, cross_2, check);

    // Background load is drained before each consistency check
    assert!(last_position(&statements, ir) < check_1);
    assert!(last_position(&statements, oltp) < check_2);
    // No write load during the first half
    assert!(statements[..cleared].iter().all(|s| s != oltp));
    // The checks run exactly once per half
    assert_eq!(statements.iter().filter(|s| *s == check).count(), 2);
    assert!(check_2 > check_1);
}

#[test]
fn cross_section_is_one_deterministic_batch_per_half() {
    let db = RecordingDatabase::new();
    Orchestrator::new(fast_config(), Arc::new(db.clone()))
        .run()
        .unwrap();

    let events = db.events();
    let starters: Vec<u64> = events
        .iter()
        .filter(|e| matches!(&e.event, Event::Execute { sql, .. } if sql == Query::ModeTiny.sql()))
        .map(|e| e.connection)
        .collect();
    assert_eq!(starters.len(), 2);

    for connection in starters {
        let batch: Vec<String> = executed_sql(
            &events
                .iter()
                .filter(|e| e.connection == connection)
                .cloned()
                .collect::<Vec<_>>(),
        );
        assert_eq!(batch, cross_section_statements());
    }
}

#[test]
fn every_background_user_and_the_measuring_runner_issue_load() {
    let db = RecordingDatabase::new();
    let config = fast_config();
    Orchestrator::new(config.clone(), Arc::new(db.clone()))
        .run()
        .unwrap();

    let connections_running = |sql: &str| -> usize {
        db.events()
            .iter()
            .filter(|e| matches!(&e.event, Event::Execute { sql: s, .. } if s == sql))
            .map(|e| e.connection)
            .collect::<HashSet<u64>>()
            .len()
    };
    assert_eq!(connections_running(Query::IrSelect.sql()), config.user_count + 1);
    assert_eq!(connections_running(Query::OltpUpdate.sql()), config.user_count + 1);
    assert_eq!(db.open_connections(), 0);
}

#[test]
fn report_covers_every_phase_and_both_mixes() {
    let report = Orchestrator::new(fast_config(), Arc::new(RecordingDatabase::new()))
        .run()
        .unwrap();

    let phases: Vec<Phase> = report.phases.iter().map(|p| p.phase).collect();
    assert_eq!(phases, Phase::ALL.to_vec());
    let mixes: Vec<BackgroundMix> = report.throughput.iter().map(|s| s.mix).collect();
    assert_eq!(mixes, vec![BackgroundMix::InformationRetrieval, BackgroundMix::Oltp]);
    assert!(report.finished_at >= report.started_at);
}

#[test]
fn failed_check_is_reported_and_the_run_completes() {
    let db = RecordingDatabase::new();
    db.respond(
        Query::Check100Rand.sql(),
        Response::Rows(as3ap::RowSet::scalar("count", as3ap::SqlValue::Integer(7))),
    );
    let report = Orchestrator::new(fast_config(), Arc::new(db)).run().unwrap();

    let check = report.summary.unit("mu_checkmod_100_rand").unwrap();
    assert_eq!(check.failures, 2);
    assert!(check.details[0].contains("Should have no records, but reported 7."));
    assert_eq!(report.phases.len(), Phase::ALL.len());
    assert!(report.has_problems());
}

#[test]
fn transient_conflicts_in_background_are_tallied_not_failed() {
    let db = RecordingDatabase::new();
    db.fail(
        Query::OltpUpdate.sql(),
        WorkError::transient("update conflicts with concurrent update"),
    );
    let report = Orchestrator::new(fast_config(), Arc::new(db)).run().unwrap();

    assert!(!report.has_problems());
    let oltp = report.summary.unit("oltp_update").unwrap();
    assert_eq!(oltp.invocations, 0);
    assert!(oltp.transient_retries > 0);
    assert_eq!(report.throughput[1].completed, 0);
}

#[test]
fn custom_workload_units_are_driven_by_the_protocol() {
    let db = RecordingDatabase::new();
    let config = fast_config();
    let background = CountingUnit::new("custom_background");
    let shared: Arc<dyn WorkUnit> = background.clone();
    let cross: Arc<dyn WorkUnit> = CountingUnit::new("custom_cross");
    let mut workload = Workload::as3ap(&config);
    workload.ir_select = Arc::clone(&shared);
    workload.oltp_update = shared;
    workload.cross_section = vec![cross];

    let report = Orchestrator::new(config.clone(), Arc::new(db))
        .with_workload(workload)
        .run()
        .unwrap();

    assert!(background.calls() >= 2 * (config.user_count + 1));
    assert_eq!(report.summary.unit("custom_cross").unwrap().invocations, 2);
}

#[cfg(feature = "sqlite")]
mod sqlite {
    use super::*;
    use as3ap::{Fixture, SqliteProvider};
    use tempfile::TempDir;

    #[test]
    fn full_run_against_sqlite_is_consistent() {
        let dir = TempDir::new().unwrap();
        let mut config = fast_config();
        config.user_count = 2;
        config.inter_iteration_sleep_ms = 2;
        config.database.path = dir.path().join("as3ap.db");

        let provider = Arc::new(SqliteProvider::from_config(&config));
        let fixture = Fixture::new(provider.clone());
        fixture.create_schema().unwrap();
        fixture.populate(1200, 42).unwrap();

        let report = Orchestrator::new(config, provider).run().unwrap();
        assert!(!report.has_problems(), "{}", report.summary);
        assert!(report.throughput.iter().all(|s| s.completed > 0));
    }
}
