//! Thread group supervision

use crate::common::*;
use as3ap::RunnerStatus;
use proptest::prelude::*;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[test]
fn cancel_right_after_start_runs_every_member_at_least_once() {
    let db = RecordingDatabase::new();
    let (ctx, collector) = recording_context(&db);
    let group = ThreadGroup::new("scenario-a", ctx);
    for name in ["unit_a", "unit_b", "unit_c"] {
        group
            .add_member(CountingUnit::new(name), RunMode::UntilCancelled)
            .unwrap();
    }

    group.start_all().unwrap();
    group.cancel_all();
    group.await_all(AWAIT).unwrap();

    let summary = collector.summarize();
    assert_eq!(summary.units.len(), 3);
    for name in ["unit_a", "unit_b", "unit_c"] {
        let unit = summary.unit(name).unwrap();
        assert!(unit.invocations >= 1, "{} never ran", name);
        assert_eq!(unit.failures, 0);
        assert_eq!(unit.errors, 0);
    }
    assert_eq!(group.active_count(), 0);
    assert_eq!(db.open_connections(), 0);
}

#[test]
fn await_started_waits_for_every_member() {
    let db = RecordingDatabase::new();
    let (ctx, _) = recording_context(&db);
    let group = ThreadGroup::new("barrier", ctx.with_iteration_sleep(Duration::from_millis(5)));
    let unit: Arc<dyn WorkUnit> = CountingUnit::new("ir");
    let handles = group.add_members(&unit, RunMode::UntilCancelled, 4).unwrap();

    group.start_all().unwrap();
    group.await_started(AWAIT).unwrap();
    assert!(handles.iter().all(|h| h.status() != RunnerStatus::Idle));

    group.cancel_all();
    group.await_all(AWAIT).unwrap();
    assert!(handles.iter().all(RunnerHandle::is_finished));
}

#[test]
fn cancel_is_bounded_by_one_invocation() {
    let db = RecordingDatabase::new();
    let (ctx, _) = recording_context(&db);
    let group = ThreadGroup::new("bounded", ctx);
    let unit: Arc<dyn WorkUnit> = CountingUnit::sleeping("slow", Duration::from_millis(20));
    group.add_members(&unit, RunMode::UntilCancelled, 3).unwrap();

    group.start_all().unwrap();
    group.await_started(AWAIT).unwrap();
    let cancelled_at = Instant::now();
    group.cancel_all();
    group.await_all(AWAIT).unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_secs(2));
}

#[test]
fn await_timeout_reports_remaining_members() {
    let db = RecordingDatabase::new();
    let (ctx, _) = recording_context(&db);
    let group = ThreadGroup::new("stuck", ctx);
    group
        .add_member(CountingUnit::sleeping("slow", Duration::from_millis(400)), RunMode::Once)
        .unwrap();
    group
        .add_member(CountingUnit::new("fast"), RunMode::Once)
        .unwrap();

    group.start_all().unwrap();
    match group.await_all(Duration::from_millis(50)) {
        Err(BenchError::AwaitTimeout { group: name, remaining, .. }) => {
            assert_eq!(name, "stuck");
            assert_eq!(remaining, 1);
        }
        other => panic!("expected an await timeout, got {:?}", other),
    }

    // The slow member still finishes and the group can be awaited again
    group.await_all(AWAIT).unwrap();
    assert_eq!(group.active_count(), 0);
}

#[test]
fn lifecycle_misuse_is_invalid_state() {
    let db = RecordingDatabase::new();
    let (ctx, _) = recording_context(&db);
    let group = ThreadGroup::new("misuse", ctx);
    group.add_member(CountingUnit::new("u"), RunMode::Once).unwrap();

    assert!(matches!(group.await_all(AWAIT), Err(BenchError::InvalidState(_))));
    assert!(matches!(group.await_started(AWAIT), Err(BenchError::InvalidState(_))));

    group.start_all().unwrap();
    assert!(matches!(group.start_all(), Err(BenchError::InvalidState(_))));
    assert!(matches!(
        group.add_member(CountingUnit::new("late"), RunMode::Once),
        Err(BenchError::InvalidState(_))
    ));
    group.await_all(AWAIT).unwrap();
}

#[test]
fn empty_group_awaits_immediately() {
    let db = RecordingDatabase::new();
    let (ctx, _) = recording_context(&db);
    let group = ThreadGroup::new("empty", ctx);
    group.start_all().unwrap();
    group.await_started(AWAIT).unwrap();
    group.await_all(Duration::from_millis(10)).unwrap();
}

struct PanickingProvider;

impl ConnectionProvider for PanickingProvider {
    fn acquire(&self) -> WorkResult<Box<dyn Connection>> {
        panic!("driver blew up")
    }
}

#[test]
fn member_panicking_outside_its_unit_still_leaves_the_group() {
    let collector = Arc::new(ResultCollector::new());
    let ctx = RunContext::new(Arc::new(PanickingProvider), Arc::clone(&collector));
    let group = ThreadGroup::new("panics", ctx);
    let handle = group
        .add_member(CountingUnit::new("u"), RunMode::UntilCancelled)
        .unwrap();

    group.start_all().unwrap();
    group.await_all(AWAIT).unwrap();

    assert!(handle.is_finished());
    assert_eq!(group.active_count(), 0);
}

#[test]
fn dropping_a_group_cancels_its_members() {
    let db = RecordingDatabase::new();
    let (ctx, _) = recording_context(&db);
    let handle = {
        let group = ThreadGroup::new("dropped", ctx.with_iteration_sleep(Duration::from_millis(2)));
        let handle = group
            .add_member(CountingUnit::new("u"), RunMode::UntilCancelled)
            .unwrap();
        group.start_all().unwrap();
        handle
    };
    assert!(handle.is_cancelled());
    assert!(wait_for(AWAIT, || handle.is_finished()));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn every_member_runs_once_and_leaves(members in 1usize..12) {
        let db = RecordingDatabase::new();
        let (ctx, collector) = recording_context(&db);
        let group = ThreadGroup::new("prop", ctx);
        let unit = CountingUnit::new("once");
        let dyn_unit: Arc<dyn WorkUnit> = unit.clone();
        let handles = group.add_members(&dyn_unit, RunMode::Once, members).unwrap();

        group.start_all().unwrap();
        group.await_all(AWAIT).unwrap();

        prop_assert_eq!(unit.calls(), members);
        prop_assert_eq!(collector.records().len(), members);
        prop_assert_eq!(collector.pending_count(), 0);
        prop_assert_eq!(group.active_count(), 0);
        prop_assert_eq!(group.completed_count(), members as u64);
        prop_assert!(handles.iter().all(RunnerHandle::is_finished));
        prop_assert_eq!(db.connections_acquired(), members);
        prop_assert_eq!(db.open_connections(), 0);
    }
}
