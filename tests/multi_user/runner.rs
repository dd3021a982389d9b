//! Run modes, outcome mapping and interruptible sleep

use crate::common::*;
use as3ap::{invoke, InvocationOutcome, Outcome};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn single(
    db: &RecordingDatabase,
    unit: Arc<dyn WorkUnit>,
    mode: RunMode,
    sleep: Duration,
) -> (ThreadGroup, RunnerHandle, Arc<ResultCollector>) {
    let (ctx, collector) = recording_context(db);
    let group = ThreadGroup::new("single", ctx.with_iteration_sleep(sleep));
    let handle = group.add_member(unit, mode).unwrap();
    (group, handle, collector)
}

#[test]
fn transient_failures_are_never_recorded() {
    let db = RecordingDatabase::new();
    let unit: Arc<dyn WorkUnit> = Arc::new(FnWorkUnit::new("contended", |_: &mut dyn Connection| {
        Err(WorkError::transient("lock conflict on no wait transaction"))
    }));
    let (group, handle, collector) = single(
        &db,
        unit,
        RunMode::UntilDeadline(Duration::from_millis(200)),
        Duration::ZERO,
    );

    group.start_all().unwrap();
    group.await_all(AWAIT).unwrap();

    assert_eq!(handle.completed_count(), 0);
    assert!(handle.transient_count() > 0);
    assert_eq!(handle.error_count(), 0);
    assert!(collector.records().is_empty());

    let elapsed = handle.elapsed().unwrap();
    assert!(elapsed >= Duration::from_millis(200), "stopped early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(250), "overran deadline: {:?}", elapsed);
}

#[test]
fn run_once_invokes_exactly_once_even_on_error() {
    let db = RecordingDatabase::new();
    db.fail("SELECT 1", WorkError::fatal("table unknown"));
    let unit = CountingUnit::new("broken");
    let (group, handle, collector) = single(&db, unit.clone(), RunMode::Once, Duration::ZERO);

    group.start_all().unwrap();
    group.await_all(AWAIT).unwrap();

    assert_eq!(unit.calls(), 1);
    assert_eq!(handle.error_count(), 1);
    let records = collector.records();
    assert_eq!(records.len(), 1);
    assert!(matches!(records[0].outcome, Outcome::Error(_)));
}

#[test]
fn fatal_errors_do_not_stop_a_repeating_runner() {
    let db = RecordingDatabase::new();
    db.fail("SELECT 1", WorkError::fatal("boom"));
    let unit = CountingUnit::new("flaky");
    let (group, handle, _) = single(
        &db,
        unit.clone(),
        RunMode::UntilCancelled,
        Duration::from_millis(1),
    );

    group.start_all().unwrap();
    assert!(wait_for(AWAIT, || unit.calls() >= 3));
    group.cancel_all();
    group.await_all(AWAIT).unwrap();

    assert!(handle.error_count() >= 3);
}

#[test]
fn cancel_interrupts_the_iteration_sleep() {
    let db = RecordingDatabase::new();
    let unit = CountingUnit::new("sleepy");
    let (group, handle, _) = single(
        &db,
        unit.clone(),
        RunMode::UntilCancelled,
        Duration::from_secs(60),
    );

    group.start_all().unwrap();
    assert!(wait_for(AWAIT, || unit.calls() == 1));

    let cancelled_at = Instant::now();
    handle.cancel();
    group.await_all(Duration::from_secs(5)).unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_secs(5));
    assert_eq!(unit.calls(), 1);
}

#[test]
fn deadline_caps_the_iteration_sleep() {
    let db = RecordingDatabase::new();
    let unit = CountingUnit::new("paced");
    let (group, handle, _) = single(
        &db,
        unit.clone(),
        RunMode::UntilDeadline(Duration::from_millis(100)),
        Duration::from_secs(30),
    );

    group.start_all().unwrap();
    group.await_all(Duration::from_secs(5)).unwrap();

    assert_eq!(unit.calls(), 1);
    assert!(handle.elapsed().unwrap() < Duration::from_secs(5));
}

#[test]
fn refused_connection_records_one_error() {
    let db = RecordingDatabase::new();
    db.refuse_connections(true);
    let unit = CountingUnit::new("offline");
    let (group, handle, collector) =
        single(&db, unit.clone(), RunMode::UntilCancelled, Duration::ZERO);

    group.start_all().unwrap();
    group.await_all(AWAIT).unwrap();

    assert_eq!(unit.calls(), 0);
    assert_eq!(handle.error_count(), 1);
    let summary = collector.summarize();
    assert_eq!(summary.unit("offline").unwrap().errors, 1);
}

#[test]
fn invoke_maps_every_outcome() {
    let db = RecordingDatabase::new();
    let collector = ResultCollector::new();
    let mut conn = db.acquire().unwrap();
    let calls = AtomicUsize::new(0);

    let check = FnWorkUnit::new("check", |_: &mut dyn Connection| {
        Err(WorkError::assertion("Should have no records, but reported 4."))
    });
    let panicking = FnWorkUnit::new("panics", |_: &mut dyn Connection| -> WorkResult<()> {
        panic!("unit bug")
    });
    let ok = FnWorkUnit::new("ok", |_: &mut dyn Connection| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    assert_eq!(invoke(&check, conn.as_mut(), &collector), InvocationOutcome::Failed);
    assert_eq!(invoke(&panicking, conn.as_mut(), &collector), InvocationOutcome::Errored);
    assert_eq!(invoke(&ok, conn.as_mut(), &collector), InvocationOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let summary = collector.summarize();
    assert_eq!(summary.unit("check").unwrap().failures, 1);
    assert_eq!(
        summary.unit("check").unwrap().details,
        vec!["failure: Should have no records, but reported 4.".to_string()]
    );
    assert_eq!(summary.unit("panics").unwrap().errors, 1);
    assert_eq!(summary.problem_count(), 2);
}
