//! The 11-step multi-user protocol
//!
//! [`Orchestrator::run`] executes the phases strictly in order on the calling
//! thread. The only work that outlives its phase is the background thread
//! group started in steps 2 and 9, which is drained by the following
//! stop-and-drain.
//!
//! Failure policy:
//! - unit failures and errors are recorded in the collector and the sequence
//!   proceeds
//! - a failed connectivity probe in step 1 aborts with
//!   [`BenchError::Connection`]
//! - a thread group that cannot be started or does not finish within the
//!   await timeout aborts the run with an orchestration error

use crate::collector::{serialize_millis, ResultCollector, Summary};
use crate::config::BenchmarkConfig;
use crate::group::ThreadGroup;
use crate::runner::{invoke, RunContext, RunMode};
use crate::workload::Workload;
use as3ap_core::{BenchError, BenchResult, ConnectionProvider, WorkUnit};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The protocol steps, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Connectivity probe
    Prepare,
    /// Start U information-retrieval users and let them run
    StartBackgroundReads,
    /// Measure IR throughput under background load
    MeasureThroughput,
    /// Replace one background user with the cross-section batch
    CrossSection,
    /// Cancel and drain the background users
    StopAndDrain,
    /// Verify the cross-section left `updates` consistent
    ConsistencyCheck,
    /// Restore `updates` from its backup
    RestoreData,
    /// Empty the staging relations
    RecreateStaging,
    /// Start U OLTP users and let them run
    StartBackgroundWrites,
    /// Steps 3 to 6 against the OLTP background load
    MeasureAndCheckWrites,
    /// Release everything
    Done,
}

impl Phase {
    /// All phases in order
    pub const ALL: [Phase; 11] = [
        Phase::Prepare,
        Phase::StartBackgroundReads,
        Phase::MeasureThroughput,
        Phase::CrossSection,
        Phase::StopAndDrain,
        Phase::ConsistencyCheck,
        Phase::RestoreData,
        Phase::RecreateStaging,
        Phase::StartBackgroundWrites,
        Phase::MeasureAndCheckWrites,
        Phase::Done,
    ];

    /// 1-based step number
    pub fn step(self) -> usize {
        Phase::ALL.iter().position(|&p| p == self).map_or(0, |i| i + 1)
    }

    /// The phase after this one
    pub fn next(self) -> Option<Phase> {
        Phase::ALL.get(self.step()).copied()
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            Phase::Prepare => "prepare",
            Phase::StartBackgroundReads => "start background information retrieval",
            Phase::MeasureThroughput => "measure IR throughput",
            Phase::CrossSection => "mixed workload IR cross-section",
            Phase::StopAndDrain => "stop and drain background users",
            Phase::ConsistencyCheck => "check sequential and random bulk updates",
            Phase::RestoreData => "restore updates relation",
            Phase::RecreateStaging => "clear staging relations",
            Phase::StartBackgroundWrites => "start background OLTP updates",
            Phase::MeasureAndCheckWrites => "measure OLTP throughput, cross-section and check",
            Phase::Done => "done",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {} ({})", self.step(), self.description())
    }
}

/// Background workload of one protocol half
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundMix {
    /// Single-row selects
    InformationRetrieval,
    /// Single-row updates
    Oltp,
}

impl BackgroundMix {
    /// Report label
    pub fn label(self) -> &'static str {
        match self {
            BackgroundMix::InformationRetrieval => "Mixed IR",
            BackgroundMix::Oltp => "Mixed OLTP",
        }
    }

    fn slug(self) -> &'static str {
        match self {
            BackgroundMix::InformationRetrieval => "ir",
            BackgroundMix::Oltp => "oltp",
        }
    }
}

/// Wall-clock timing of one executed phase
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTiming {
    /// Phase
    pub phase: Phase,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Time spent in the phase
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

/// Result of one throughput measurement
#[derive(Debug, Clone, Serialize)]
pub struct ThroughputSample {
    /// Workload measured
    pub mix: BackgroundMix,
    /// Completed invocations of the measuring runner
    pub completed: u64,
    /// How long the measuring runner ran
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl ThroughputSample {
    /// Completed invocations per second
    pub fn per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }
}

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Run start
    pub started_at: DateTime<Utc>,
    /// Run end
    pub finished_at: DateTime<Utc>,
    /// Executed phases, in order
    pub phases: Vec<PhaseTiming>,
    /// One sample per measurement phase
    pub throughput: Vec<ThroughputSample>,
    /// Per-unit results
    pub summary: Summary,
}

impl BenchmarkReport {
    /// True if any unit recorded a failure or error
    pub fn has_problems(&self) -> bool {
        self.summary.problem_count() > 0
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the textual report to `sink`
    pub fn write_text<W: Write>(&self, sink: &mut W) -> io::Result<()> {
        writeln!(sink, "AS3AP multi-user run {}", self.run_id)?;
        writeln!(sink, "started  {}", self.started_at.to_rfc3339())?;
        writeln!(sink, "finished {}", self.finished_at.to_rfc3339())?;
        writeln!(sink)?;
        writeln!(sink, "Phases:")?;
        for timing in &self.phases {
            writeln!(
                sink,
                "  [{:>2}] {:<50} {:>10} ms",
                timing.phase.step(),
                timing.phase.description(),
                timing.elapsed.as_millis()
            )?;
        }
        writeln!(sink)?;
        writeln!(sink, "Throughput:")?;
        for sample in &self.throughput {
            writeln!(
                sink,
                "  {} (tup/sec)\t{:.4}\t{} invocations in {:.3} s",
                sample.mix.label(),
                sample.per_second(),
                sample.completed,
                sample.elapsed.as_secs_f64()
            )?;
        }
        writeln!(sink)?;
        writeln!(sink, "Results:")?;
        self.summary.write_report(sink)
    }
}

/// Drives one benchmark run
pub struct Orchestrator {
    config: BenchmarkConfig,
    provider: Arc<dyn ConnectionProvider>,
    collector: Arc<ResultCollector>,
    workload: Workload,
    background: Option<ThreadGroup>,
    phases: Vec<PhaseTiming>,
    throughput: Vec<ThroughputSample>,
}

impl Orchestrator {
    /// Orchestrator running the standard AS3AP workload with a fresh collector
    pub fn new(config: BenchmarkConfig, provider: Arc<dyn ConnectionProvider>) -> Self {
        let workload = Workload::as3ap(&config);
        Self {
            config,
            provider,
            collector: Arc::new(ResultCollector::new()),
            workload,
            background: None,
            phases: Vec::new(),
            throughput: Vec::new(),
        }
    }

    /// Replace the workload
    pub fn with_workload(mut self, workload: Workload) -> Self {
        self.workload = workload;
        self
    }

    /// The collector this run records into
    pub fn collector(&self) -> Arc<ResultCollector> {
        Arc::clone(&self.collector)
    }

    /// Execute all phases and return the report.
    ///
    /// Only configuration errors, a failed connectivity probe and
    /// orchestration errors end the run early.
    pub fn run(mut self) -> BenchResult<BenchmarkReport> {
        self.config.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            target: "as3ap::orchestrator",
            %run_id,
            users = self.config.user_count,
            "benchmark run started"
        );

        for phase in Phase::ALL {
            if let Err(e) = self.execute_phase(phase) {
                error!(
                    target: "as3ap::orchestrator",
                    %run_id,
                    %phase,
                    error = %e,
                    "benchmark run aborted"
                );
                self.abandon_background();
                return Err(e);
            }
        }

        let report = BenchmarkReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            phases: std::mem::take(&mut self.phases),
            throughput: std::mem::take(&mut self.throughput),
            summary: self.collector.summarize(),
        };
        info!(
            target: "as3ap::orchestrator",
            %run_id,
            problems = report.summary.problem_count(),
            "benchmark run finished"
        );
        Ok(report)
    }

    fn execute_phase(&mut self, phase: Phase) -> BenchResult<()> {
        let started_at = Utc::now();
        let started = Instant::now();
        info!(
            target: "as3ap::orchestrator",
            step = phase.step(),
            phase = phase.description(),
            "phase started"
        );

        match phase {
            Phase::Prepare => self.prepare()?,
            Phase::StartBackgroundReads => {
                self.start_background(BackgroundMix::InformationRetrieval)?
            }
            Phase::MeasureThroughput => self.measure(BackgroundMix::InformationRetrieval)?,
            Phase::CrossSection => self.cross_section()?,
            Phase::StopAndDrain => self.stop_and_drain()?,
            Phase::ConsistencyCheck => self.run_foreground(&self.workload.checks),
            Phase::RestoreData => self.run_foreground(std::slice::from_ref(&self.workload.restore)),
            Phase::RecreateStaging => {
                self.run_foreground(std::slice::from_ref(&self.workload.clear_staging))
            }
            Phase::StartBackgroundWrites => self.start_background(BackgroundMix::Oltp)?,
            Phase::MeasureAndCheckWrites => {
                self.measure(BackgroundMix::Oltp)?;
                self.cross_section()?;
                self.stop_and_drain()?;
                self.run_foreground(&self.workload.checks);
            }
            Phase::Done => self.abandon_background(),
        }

        self.phases.push(PhaseTiming {
            phase,
            started_at,
            elapsed: started.elapsed(),
        });
        Ok(())
    }

    fn run_context(&self) -> RunContext {
        RunContext::new(Arc::clone(&self.provider), Arc::clone(&self.collector))
            .with_iteration_sleep(self.config.inter_iteration_sleep())
    }

    fn background_unit(&self, mix: BackgroundMix) -> Arc<dyn WorkUnit> {
        match mix {
            BackgroundMix::InformationRetrieval => Arc::clone(&self.workload.ir_select),
            BackgroundMix::Oltp => Arc::clone(&self.workload.oltp_update),
        }
    }

    fn prepare(&self) -> BenchResult<()> {
        let conn = self.provider.acquire().map_err(BenchError::Connection)?;
        self.provider.release(conn);
        debug!(target: "as3ap::orchestrator", "connectivity probe succeeded");
        Ok(())
    }

    fn start_background(&mut self, mix: BackgroundMix) -> BenchResult<()> {
        if self.background.is_some() {
            return Err(BenchError::InvalidState(
                "background load is already running".to_string(),
            ));
        }
        let group = ThreadGroup::new(format!("background-{}", mix.slug()), self.run_context());
        group.add_members(
            &self.background_unit(mix),
            RunMode::UntilCancelled,
            self.config.user_count,
        )?;
        if let Err(e) = group.start_all() {
            self.drain_quietly(&group);
            return Err(e);
        }
        if let Err(e) = group.await_started(self.config.await_timeout()) {
            self.drain_quietly(&group);
            return Err(e);
        }
        self.background = Some(group);

        info!(
            target: "as3ap::orchestrator",
            mix = mix.label(),
            users = self.config.user_count,
            duration_ms = self.config.background_duration_ms,
            "background load running"
        );
        std::thread::sleep(self.config.background_duration());
        Ok(())
    }

    fn measure(&mut self, mix: BackgroundMix) -> BenchResult<()> {
        let duration = self.config.performance_duration();
        let group = ThreadGroup::new(format!("measure-{}", mix.slug()), self.run_context());
        let handle = group.add_member(self.background_unit(mix), RunMode::UntilDeadline(duration))?;
        group.start_all()?;
        group.await_all(duration + self.config.await_timeout())?;

        let sample = ThroughputSample {
            mix,
            completed: handle.completed_count(),
            elapsed: handle.elapsed().unwrap_or_default(),
        };
        info!(
            target: "as3ap::orchestrator",
            mix = mix.label(),
            completed = sample.completed,
            per_second = sample.per_second(),
            "throughput measured"
        );
        self.throughput.push(sample);
        Ok(())
    }

    fn cross_section(&self) -> BenchResult<()> {
        let background = self.background.as_ref().ok_or_else(|| {
            BenchError::InvalidState("cross-section requires running background load".to_string())
        })?;
        if let Some(replaced) = background.member_snapshot().first() {
            replaced.cancel();
            debug!(
                target: "as3ap::orchestrator",
                runner = %replaced.id(),
                "background user replaced by cross-section"
            );
        }
        self.run_foreground(&self.workload.cross_section);
        Ok(())
    }

    fn stop_and_drain(&mut self) -> BenchResult<()> {
        let Some(group) = self.background.take() else {
            return Err(BenchError::InvalidState(
                "no background load to drain".to_string(),
            ));
        };
        group.cancel_all();
        group.await_all(self.config.await_timeout())?;
        debug!(
            target: "as3ap::orchestrator",
            group = group.name(),
            completed = group.completed_count(),
            "background load drained"
        );
        Ok(())
    }

    /// Run `units` once each, in order, on one connection of the control thread
    fn run_foreground(&self, units: &[Arc<dyn WorkUnit>]) {
        match self.provider.acquire() {
            Ok(mut conn) => {
                for unit in units {
                    invoke(unit.as_ref(), conn.as_mut(), &self.collector);
                }
                self.provider.release(conn);
            }
            Err(e) => {
                warn!(
                    target: "as3ap::orchestrator",
                    error = %e,
                    "foreground connection unavailable"
                );
                for unit in units {
                    let id = self.collector.on_start(unit.name());
                    self.collector
                        .on_error(id, format!("could not acquire connection: {}", e));
                }
            }
        }
    }

    fn drain_quietly(&self, group: &ThreadGroup) {
        group.cancel_all();
        if let Err(e) = group.await_all(self.config.await_timeout()) {
            warn!(
                target: "as3ap::orchestrator",
                group = group.name(),
                error = %e,
                "runners left behind"
            );
        }
    }

    fn abandon_background(&mut self) {
        if let Some(group) = self.background.take() {
            self.drain_quietly(&group);
        }
    }
}
