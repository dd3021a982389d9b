//! Thread group supervision
//!
//! A [`ThreadGroup`] owns a set of runners and drives them as a unit: start
//! them all, cancel them all, and block until every one of them has exited.
//! The join is a counting join over a condition variable: each runner removes
//! itself from the active set when it exits (also on panic) and notifies the
//! group under the state lock, so `await_all` can never miss the last wakeup.

use crate::runner::{
    panic_message, run_member, MemberEvents, RunContext, RunMode, RunnerHandle, RunnerId,
};
use as3ap_core::{BenchError, BenchResult, WorkUnit};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

#[derive(Default)]
struct GroupState {
    /// Members whose thread has not exited yet. Only shrinks once started.
    active: HashMap<RunnerId, RunnerHandle>,
    /// Threads that entered their body
    entered: usize,
    /// Threads actually spawned
    expected: usize,
}

struct GroupShared {
    name: String,
    state: Mutex<GroupState>,
    changed: Condvar,
}

impl MemberEvents for GroupShared {
    fn started(&self, _id: RunnerId) {
        let mut state = self.state.lock();
        state.entered += 1;
        self.changed.notify_all();
    }

    fn finished(&self, id: RunnerId) {
        let mut state = self.state.lock();
        state.active.remove(&id);
        self.changed.notify_all();
    }
}

struct Member {
    handle: RunnerHandle,
    unit: Arc<dyn WorkUnit>,
}

#[derive(Default)]
struct Registry {
    members: Vec<Member>,
    started: bool,
}

/// A cancelable, joinable group of runners
pub struct ThreadGroup {
    shared: Arc<GroupShared>,
    ctx: RunContext,
    registry: Mutex<Registry>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadGroup {
    /// Empty group. Runner threads are named `as3ap-<name>-<n>`.
    pub fn new(name: impl Into<String>, ctx: RunContext) -> Self {
        Self {
            shared: Arc::new(GroupShared {
                name: name.into(),
                state: Mutex::new(GroupState::default()),
                changed: Condvar::new(),
            }),
            ctx,
            registry: Mutex::new(Registry::default()),
            threads: Mutex::new(Vec::new()),
        }
    }

    /// Group name
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Register a runner. Only valid before [`start_all`](Self::start_all).
    pub fn add_member(&self, unit: Arc<dyn WorkUnit>, mode: RunMode) -> BenchResult<RunnerHandle> {
        let mut registry = self.registry.lock();
        if registry.started {
            return Err(BenchError::InvalidState(format!(
                "cannot add a member to thread group '{}' after it was started",
                self.shared.name
            )));
        }
        let id = RunnerId(registry.members.len() as u64);
        let handle = RunnerHandle::new(id, unit.name(), mode);
        registry.members.push(Member {
            handle: handle.clone(),
            unit,
        });
        Ok(handle)
    }

    /// Register `count` runners of the same unit and mode
    pub fn add_members(
        &self,
        unit: &Arc<dyn WorkUnit>,
        mode: RunMode,
        count: usize,
    ) -> BenchResult<Vec<RunnerHandle>> {
        (0..count)
            .map(|_| self.add_member(Arc::clone(unit), mode))
            .collect()
    }

    /// True once [`start_all`](Self::start_all) was called
    pub fn is_started(&self) -> bool {
        self.registry.lock().started
    }

    /// Spawn one thread per member and return without waiting.
    ///
    /// If a thread cannot be spawned, members that never ran are dropped from
    /// the active set, every running member is cancelled, and
    /// [`BenchError::StartFailed`] is returned. The group can still be awaited.
    pub fn start_all(&self) -> BenchResult<()> {
        let mut registry = self.registry.lock();
        if registry.started {
            return Err(BenchError::InvalidState(format!(
                "thread group '{}' was already started",
                self.shared.name
            )));
        }
        registry.started = true;

        // Fill the active set before any thread runs so a fast runner cannot
        // remove itself before it was added.
        {
            let mut state = self.shared.state.lock();
            state.expected = registry.members.len();
            for member in &registry.members {
                state.active.insert(member.handle.id(), member.handle.clone());
            }
        }

        let mut threads = self.threads.lock();
        for (i, member) in registry.members.iter().enumerate() {
            let handle = member.handle.clone();
            let unit = Arc::clone(&member.unit);
            let ctx = self.ctx.clone();
            let events: Arc<dyn MemberEvents> = self.shared.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("as3ap-{}-{}", self.shared.name, i))
                .spawn(move || run_member(handle, unit, ctx, events));

            match spawned {
                Ok(thread) => threads.push(thread),
                Err(e) => {
                    {
                        let mut state = self.shared.state.lock();
                        for never_ran in &registry.members[i..] {
                            state.active.remove(&never_ran.handle.id());
                        }
                        state.expected = i;
                        self.shared.changed.notify_all();
                    }
                    for member in &registry.members {
                        member.handle.cancel();
                    }
                    error!(
                        target: "as3ap::group",
                        group = %self.shared.name,
                        error = %e,
                        "failed to spawn runner thread"
                    );
                    return Err(BenchError::StartFailed {
                        group: self.shared.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        debug!(
            target: "as3ap::group",
            group = %self.shared.name,
            members = registry.members.len(),
            "thread group started"
        );
        Ok(())
    }

    /// Block until every spawned member thread has entered its loop
    pub fn await_started(&self, timeout: Duration) -> BenchResult<()> {
        if !self.is_started() {
            return Err(self.not_started());
        }
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while state.entered < state.expected {
            if self.shared.changed.wait_until(&mut state, deadline).timed_out()
                && state.entered < state.expected
            {
                return Err(BenchError::AwaitTimeout {
                    group: self.shared.name.clone(),
                    timeout,
                    remaining: state.expected - state.entered,
                });
            }
        }
        Ok(())
    }

    /// Cancel every member. Returns immediately.
    pub fn cancel_all(&self) {
        let registry = self.registry.lock();
        for member in &registry.members {
            member.handle.cancel();
        }
        debug!(
            target: "as3ap::group",
            group = %self.shared.name,
            "cancel requested for all members"
        );
    }

    /// Block until every member has finished and left the active set.
    ///
    /// Fails with [`BenchError::AwaitTimeout`] if members are still active
    /// after `timeout`. Member threads are joined before returning `Ok`.
    pub fn await_all(&self, timeout: Duration) -> BenchResult<()> {
        if !self.is_started() {
            return Err(self.not_started());
        }
        let deadline = Instant::now() + timeout;
        {
            let mut state = self.shared.state.lock();
            while !state.active.is_empty() {
                if self.shared.changed.wait_until(&mut state, deadline).timed_out()
                    && !state.active.is_empty()
                {
                    error!(
                        target: "as3ap::group",
                        group = %self.shared.name,
                        remaining = state.active.len(),
                        "thread group did not finish in time"
                    );
                    return Err(BenchError::AwaitTimeout {
                        group: self.shared.name.clone(),
                        timeout,
                        remaining: state.active.len(),
                    });
                }
            }
        }

        let threads: Vec<JoinHandle<()>> = self.threads.lock().drain(..).collect();
        for thread in threads {
            if let Err(payload) = thread.join() {
                warn!(
                    target: "as3ap::group",
                    group = %self.shared.name,
                    panic = %panic_message(payload.as_ref()),
                    "runner thread panicked"
                );
            }
        }
        debug!(target: "as3ap::group", group = %self.shared.name, "thread group finished");
        Ok(())
    }

    /// Members that have not finished yet
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().active.len()
    }

    /// Point-in-time copy of the active members, ordered by id
    pub fn member_snapshot(&self) -> Vec<RunnerHandle> {
        let mut members: Vec<RunnerHandle> =
            self.shared.state.lock().active.values().cloned().collect();
        members.sort_by_key(RunnerHandle::id);
        members
    }

    /// Every registered member, finished or not
    pub fn members(&self) -> Vec<RunnerHandle> {
        self.registry
            .lock()
            .members
            .iter()
            .map(|m| m.handle.clone())
            .collect()
    }

    /// Sum of completed invocations over all members
    pub fn completed_count(&self) -> u64 {
        self.members().iter().map(RunnerHandle::completed_count).sum()
    }

    fn not_started(&self) -> BenchError {
        BenchError::InvalidState(format!(
            "thread group '{}' was not started",
            self.shared.name
        ))
    }
}

impl Drop for ThreadGroup {
    fn drop(&mut self) {
        // Never leave runners spinning after their owner is gone
        self.cancel_all();
    }
}
