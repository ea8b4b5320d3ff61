//! Deterministic cooperative tick scheduler.
//!
//! Each call to [`Scheduler::tick`] advances the world by one tick and then
//! gives every live agent one burst of execution, in creation order, followed
//! by the ownerless (installer/removal) contexts in spawn order.
//!
//! # Per-agent algorithm
//!
//! For each agent alive at the start of the tick:
//! 1. If it has a live context, step it if it is ready.
//! 2. Otherwise pop due messages until one maps to an installed event script,
//!    start a context for it and step that.
//! 3. Contexts that complete or fault are dropped; faults are reported to the
//!    world and returned in the [`TickReport`].
//!
//! Agents created during a tick are first serviced on the next one. There is
//! no parallelism, so no context ever observes another mid-burst.

use crate::process::{ProcessId, ProcessStatus, ScriptSlot};
use crate::scriptorium::Scriptorium;
use caos_compiler::{ParsedScript, Script};
use caos_vm::values::AgentId;
use caos_vm::vm::{AssertionFailure, ExecutionContext, ScriptFault, StepResult, DEFAULT_MAX_CALL_DEPTH};
use caos_vm::world::World;
use log::{debug, error, trace};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Configuration and reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Overrides the dialect's default time-slice when set.
    pub timeslice: Option<u32>,
    pub max_call_depth: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { timeslice: None, max_call_depth: DEFAULT_MAX_CALL_DEPTH }
    }
}

/// A context that was terminated by a fault.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultReport {
    pub process: ProcessId,
    pub owner: Option<AgentId>,
    pub fault: ScriptFault,
}

/// What happened during one tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Contexts started from messages.
    pub started: usize,
    /// Contexts that reached the end of their script.
    pub finished: usize,
    /// Owned contexts dropped because their agent was destroyed.
    pub cancelled: usize,
    pub output: String,
    pub failures: Vec<AssertionFailure>,
    pub faults: Vec<FaultReport>,
}

impl TickReport {
    /// No faults and no assertion failures.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.faults.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Scheduler {
    config: SchedulerConfig,
    scriptorium: Scriptorium,
    next_pid: u64,
    /// At most one live top-level context per agent.
    agents: BTreeMap<AgentId, ScriptSlot>,
    ownerless: Vec<ScriptSlot>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config, ..Self::default() }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn scriptorium(&self) -> &Scriptorium {
        &self.scriptorium
    }

    pub fn scriptorium_mut(&mut self) -> &mut Scriptorium {
        &mut self.scriptorium
    }

    fn mint(&mut self) -> ProcessId {
        self.next_pid += 1;
        ProcessId::new(self.next_pid)
    }

    /// A fresh context configured from this scheduler.
    pub fn context_for(&self, script: Arc<Script>, owner: Option<AgentId>) -> ExecutionContext {
        let mut context = ExecutionContext::new(script, owner).with_max_call_depth(self.config.max_call_depth);
        if let Some(timeslice) = self.config.timeslice {
            context = context.with_quantum(timeslice);
        }
        context
    }

    /// Install a file's event scripts and schedule its installer.
    pub fn install(&mut self, parsed: &ParsedScript) -> ProcessId {
        let count = self.scriptorium.install(parsed);
        debug!("installed {} event script(s)", count);
        self.spawn_ownerless(Arc::clone(&parsed.installer))
    }

    /// Remove a file's event scripts and schedule its removal script.
    pub fn uninstall(&mut self, parsed: &ParsedScript) -> Option<ProcessId> {
        for event in &parsed.events {
            self.scriptorium.remove(event.classifier, event.event);
        }
        parsed.removal.as_ref().map(|removal| self.spawn_ownerless(Arc::clone(removal)))
    }

    pub fn spawn_ownerless(&mut self, script: Arc<Script>) -> ProcessId {
        let pid = self.mint();
        let context = self.context_for(script, None);
        self.ownerless.push(ScriptSlot::new(pid, None, None, context));
        pid
    }

    /// Start `script` for `owner`. Returns `None` when the agent is busy.
    pub fn spawn(&mut self, script: Arc<Script>, owner: AgentId) -> Option<ProcessId> {
        if self.agents.contains_key(&owner) {
            return None;
        }
        let pid = self.mint();
        let context = self.context_for(script, Some(owner));
        self.agents.insert(owner, ScriptSlot::new(pid, Some(owner), None, context));
        Some(pid)
    }

    /// The live context owned by `agent`, if any.
    pub fn slot(&self, agent: AgentId) -> Option<&ScriptSlot> {
        self.agents.get(&agent)
    }

    pub fn ownerless(&self) -> &[ScriptSlot] {
        &self.ownerless
    }

    pub fn live_count(&self) -> usize {
        self.agents.len() + self.ownerless.len()
    }

    pub fn is_idle(&self) -> bool {
        self.live_count() == 0
    }

    /// Advance the world one tick and run every due context.
    pub fn tick(&mut self, world: &mut dyn World) -> TickReport {
        world.advance();
        let mut report = TickReport { tick: world.tick(), ..TickReport::default() };

        for agent in world.agents() {
            if !world.exists(agent) {
                // destroyed earlier this tick; swept below
                continue;
            }
            let slot = match self.agents.remove(&agent) {
                Some(slot) => slot,
                None => match self.start_from_message(agent, world) {
                    Some(slot) => {
                        report.started += 1;
                        slot
                    }
                    None => continue,
                },
            };
            if let Some(slot) = run(slot, world, &mut report) {
                self.agents.insert(agent, slot);
            }
        }

        let before = self.agents.len();
        self.agents.retain(|agent, slot| {
            let alive = world.exists(*agent);
            if !alive {
                slot.set_status(ProcessStatus::Cancelled);
                debug!("{} cancelled: owner destroyed", slot);
            }
            alive
        });
        report.cancelled = before - self.agents.len();

        for slot in std::mem::take(&mut self.ownerless) {
            if let Some(slot) = run(slot, world, &mut report) {
                self.ownerless.push(slot);
            }
        }
        report
    }

    /// Tick until nothing is live or `max_ticks` have passed.
    pub fn run_until_idle(&mut self, world: &mut dyn World, max_ticks: u64) -> Vec<TickReport> {
        let mut reports = Vec::new();
        for _ in 0..max_ticks {
            reports.push(self.tick(world));
            if self.is_idle() {
                break;
            }
        }
        reports
    }

    /// Pop due messages until one has an installed script.
    fn start_from_message(&mut self, agent: AgentId, world: &mut dyn World) -> Option<ScriptSlot> {
        let classifier = world.classifier(agent).ok()?;
        while let Some(message) = world.pop_message(agent) {
            let Some(script) = u16::try_from(message.message).ok().and_then(|e| self.scriptorium.find(classifier, e))
            else {
                trace!("{} has no script for event {}, dropped", agent, message.message);
                continue;
            };
            let pid = self.mint();
            let event = message.message;
            let context = self.context_for(script, Some(agent)).with_message(message.from, message.p1, message.p2);
            debug!("{} starts event {} as {}", agent, event, pid);
            return Some(ScriptSlot::new(pid, Some(agent), Some(event), context));
        }
        None
    }
}

/// Give one slot its burst. Returns the slot if it is still live.
fn run(mut slot: ScriptSlot, world: &mut dyn World, report: &mut TickReport) -> Option<ScriptSlot> {
    if !slot.context.is_ready(world) {
        return Some(slot);
    }
    let result = slot.context.step(world);
    report.output.push_str(&slot.context.take_output());
    report.failures.extend(slot.context.take_failures());
    match result {
        StepResult::Continue | StepResult::Suspended(_) => {
            slot.refresh();
            Some(slot)
        }
        StepResult::Completed => {
            slot.set_status(ProcessStatus::Completed);
            report.finished += 1;
            debug!("{} finished", slot);
            None
        }
        StepResult::Faulted(fault) => {
            slot.set_status(ProcessStatus::Failed);
            error!("{} faulted: {}", slot, fault);
            world.report_fault(slot.owner(), &fault.to_string());
            report.faults.push(FaultReport { process: slot.id(), owner: slot.owner(), fault });
            None
        }
    }
}
