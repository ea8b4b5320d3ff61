//! Run a script file to completion against a fresh [`SimWorld`].
//!
//! The installer runs without time-slicing: a spent quantum just steps it
//! again in the same tick. When it suspends, the harness ticks the scheduler
//! (which also runs any agent event scripts) until the installer is due.

use crate::scheduler::{FaultReport, Scheduler, SchedulerConfig};
use crate::world::{SimWorld, WorldConfig};
use caos_compiler::{CompileError, Dialect};
use caos_vm::vm::{AssertionFailure, ScriptFault, StepResult};
use caos_vm::world::World;
use log::debug;

/// Ticks the harness will advance before giving up on a suspended installer.
pub const DEFAULT_MAX_TICKS: u64 = 10_000;

/// Consecutive same-tick steps before an installer counts as runaway.
const MAX_SAME_TICK_STEPS: u32 = 100_000;

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub dialect: Dialect,
    /// Installer output followed by event-script output, in tick order.
    pub output: String,
    pub failures: Vec<AssertionFailure>,
    /// The installer's own fault, if it had one.
    pub fault: Option<ScriptFault>,
    /// Faults raised by event scripts while the installer was waiting.
    pub event_faults: Vec<FaultReport>,
    pub ticks: u64,
    pub completed: bool,
}

impl RunReport {
    /// Completed with no assertion failures and no faults.
    pub fn passed(&self) -> bool {
        self.completed && self.fault.is_none() && self.failures.is_empty() && self.event_faults.is_empty()
    }
}

pub struct Harness {
    pub world: SimWorld,
    pub scheduler: Scheduler,
    max_ticks: u64,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(WorldConfig::default(), SchedulerConfig::default())
    }
}

impl Harness {
    pub fn new(world: WorldConfig, scheduler: SchedulerConfig) -> Self {
        Self { world: SimWorld::new(world), scheduler: Scheduler::new(scheduler), max_ticks: DEFAULT_MAX_TICKS }
    }

    pub fn with_max_ticks(mut self, max_ticks: u64) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    /// Parse `source` in `dialect`, install its event scripts and run its
    /// installer entirely.
    pub fn run(&mut self, dialect: Dialect, source: &str) -> Result<RunReport, CompileError> {
        let parsed = caos_compiler::parse_dialect(dialect, source)?;
        let count = self.scheduler.scriptorium_mut().install(&parsed);
        debug!("harness installed {} event script(s)", count);

        let mut context = self.scheduler.context_for(parsed.installer, None);
        let start = self.world.tick();
        let mut report = RunReport {
            dialect,
            output: String::new(),
            failures: Vec::new(),
            fault: None,
            event_faults: Vec::new(),
            ticks: 0,
            completed: false,
        };
        let mut same_tick_steps = 0u32;
        loop {
            let result = context.step(&mut self.world);
            report.output.push_str(&context.take_output());
            report.failures.extend(context.take_failures());
            match result {
                StepResult::Continue => {
                    same_tick_steps += 1;
                    if same_tick_steps >= MAX_SAME_TICK_STEPS {
                        let fault = context.runaway_fault();
                        context.halt();
                        self.world.report_fault(None, &fault.to_string());
                        report.fault = Some(fault);
                        break;
                    }
                }
                StepResult::Suspended(_) => {
                    same_tick_steps = 0;
                    while !context.is_ready(&self.world) {
                        if self.world.tick() - start >= self.max_ticks {
                            report.ticks = self.world.tick() - start;
                            return Ok(report);
                        }
                        let tick = self.scheduler.tick(&mut self.world);
                        report.output.push_str(&tick.output);
                        report.failures.extend(tick.failures);
                        report.event_faults.extend(tick.faults);
                    }
                }
                StepResult::Completed => {
                    report.completed = true;
                    break;
                }
                StepResult::Faulted(fault) => {
                    self.world.report_fault(None, &fault.to_string());
                    report.fault = Some(fault);
                    break;
                }
            }
        }
        report.ticks = self.world.tick() - start;
        Ok(report)
    }
}

/// Run `source` in a fresh world. Unknown dialects and malformed scripts
/// come back as `CompileError`.
pub fn run_script(dialect: &str, source: &str) -> Result<RunReport, CompileError> {
    let dialect =
        Dialect::from_name(dialect).ok_or_else(|| CompileError::UnknownDialect { name: dialect.to_string() })?;
    Harness::default().run(dialect, source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passing_script() {
        let report = run_script("c3", "setv va00 1 dbg: asrt va00 eq 1").unwrap();
        assert!(report.passed());
        assert_eq!(report.ticks, 0);
    }

    #[test]
    fn test_failed_assertion_is_reported_not_fatal() {
        let report = run_script("c3", "dbg: asrt 1 eq 2 outs \"after\"").unwrap();
        assert!(report.completed);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.output, "after");
        assert!(!report.passed());
    }

    #[test]
    fn test_tark_advances_the_world() {
        let report = run_script("c3", "reps 3 dbg: tark repe").unwrap();
        assert!(report.passed());
        assert_eq!(report.ticks, 3);
    }

    #[test]
    fn test_unknown_dialect() {
        assert!(matches!(run_script("c9", ""), Err(CompileError::UnknownDialect { .. })));
    }

    #[test]
    fn test_runaway_installer_faults() {
        let report = run_script("c3", "loop ever").unwrap();
        assert!(!report.completed);
        let fault = report.fault.expect("runaway installer should fault");
        assert_eq!(fault.kind(), caos_compiler::diagnostics::ErrorKind::Runtime);
        assert!(fault.to_string().contains("runaway"));
    }

    #[test]
    fn test_runaway_inst_block_faults() {
        let report = run_script("c3", "inst loop ever").unwrap();
        let fault = report.fault.expect("runaway installer should fault");
        assert_eq!(fault.kind(), caos_compiler::diagnostics::ErrorKind::Runtime);
        assert_eq!(report.ticks, 0);
    }
}
