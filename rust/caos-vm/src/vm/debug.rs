//! Debug and scheduling commands, text output, and inline `CAOS`.

use super::*;
use caos_compiler::compiler::opcodes::Opcode;
use log::{debug, warn};

/// Nested `CAOS` evaluations allowed inside one another.
const MAX_INLINE_DEPTH: u32 = 16;

/// Steps an inline script may take before it is treated as runaway.
const INLINE_STEP_LIMIT: u32 = 16;

impl ExecutionContext {
    pub(super) fn try_debug_command(
        &mut self,
        instr: &Instruction,
        world: &mut dyn World,
    ) -> Option<Result<Flow, VmError>> {
        let result = match instr.op {
            Opcode::DbgAsrt | Opcode::DbgAsrf => self.assert(instr, world),
            Opcode::DbgFail => {
                self.record_failure(instr, "DBG: FAIL reached".to_string());
                Ok(Flow::Next)
            }
            Opcode::DbgOuts | Opcode::Outs => self.arg_str(instr, 0, world).map(|text| {
                if instr.op == Opcode::DbgOuts {
                    debug!("{}", text);
                }
                self.output.push_str(&text);
                Flow::Next
            }),
            Opcode::DbgOutv | Opcode::Outv => self.arg(instr, 0, world).map(|value| {
                let text = value.to_display();
                if instr.op == Opcode::DbgOutv {
                    debug!("{}", text);
                }
                self.output.push_str(&text);
                Flow::Next
            }),
            Opcode::DbgTark => Ok(Flow::Suspend(SuspendReason::UntilTick(world.tick() + 1))),
            Opcode::Wait => self.arg_int(instr, 0, world).map(|ticks| {
                if ticks > 0 {
                    Flow::Suspend(SuspendReason::UntilTick(world.tick() + ticks as u64))
                } else {
                    Flow::Next
                }
            }),
            Opcode::DbgTslc => self.arg_int(instr, 0, world).map(|units| {
                self.remaining = u32::try_from(units).unwrap_or(0);
                Flow::Next
            }),
            Opcode::Inst => {
                self.inst = true;
                Ok(Flow::Next)
            }
            Opcode::Slow => {
                self.inst = false;
                Ok(Flow::Next)
            }
            _ => return None,
        };
        Some(result)
    }

    pub(super) fn try_debug_function(
        &mut self,
        call: &Instruction,
        world: &mut dyn World,
    ) -> Option<Result<Value, VmError>> {
        match call.op {
            Opcode::GetTslc => Some(Ok(Value::Int(self.remaining as i32))),
            Opcode::Caos => Some(self.inline_caos(call, world)),
            _ => None,
        }
    }

    fn assert(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<Flow, VmError> {
        let cond = match instr.args.first() {
            Some(Operand::Condition(cond)) => cond,
            _ => return Err(VmError::Runtime(format!("{} needs a condition", instr.op.name()))),
        };
        let holds = self.eval_condition(cond, world)?;
        let expected = instr.op == Opcode::DbgAsrt;
        if holds != expected {
            let message = if expected {
                "condition was false"
            } else {
                "condition was true"
            };
            self.record_failure(instr, message.to_string());
        }
        Ok(Flow::Next)
    }

    fn record_failure(&mut self, instr: &Instruction, message: String) {
        warn!("{} failed at {}: {}", instr.op.name(), instr.span, message);
        self.failures.push(AssertionFailure { opcode: instr.op.name().to_string(), span: instr.span, message });
    }

    /// `CAOS inline state_trans p1 p2 code throws catches report`.
    ///
    /// Runs `code` to completion in a fresh context and returns its text
    /// output. Parse errors and faults land in `report` and yield `""`.
    fn inline_caos(&mut self, call: &Instruction, world: &mut dyn World) -> Result<Value, VmError> {
        let _inline = self.arg_int(call, 0, world)?;
        let state_trans = self.arg_int(call, 1, world)? != 0;
        let p1 = self.arg(call, 2, world)?;
        let p2 = self.arg(call, 3, world)?;
        let code = self.arg_str(call, 4, world)?;
        let _throws = self.arg_int(call, 5, world)?;
        let _catches = self.arg_int(call, 6, world)?;
        let report = self.dest(call, 7)?;

        if self.inline_depth >= MAX_INLINE_DEPTH {
            return Err(VmError::Runtime(format!("CAOS nested deeper than {}", MAX_INLINE_DEPTH)));
        }
        let parsed = match caos_compiler::parse_dialect(self.dialect(), &code) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.store(report, Value::String(e.to_string()), world)?;
                return Ok(Value::String(String::new()));
            }
        };

        let owner = if state_trans { self.owner } else { None };
        let mut nested = ExecutionContext::new(parsed.installer, owner)
            .with_message(self.owner, p1, p2)
            .with_max_call_depth(self.max_call_depth);
        nested.target = if state_trans { self.target } else { None };
        nested.inst = true;
        nested.inline_depth = self.inline_depth + 1;

        let mut outcome = StepResult::Continue;
        for _ in 0..INLINE_STEP_LIMIT {
            outcome = nested.step(world);
            if outcome != StepResult::Continue {
                break;
            }
        }
        self.failures.append(&mut nested.failures);
        match outcome {
            StepResult::Completed => {
                if state_trans {
                    self.target = nested.target;
                }
                Ok(Value::String(nested.output))
            }
            StepResult::Faulted(fault) => {
                self.store(report, Value::String(fault.to_string()), world)?;
                Ok(Value::String(String::new()))
            }
            StepResult::Suspended(_) => Err(VmError::Runtime("inline CAOS cannot suspend".to_string())),
            StepResult::Continue => Err(VmError::Runtime("inline CAOS did not finish".to_string())),
        }
    }
}
