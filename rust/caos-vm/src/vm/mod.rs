//! Execution contexts: resumable per-script interpreter state.
//!
//! A context walks the structured blocks of a [`Script`] with an explicit
//! frame stack. Suspending is just returning from [`ExecutionContext::step`]
//! with the cursor left in place, so the scheduler can resume it on a later
//! tick without any coroutine machinery.

mod agents;
mod debug;
mod intrinsics;
mod ops;

use crate::values::{compare, AgentId, Value, ValueError, VariableFrame, Vec2};
use crate::world::{World, WorldError};
use caos_compiler::compiler::ast::{
    BlockId, Comparison, Condition, Instruction, Literal, Logic, Operand, Script, Stmt, Tail, VarRef,
};
use caos_compiler::compiler::opcodes;
use caos_compiler::diagnostics::{Diagnostic, ErrorKind};
use caos_compiler::{Classifier, Dialect, Span};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Statements one `step` may run before the context faults as runaway.
pub const RUNAWAY_LIMIT: u64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VmError {
    #[error("type error: {0}")]
    Type(#[from] ValueError),
    #[error("name error: {0}")]
    Name(String),
    #[error("runtime fault: {0}")]
    Runtime(String),
    #[error("{0}")]
    World(#[from] WorldError),
}

impl VmError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VmError::Type(_) => ErrorKind::Type,
            VmError::Name(_) => ErrorKind::Name,
            VmError::Runtime(_) | VmError::World(_) => ErrorKind::Runtime,
        }
    }
}

/// A fatal error in one context, with the statement that raised it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error} in {opcode} at {span}")]
pub struct ScriptFault {
    pub error: VmError,
    pub opcode: String,
    pub span: Span,
}

impl ScriptFault {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn to_diagnostic(&self, source: &str, filename: &str) -> Diagnostic {
        Diagnostic::new(self.kind(), format!("{}: {}", self.opcode, self.error))
            .at(source, filename, self.span.line, self.span.col, self.opcode.len())
    }
}

/// A failed `DBG: ASRT`/`DBG: ASRF`/`DBG: FAIL`. Execution carries on.
#[derive(Debug, Clone, PartialEq)]
pub struct AssertionFailure {
    pub opcode: String,
    pub span: Span,
    pub message: String,
}

impl AssertionFailure {
    pub fn to_diagnostic(&self, source: &str, filename: &str) -> Diagnostic {
        Diagnostic::new(ErrorKind::Assertion, format!("{}: {}", self.opcode, self.message))
            .at(source, filename, self.span.line, self.span.col, self.opcode.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalEvent {
    AnimationOver(AgentId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendReason {
    UntilTick(u64),
    External(ExternalEvent),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Runnable,
    SuspendedUntilTick(u64),
    SuspendedOnExternalEvent(ExternalEvent),
    Halted,
}

impl From<SuspendReason> for ContextState {
    fn from(reason: SuspendReason) -> Self {
        match reason {
            SuspendReason::UntilTick(t) => ContextState::SuspendedUntilTick(t),
            SuspendReason::External(e) => ContextState::SuspendedOnExternalEvent(e),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepResult {
    /// The time-slice ran out; resume on the next tick.
    Continue,
    Suspended(SuspendReason),
    Completed,
    Faulted(ScriptFault),
}

/// What the dispatcher tells the step loop to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Next,
    Yield,
    Suspend(SuspendReason),
    End,
}

#[derive(Debug, Clone, PartialEq)]
enum FrameKind {
    Body,
    Branch,
    Loop,
    Reps { remaining: i32 },
    Enum { candidates: VecDeque<AgentId>, saved_target: Option<AgentId> },
    Subroutine,
}

#[derive(Debug, Clone, PartialEq)]
struct Frame {
    block: BlockId,
    pc: usize,
    kind: FrameKind,
}

/// One running script instance.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    script: Arc<Script>,
    frames: Vec<Frame>,
    /// Frame-stack depth at each pending `GSUB`.
    calls: Vec<usize>,
    locals: VariableFrame,
    target: Option<AgentId>,
    owner: Option<AgentId>,
    from: Option<AgentId>,
    p1: Value,
    p2: Value,
    state: ContextState,
    quantum: u32,
    remaining: u32,
    inst: bool,
    max_call_depth: usize,
    inline_depth: u32,
    output: String,
    failures: Vec<AssertionFailure>,
}

impl ExecutionContext {
    pub fn new(script: Arc<Script>, owner: Option<AgentId>) -> Self {
        let quantum = script.dialect.default_timeslice();
        let root = script.root;
        Self {
            script,
            frames: vec![Frame { block: root, pc: 0, kind: FrameKind::Body }],
            calls: Vec::new(),
            locals: VariableFrame::default(),
            target: owner,
            owner,
            from: None,
            p1: Value::Int(0),
            p2: Value::Int(0),
            state: ContextState::Runnable,
            quantum,
            remaining: quantum,
            inst: false,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            inline_depth: 0,
            output: String::new(),
            failures: Vec::new(),
        }
    }

    /// Sender and parameters of the message that started this context.
    pub fn with_message(mut self, from: Option<AgentId>, p1: Value, p2: Value) -> Self {
        self.from = from;
        self.p1 = p1;
        self.p2 = p2;
        self
    }

    pub fn with_quantum(mut self, quantum: u32) -> Self {
        self.quantum = quantum.max(1);
        self.remaining = self.quantum;
        self
    }

    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.script.dialect
    }

    pub fn script(&self) -> &Arc<Script> {
        &self.script
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.state == ContextState::Halted
    }

    pub fn owner(&self) -> Option<AgentId> {
        self.owner
    }

    /// Current target, or `None` when unset or destroyed.
    pub fn target(&self, world: &dyn World) -> Option<AgentId> {
        self.target.filter(|t| world.exists(*t))
    }

    pub fn local(&self, slot: u8) -> Value {
        self.locals.get(slot)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    pub fn take_failures(&mut self) -> Vec<AssertionFailure> {
        std::mem::take(&mut self.failures)
    }

    pub fn halt(&mut self) {
        self.state = ContextState::Halted;
        self.frames.clear();
        self.calls.clear();
    }

    /// Whether `step` would make progress now.
    pub fn is_ready(&self, world: &dyn World) -> bool {
        match self.state {
            ContextState::Runnable => true,
            ContextState::SuspendedUntilTick(t) => world.tick() >= t,
            ContextState::SuspendedOnExternalEvent(ExternalEvent::AnimationOver(agent)) => {
                !world.animating(agent).unwrap_or(false)
            }
            ContextState::Halted => false,
        }
    }

    /// Run until the time-slice is spent, the script suspends, ends, or faults.
    pub fn step(&mut self, world: &mut dyn World) -> StepResult {
        match self.state {
            ContextState::Halted => return StepResult::Completed,
            ContextState::SuspendedUntilTick(t) if !self.is_ready(world) => {
                return StepResult::Suspended(SuspendReason::UntilTick(t));
            }
            ContextState::SuspendedOnExternalEvent(e) if !self.is_ready(world) => {
                return StepResult::Suspended(SuspendReason::External(e));
            }
            _ => {}
        }
        self.state = ContextState::Runnable;
        self.remaining = self.quantum;
        let mut executed = 0u64;
        loop {
            if let Some(owner) = self.owner {
                if !world.exists(owner) {
                    self.halt();
                    return StepResult::Completed;
                }
            }
            executed += 1;
            if executed > RUNAWAY_LIMIT {
                let fault = self.runaway_fault();
                self.halt();
                return StepResult::Faulted(fault);
            }
            match self.exec_next(world) {
                Ok(Flow::Next) => {}
                Ok(Flow::Yield) => return StepResult::Continue,
                Ok(Flow::Suspend(reason)) => {
                    self.state = reason.into();
                    return StepResult::Suspended(reason);
                }
                Ok(Flow::End) => {
                    self.halt();
                    return StepResult::Completed;
                }
                Err(fault) => {
                    self.halt();
                    return StepResult::Faulted(fault);
                }
            }
        }
    }

    /// Spend `cost` units of the time-slice; false when it cannot be afforded.
    fn charge(&mut self, cost: u32) -> bool {
        if self.inst || cost == 0 {
            return true;
        }
        if self.remaining >= cost {
            self.remaining -= cost;
            true
        } else {
            false
        }
    }

    fn stmt_cost(&self, stmt: &Stmt) -> u32 {
        let dialect = self.dialect();
        match stmt {
            Stmt::Command(instr) => opcodes::spec(instr.op).map(|s| s.cost(dialect)).unwrap_or(1),
            Stmt::Subroutine { .. } => 0,
            _ => dialect.flow_cost(),
        }
    }

    /// A runaway fault located at the statement the context would run next.
    /// Raised after `RUNAWAY_LIMIT` statements in one `step`, or by a driver
    /// that gives up re-stepping a context within one tick.
    pub fn runaway_fault(&self) -> ScriptFault {
        let error = VmError::Runtime("runaway script: it kept running without suspending".to_string());
        let Some(frame) = self.frames.last() else {
            return ScriptFault { error, opcode: String::new(), span: Span::dummy() };
        };
        let block = self.script.block(frame.block);
        match block.stmts.get(frame.pc) {
            Some(stmt) => ScriptFault { error, opcode: stmt.name().to_string(), span: stmt.span() },
            None => ScriptFault { error, opcode: tail_name(&block.tail).to_string(), span: block.tail_span },
        }
    }

    fn exec_next(&mut self, world: &mut dyn World) -> Result<Flow, ScriptFault> {
        let script = Arc::clone(&self.script);
        let (block_id, pc) = match self.frames.last() {
            Some(frame) => (frame.block, frame.pc),
            None => return Ok(Flow::End),
        };
        let block = script.block(block_id);
        if let Some(stmt) = block.stmts.get(pc) {
            if !self.charge(self.stmt_cost(stmt)) {
                return Ok(Flow::Yield);
            }
            if let Some(frame) = self.frames.last_mut() {
                frame.pc += 1;
            }
            self.exec_stmt(stmt, world).map_err(|error| ScriptFault {
                error,
                opcode: stmt.name().to_string(),
                span: stmt.span(),
            })
        } else {
            let cost = match block.tail {
                Tail::Fallthrough => 0,
                _ => self.dialect().flow_cost(),
            };
            if !self.charge(cost) {
                return Ok(Flow::Yield);
            }
            self.exec_tail(&block.tail, world).map_err(|error| ScriptFault {
                error,
                opcode: tail_name(&block.tail).to_string(),
                span: block.tail_span,
            })
        }
    }

    fn push(&mut self, block: BlockId, kind: FrameKind) {
        self.frames.push(Frame { block, pc: 0, kind });
    }

    fn restart_block(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.pc = 0;
        }
    }

    fn pop_frame(&mut self) -> Flow {
        match self.frames.pop() {
            Some(Frame { kind: FrameKind::Enum { saved_target, .. }, .. }) => {
                self.target = saved_target;
                Flow::Next
            }
            Some(Frame { kind: FrameKind::Body, .. }) | None => Flow::End,
            Some(_) => Flow::Next,
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt, world: &mut dyn World) -> Result<Flow, VmError> {
        match stmt {
            Stmt::Command(instr) => self.exec_command(instr, world),
            Stmt::If { branches, otherwise, .. } => {
                for (cond, body) in branches {
                    if self.eval_condition(cond, world)? {
                        self.push(*body, FrameKind::Branch);
                        return Ok(Flow::Next);
                    }
                }
                if let Some(body) = otherwise {
                    self.push(*body, FrameKind::Branch);
                }
                Ok(Flow::Next)
            }
            Stmt::Loop { body, .. } => {
                self.push(*body, FrameKind::Loop);
                Ok(Flow::Next)
            }
            Stmt::Reps { count, body, .. } => {
                let remaining = self.eval(count, world)?.as_int()?;
                if remaining > 0 {
                    self.push(*body, FrameKind::Reps { remaining });
                }
                Ok(Flow::Next)
            }
            Stmt::Enum { family, genus, species, body, .. } => {
                let pattern = classifier_from(
                    self.eval(family, world)?.as_int()?,
                    self.eval(genus, world)?.as_int()?,
                    self.eval(species, world)?.as_int()?,
                )?;
                let mut candidates: VecDeque<AgentId> = world.find_agents(pattern).into();
                if let Some(first) = next_alive(&mut candidates, world) {
                    let saved_target = self.target;
                    self.target = Some(first);
                    self.push(*body, FrameKind::Enum { candidates, saved_target });
                }
                Ok(Flow::Next)
            }
            Stmt::Gosub { target, .. } => {
                if self.calls.len() >= self.max_call_depth {
                    return Err(VmError::Runtime(format!(
                        "subroutine call depth exceeded {}",
                        self.max_call_depth
                    )));
                }
                self.calls.push(self.frames.len());
                self.push(*target, FrameKind::Subroutine);
                Ok(Flow::Next)
            }
            Stmt::Return { .. } => self.return_from_subroutine(),
            // straight-line flow running into a SUBR ends the script
            Stmt::Stop { .. } | Stmt::Subroutine { .. } => Ok(Flow::End),
        }
    }

    fn exec_tail(&mut self, tail: &Tail, world: &mut dyn World) -> Result<Flow, VmError> {
        match tail {
            Tail::Fallthrough => Ok(self.pop_frame()),
            Tail::Until(cond) => {
                if self.eval_condition(cond, world)? {
                    Ok(self.pop_frame())
                } else {
                    self.restart_block();
                    Ok(Flow::Next)
                }
            }
            Tail::Ever => {
                self.restart_block();
                Ok(Flow::Next)
            }
            Tail::Repeat => {
                if let Some(Frame { kind: FrameKind::Reps { remaining }, pc, .. }) = self.frames.last_mut() {
                    *remaining -= 1;
                    if *remaining > 0 {
                        *pc = 0;
                        return Ok(Flow::Next);
                    }
                }
                Ok(self.pop_frame())
            }
            Tail::Next => {
                if let Some(Frame { kind: FrameKind::Enum { candidates, .. }, pc, .. }) = self.frames.last_mut() {
                    if let Some(agent) = next_alive(candidates, world) {
                        *pc = 0;
                        self.target = Some(agent);
                        return Ok(Flow::Next);
                    }
                }
                Ok(self.pop_frame())
            }
            Tail::Return => self.return_from_subroutine(),
        }
    }

    fn return_from_subroutine(&mut self) -> Result<Flow, VmError> {
        let depth = self
            .calls
            .pop()
            .ok_or_else(|| VmError::Name("RETN without a matching GSUB".to_string()))?;
        while self.frames.len() > depth {
            self.pop_frame();
        }
        Ok(Flow::Next)
    }

    fn exec_command(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<Flow, VmError> {
        if let Some(result) = self.try_variable_command(instr, world) {
            return result.map(|_| Flow::Next);
        }
        if let Some(result) = self.try_debug_command(instr, world) {
            return result;
        }
        if let Some(result) = self.try_agent_command(instr, world) {
            return result;
        }
        Err(VmError::Name(format!("{} cannot be used as a command", instr.op.name())))
    }

    // -----------------------------------------------------------------------
    // Operand evaluation
    // -----------------------------------------------------------------------

    pub(crate) fn eval(&mut self, operand: &Operand, world: &mut dyn World) -> Result<Value, VmError> {
        let value = match operand {
            Operand::Literal(Literal::Int(n)) => Value::Int(*n),
            Operand::Literal(Literal::Float(f)) => Value::Float(*f),
            Operand::Literal(Literal::Str(s)) => Value::String(s.clone()),
            Operand::Literal(Literal::Bytes(b)) => Value::Bytes(b.clone()),
            Operand::Label(s) => Value::String(s.clone()),
            Operand::Var(var) => self.read_var(*var, world)?,
            Operand::Call(call) => self.call_function(call, world)?,
            Operand::Condition(cond) => Value::Int(i32::from(self.eval_condition(cond, world)?)),
        };
        Ok(resolve_agent(value, world))
    }

    pub(crate) fn eval_condition(&mut self, cond: &Condition, world: &mut dyn World) -> Result<bool, VmError> {
        // every clause is evaluated; no short-circuiting
        let mut acc = self.eval_comparison(&cond.first, world)?;
        for (logic, cmp) in &cond.rest {
            let next = self.eval_comparison(cmp, world)?;
            acc = match logic {
                Logic::And => acc && next,
                Logic::Or => acc || next,
            };
        }
        Ok(acc)
    }

    fn eval_comparison(&mut self, cmp: &Comparison, world: &mut dyn World) -> Result<bool, VmError> {
        let lhs = self.eval(&cmp.lhs, world)?;
        let rhs = self.eval(&cmp.rhs, world)?;
        Ok(compare(&lhs, cmp.op, &rhs)?)
    }

    fn read_var(&self, var: VarRef, world: &mut dyn World) -> Result<Value, VmError> {
        match var {
            VarRef::Local(n) => Ok(self.locals.get(n)),
            VarRef::Target(n) => Ok(world.variable(self.require_target(world)?, i32::from(n))?),
            VarRef::Owner(n) => Ok(world.variable(self.require_owner(world)?, i32::from(n))?),
        }
    }

    pub(crate) fn require_target(&self, world: &dyn World) -> Result<AgentId, VmError> {
        self.target(world).ok_or(VmError::World(WorldError::NullAgent))
    }

    fn require_owner(&self, world: &dyn World) -> Result<AgentId, VmError> {
        self.owner.filter(|o| world.exists(*o)).ok_or(VmError::World(WorldError::NullAgent))
    }

    pub(crate) fn arg(&mut self, instr: &Instruction, index: usize, world: &mut dyn World) -> Result<Value, VmError> {
        let operand = instr.args.get(index).ok_or_else(|| {
            VmError::Runtime(format!("{} is missing argument {}", instr.op.name(), index + 1))
        })?;
        self.eval(operand, world)
    }

    pub(crate) fn arg_int(&mut self, instr: &Instruction, index: usize, world: &mut dyn World) -> Result<i32, VmError> {
        Ok(self.arg(instr, index, world)?.as_int()?)
    }

    pub(crate) fn arg_float(&mut self, instr: &Instruction, index: usize, world: &mut dyn World) -> Result<f32, VmError> {
        Ok(self.arg(instr, index, world)?.as_float()?)
    }

    pub(crate) fn arg_str(&mut self, instr: &Instruction, index: usize, world: &mut dyn World) -> Result<String, VmError> {
        match self.arg(instr, index, world)? {
            Value::String(s) => Ok(s),
            other => Err(ValueError::Mismatch { expected: "string", found: other.type_name() }.into()),
        }
    }

    pub(crate) fn arg_bytes(&mut self, instr: &Instruction, index: usize, world: &mut dyn World) -> Result<Vec<u8>, VmError> {
        match self.arg(instr, index, world)? {
            Value::Bytes(b) => Ok(b),
            other => Err(ValueError::Mismatch { expected: "byte-string", found: other.type_name() }.into()),
        }
    }

    pub(crate) fn arg_vector(&mut self, instr: &Instruction, index: usize, world: &mut dyn World) -> Result<Vec2, VmError> {
        Ok(self.arg(instr, index, world)?.as_vector()?)
    }

    /// The destination operand of an assignment-style command.
    pub(crate) fn dest<'a>(&self, instr: &'a Instruction, index: usize) -> Result<&'a Operand, VmError> {
        instr
            .args
            .get(index)
            .ok_or_else(|| VmError::Runtime(format!("{} is missing its destination", instr.op.name())))
    }

    pub(crate) fn arg_agent(
        &mut self,
        instr: &Instruction,
        index: usize,
        world: &mut dyn World,
    ) -> Result<Option<AgentId>, VmError> {
        Ok(self.arg(instr, index, world)?.as_agent()?)
    }

    // -----------------------------------------------------------------------
    // Assignment
    // -----------------------------------------------------------------------

    pub(crate) fn store(&mut self, dest: &Operand, value: Value, world: &mut dyn World) -> Result<(), VmError> {
        match dest {
            Operand::Var(VarRef::Local(n)) => {
                self.locals.set(*n, value);
                Ok(())
            }
            Operand::Var(VarRef::Target(n)) => {
                let target = self.require_target(world)?;
                Ok(world.set_variable(target, i32::from(*n), value)?)
            }
            Operand::Var(VarRef::Owner(n)) => {
                let owner = self.require_owner(world)?;
                Ok(world.set_variable(owner, i32::from(*n), value)?)
            }
            Operand::Call(call) => self.store_settable(call, value, world),
            _ => Err(VmError::Runtime("destination is not assignable".to_string())),
        }
    }
}

/// Dangling agent references read as NULL.
fn resolve_agent(value: Value, world: &dyn World) -> Value {
    match value {
        Value::Agent(Some(id)) if !world.exists(id) => Value::Agent(None),
        other => other,
    }
}

fn next_alive(candidates: &mut VecDeque<AgentId>, world: &dyn World) -> Option<AgentId> {
    while let Some(agent) = candidates.pop_front() {
        if world.exists(agent) {
            return Some(agent);
        }
    }
    None
}

pub(crate) fn classifier_from(family: i32, genus: i32, species: i32) -> Result<Classifier, VmError> {
    let out_of_range = || VmError::Runtime(format!("classifier {} {} {} out of range", family, genus, species));
    Ok(Classifier::new(
        u8::try_from(family).map_err(|_| out_of_range())?,
        u8::try_from(genus).map_err(|_| out_of_range())?,
        u16::try_from(species).map_err(|_| out_of_range())?,
    ))
}

fn tail_name(tail: &Tail) -> &'static str {
    match tail {
        Tail::Fallthrough => "end of block",
        Tail::Until(_) => "UNTL",
        Tail::Ever => "EVER",
        Tail::Repeat => "REPE",
        Tail::Next => "NEXT",
        Tail::Return => "RETN",
    }
}
