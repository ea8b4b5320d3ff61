//! Script slots: the scheduler's bookkeeping around one execution context.
//!
//! Each running script instance is held in a [`ScriptSlot`], which pairs the
//! VM's [`ExecutionContext`] with an identity, the owning agent (if any), the
//! event that started it, and a coarse lifecycle status.

use caos_vm::values::AgentId;
use caos_vm::vm::{ContextState, ExecutionContext};
use std::fmt;

// ---------------------------------------------------------------------------
// ProcessId
// ---------------------------------------------------------------------------

/// A unique identifier for a script instance within one scheduler.
///
/// Ids are minted sequentially by the scheduler, never from global state, so
/// two schedulers fed the same inputs hand out the same ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Return the raw numeric value (useful for logging).
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", self.0)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pid:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ProcessStatus
// ---------------------------------------------------------------------------

/// The lifecycle state of a script instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Eligible to run on the next tick.
    Ready,
    /// Waiting for a future tick or an external event.
    Suspended,
    /// Reached the end of its script.
    Completed,
    /// Terminated by a fault.
    Failed,
    /// Its owner was destroyed.
    Cancelled,
}

impl ProcessStatus {
    pub fn is_live(self) -> bool {
        matches!(self, ProcessStatus::Ready | ProcessStatus::Suspended)
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessStatus::Ready => write!(f, "Ready"),
            ProcessStatus::Suspended => write!(f, "Suspended"),
            ProcessStatus::Completed => write!(f, "Completed"),
            ProcessStatus::Failed => write!(f, "Failed"),
            ProcessStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptSlot
// ---------------------------------------------------------------------------

/// One scheduled script instance.
#[derive(Debug, Clone)]
pub struct ScriptSlot {
    id: ProcessId,
    /// `None` for installer and removal scripts.
    owner: Option<AgentId>,
    /// Event number that started it, if it was started by a message.
    event: Option<i32>,
    status: ProcessStatus,
    pub(crate) context: ExecutionContext,
}

impl ScriptSlot {
    pub(crate) fn new(id: ProcessId, owner: Option<AgentId>, event: Option<i32>, context: ExecutionContext) -> Self {
        Self { id, owner, event, status: ProcessStatus::Ready, context }
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn owner(&self) -> Option<AgentId> {
        self.owner
    }

    pub fn event(&self) -> Option<i32> {
        self.event
    }

    pub fn status(&self) -> ProcessStatus {
        self.status
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    pub(crate) fn set_status(&mut self, status: ProcessStatus) {
        self.status = status;
    }

    /// Sync the coarse status with the context after a step.
    pub(crate) fn refresh(&mut self) {
        self.status = match self.context.state() {
            ContextState::Runnable => ProcessStatus::Ready,
            ContextState::SuspendedUntilTick(_) | ContextState::SuspendedOnExternalEvent(_) => {
                ProcessStatus::Suspended
            }
            ContextState::Halted if self.status == ProcessStatus::Failed => ProcessStatus::Failed,
            ContextState::Halted => ProcessStatus::Completed,
        };
    }
}

impl fmt::Display for ScriptSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.owner, self.event) {
            (Some(owner), Some(event)) => write!(f, "{} ({} event {})", self.id, owner, event),
            (Some(owner), None) => write!(f, "{} ({})", self.id, owner),
            (None, _) => write!(f, "{} (ownerless)", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id_display() {
        let id = ProcessId::new(42);
        assert_eq!(format!("{}", id), "pid:42");
        assert_eq!(format!("{:?}", id), "ProcessId(42)");
        assert_eq!(id.as_u64(), 42);
    }

    #[test]
    fn test_live_statuses() {
        assert!(ProcessStatus::Ready.is_live());
        assert!(ProcessStatus::Suspended.is_live());
        assert!(!ProcessStatus::Completed.is_live());
        assert!(!ProcessStatus::Failed.is_live());
        assert!(!ProcessStatus::Cancelled.is_live());
    }

    #[test]
    fn test_slot_display() {
        let script = caos_compiler::parse("c3", "stop").unwrap().installer;
        let slot = ScriptSlot::new(ProcessId::new(1), Some(AgentId(3)), Some(9), ExecutionContext::new(script, None));
        assert_eq!(slot.to_string(), "pid:1 (agent#3 event 9)");
        assert_eq!(slot.status(), ProcessStatus::Ready);
    }
}
