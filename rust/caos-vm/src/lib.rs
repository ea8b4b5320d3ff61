//! CAOS VM: resumable execution contexts over a pluggable world.
//!
//! The VM interprets parsed scripts from `caos-compiler`. It owns no agents:
//! everything it does to the simulation goes through the [`world::World`]
//! trait, which `caos-runtime` implements.

pub mod values;
pub mod vm;
pub mod world;

pub use values::{AgentId, Value, Vec2};
pub use vm::{
    AssertionFailure, ContextState, ExecutionContext, ExternalEvent, ScriptFault, StepResult, SuspendReason,
    VmError,
};
pub use world::{World, WorldError};
