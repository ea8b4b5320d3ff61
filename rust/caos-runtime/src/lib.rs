//! CAOS runtime: a reference world, installed event scripts, and the
//! deterministic tick scheduler that drives execution contexts.

pub mod harness;
pub mod process;
pub mod scheduler;
pub mod scriptorium;
pub mod world;

pub use harness::{run_script, Harness, RunReport};
pub use process::{ProcessId, ProcessStatus, ScriptSlot};
pub use scheduler::{FaultReport, Scheduler, SchedulerConfig, TickReport};
pub use scriptorium::Scriptorium;
pub use world::{SimWorld, WorldConfig};
