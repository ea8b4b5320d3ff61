//! Accessor interface between the VM and the simulation it scripts.
//!
//! The VM never owns agents. Every operation on the world goes through
//! [`World`], and every call may fail with a [`WorldError`].

use crate::values::{AgentId, Value, Vec2};
use caos_compiler::Classifier;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorldError {
    #[error("no such agent: {0}")]
    NoSuchAgent(AgentId),
    #[error("operation requires an agent but got NULL")]
    NullAgent,
    #[error("{agent} has no {direction:?} port {port}")]
    NoSuchPort { agent: AgentId, direction: PortDirection, port: i32 },
    #[error("{agent} already has a {direction:?} port {port}")]
    PortExists { agent: AgentId, direction: PortDirection, port: i32 },
    #[error("{agent} has no bundle {bundle} in direction {direction}")]
    NoSuchBundle { agent: AgentId, direction: i32, bundle: i32 },
    #[error("position ({x}, {y}) is outside the world")]
    InvalidGeometry { x: f32, y: f32 },
    #[error("variable slot {0} is out of range")]
    SlotOutOfRange(i32),
    #[error("{0} is not a vehicle")]
    NotAVehicle(AgentId),
    #[error("emission channel {0} is out of range")]
    NoSuchEmission(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    /// `0` selects inputs, anything else outputs.
    pub fn from_flag(flag: i32) -> Self {
        if flag == 0 {
            PortDirection::Input
        } else {
            PortDirection::Output
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AgentKind {
    #[default]
    Simple,
    /// Carries passengers inside a cabin.
    Vehicle,
}

/// Parameters for a new agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub kind: AgentKind,
    pub classifier: Classifier,
    pub sprite: String,
    pub image_count: i32,
    pub first_image: i32,
    pub plane: i32,
}

/// A vehicle's cabin, relative to its top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Cabin {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortSpec {
    pub x: i32,
    pub y: i32,
    pub name: String,
    pub description: String,
    /// Message number delivered to the owner when an input receives a signal.
    pub message: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Physics {
    pub accg: f32,
    pub elas: i32,
    pub fric: i32,
}

impl Default for Physics {
    fn default() -> Self {
        Self { accg: 0.3, elas: 0, fric: 100 }
    }
}

/// A queued message; its number selects the event script it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub from: Option<AgentId>,
    pub to: AgentId,
    pub message: i32,
    pub p1: Value,
    pub p2: Value,
}

/// Everything the VM may ask of the simulation.
pub trait World {
    // -- clock --
    fn tick(&self) -> u64;
    /// Advance one simulation tick: physics, timers, animations, delayed messages.
    fn advance(&mut self);

    // -- agents --
    fn exists(&self, agent: AgentId) -> bool;
    fn create_agent(&mut self, spec: AgentSpec) -> Result<AgentId, WorldError>;
    fn destroy_agent(&mut self, agent: AgentId) -> Result<(), WorldError>;
    /// Live agents in creation order.
    fn agents(&self) -> Vec<AgentId>;
    /// Live agents matching a (possibly wildcarded) classifier, in creation order.
    fn find_agents(&self, pattern: Classifier) -> Vec<AgentId>;
    fn classifier(&self, agent: AgentId) -> Result<Classifier, WorldError>;

    fn attributes(&self, agent: AgentId) -> Result<i32, WorldError>;
    fn set_attributes(&mut self, agent: AgentId, attr: i32) -> Result<(), WorldError>;
    fn behaviour(&self, agent: AgentId) -> Result<i32, WorldError>;
    fn set_behaviour(&mut self, agent: AgentId, bhvr: i32) -> Result<(), WorldError>;
    fn pose(&self, agent: AgentId) -> Result<i32, WorldError>;
    fn set_pose(&mut self, agent: AgentId, pose: i32) -> Result<(), WorldError>;
    /// Start an animation; `255` as the last frame loops it.
    fn set_animation(&mut self, agent: AgentId, frames: Vec<u8>) -> Result<(), WorldError>;
    fn animating(&self, agent: AgentId) -> Result<bool, WorldError>;
    /// Fire the timer event every `ticks` ticks; zero disarms it.
    fn set_timer(&mut self, agent: AgentId, ticks: i32) -> Result<(), WorldError>;

    fn variable(&self, agent: AgentId, slot: i32) -> Result<Value, WorldError>;
    fn set_variable(&mut self, agent: AgentId, slot: i32, value: Value) -> Result<(), WorldError>;

    // -- kinematics --
    /// Top-left corner.
    fn position(&self, agent: AgentId) -> Result<Vec2, WorldError>;
    fn size(&self, agent: AgentId) -> Result<Vec2, WorldError>;
    fn move_to(&mut self, agent: AgentId, top_left: Vec2) -> Result<(), WorldError>;
    fn velocity(&self, agent: AgentId) -> Result<Vec2, WorldError>;
    fn set_velocity(&mut self, agent: AgentId, velocity: Vec2) -> Result<(), WorldError>;
    fn physics(&self, agent: AgentId) -> Result<Physics, WorldError>;
    fn set_physics(&mut self, agent: AgentId, physics: Physics) -> Result<(), WorldError>;

    // -- vehicles --
    fn set_cabin(&mut self, vehicle: AgentId, cabin: Cabin) -> Result<(), WorldError>;
    /// Carry `passenger`, clipping it into the cabin unless the cabin is open-air.
    fn pick_up(&mut self, vehicle: AgentId, passenger: AgentId) -> Result<(), WorldError>;
    /// Release every passenger matching a (possibly wildcarded) classifier.
    fn drop_passengers(&mut self, vehicle: AgentId, pattern: Classifier) -> Result<(), WorldError>;
    /// Passenger by boarding order; `None` past the end.
    fn passenger(&self, vehicle: AgentId, index: i32) -> Result<Option<AgentId>, WorldError>;

    /// Set how much of a chemical the agent emits into its surroundings each tick.
    fn set_emission(&mut self, agent: AgentId, channel: i32, amount: f32) -> Result<(), WorldError>;
    /// Whether the pointer hovers over the world view rather than a window.
    fn pointer_over_world(&self) -> bool;

    // -- messaging --
    fn send_message(&mut self, message: Message, delay: u32) -> Result<(), WorldError>;
    /// Next message due for `agent`, if any.
    fn pop_message(&mut self, agent: AgentId) -> Option<Message>;

    // -- ports --
    fn create_port(
        &mut self,
        agent: AgentId,
        direction: PortDirection,
        id: i32,
        spec: PortSpec,
    ) -> Result<(), WorldError>;
    fn remove_port(&mut self, agent: AgentId, direction: PortDirection, id: i32) -> Result<(), WorldError>;
    fn port_count(&self, agent: AgentId, direction: PortDirection) -> Result<i32, WorldError>;
    fn join_ports(&mut self, source: AgentId, output: i32, dest: AgentId, input: i32) -> Result<(), WorldError>;
    fn break_port(&mut self, agent: AgentId, direction: PortDirection, id: i32) -> Result<(), WorldError>;
    /// Signal every input connected to `output`.
    fn send_on_port(&mut self, agent: AgentId, output: i32, data: Value) -> Result<(), WorldError>;
    /// Break each of the agent's connections with `strength` percent probability.
    fn bang(&mut self, agent: AgentId, strength: i32) -> Result<(), WorldError>;
    fn create_bundle(&mut self, agent: AgentId, direction: i32, bundle: i32, ports: Vec<u8>) -> Result<(), WorldError>;
    fn bundle(&self, agent: AgentId, direction: i32, bundle: i32) -> Result<Vec<u8>, WorldError>;
    fn remove_bundle(&mut self, agent: AgentId, direction: i32, bundle: i32) -> Result<(), WorldError>;
    fn bundle_count(&self, agent: AgentId, direction: i32) -> Result<i32, WorldError>;

    // -- globals --
    fn global(&self, name: &str) -> Value;
    fn set_global(&mut self, name: &str, value: Value);
    /// Uniform integer in `[min, max]`.
    fn random(&mut self, min: i32, max: i32) -> i32;

    /// A context owned by `agent` (or an ownerless one) was terminated by a fault.
    fn report_fault(&mut self, agent: Option<AgentId>, message: &str);
}
