//! Reference in-memory world.
//!
//! [`SimWorld`] is a small deterministic simulation that implements the VM's
//! [`World`] accessor trait: a creation-ordered agent table, per-agent
//! variables, simple floor physics, vehicles with passenger cabins, delayed
//! message queues and a port graph.
//! Randomness comes from a seeded `fastrand` generator so identical inputs
//! replay identically.

use caos_compiler::Classifier;
use caos_vm::values::{AgentId, Value, Vec2, VARIABLE_SLOTS};
use caos_vm::world::{AgentKind, AgentSpec, Cabin, Message, PortDirection, PortSpec, Physics, World, WorldError};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Message number delivered when an agent's `TICK` timer fires.
pub const TIMER_EVENT: i32 = 9;
/// Message number delivered once after `NEW: SIMP`.
pub const CONSTRUCTOR_EVENT: i32 = 10;

/// Attribute bit: a vehicle boards pickable agents that touch its cabin.
pub const ATTR_GREEDY_CABIN: i32 = 8;
/// Attribute bit: bounded by the room edges.
pub const ATTR_COLLISIONS: i32 = 64;
/// Attribute bit: subject to gravity and velocity.
pub const ATTR_PHYSICS: i32 = 128;
/// Attribute bit: passengers keep their position when boarding.
pub const ATTR_OPEN_AIR_CABIN: i32 = 512;

/// Behaviour bit: vehicles may pick the agent up.
pub const BHVR_PICKUP: i32 = 32;

/// Emission channels an agent can feed.
pub const EMISSION_CHANNELS: i32 = 20;

/// Speed under which a resting agent stops sliding.
const REST_SPEED: f32 = 0.1;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub seed: u64,
    pub width: f32,
    pub height: f32,
    /// Every sprite is treated as one frame of this size.
    pub sprite_width: f32,
    pub sprite_height: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self { seed: 0, width: 1000.0, height: 1000.0, sprite_width: 41.0, sprite_height: 18.0 }
    }
}

// ---------------------------------------------------------------------------
// Agent state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct InputPort {
    spec: PortSpec,
    source: Option<(AgentId, i32)>,
}

#[derive(Debug, Clone)]
struct OutputPort {
    name: String,
    links: Vec<(AgentId, i32)>,
}

#[derive(Debug, Clone, Default)]
struct Carriage {
    cabin: Cabin,
    passengers: Vec<AgentId>,
}

#[derive(Debug, Clone)]
struct AgentState {
    classifier: Classifier,
    sprite: String,
    attributes: i32,
    behaviour: i32,
    pose: i32,
    animation: Vec<u8>,
    frame: usize,
    timer: i32,
    countdown: i32,
    vars: Vec<Value>,
    position: Vec2,
    velocity: Vec2,
    physics: Physics,
    resting: bool,
    inputs: BTreeMap<i32, InputPort>,
    outputs: BTreeMap<i32, OutputPort>,
    bundles: BTreeMap<(i32, i32), Vec<u8>>,
    /// Present only on vehicles.
    carriage: Option<Carriage>,
    carried_by: Option<AgentId>,
    emissions: BTreeMap<i32, f32>,
}

impl AgentState {
    fn new(spec: AgentSpec) -> Self {
        Self {
            classifier: spec.classifier,
            sprite: spec.sprite,
            attributes: 0,
            behaviour: 0,
            pose: 0,
            animation: Vec::new(),
            frame: 0,
            timer: 0,
            countdown: 0,
            vars: vec![Value::Int(0); VARIABLE_SLOTS],
            position: Vec2::default(),
            velocity: Vec2::default(),
            physics: Physics::default(),
            resting: false,
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
            bundles: BTreeMap::new(),
            carriage: match spec.kind {
                AgentKind::Vehicle => Some(Carriage::default()),
                AgentKind::Simple => None,
            },
            carried_by: None,
            emissions: BTreeMap::new(),
        }
    }

    /// Advance the animation one frame; finished animations clear.
    fn animate(&mut self) {
        if self.animation.is_empty() {
            return;
        }
        if self.animation.get(self.frame) == Some(&ANIM_REPEAT) {
            self.frame = 0;
        }
        match self.animation.get(self.frame) {
            Some(&frame) if frame != ANIM_REPEAT => {
                self.pose = i32::from(frame);
                self.frame += 1;
                if self.frame >= self.animation.len() {
                    self.animation.clear();
                    self.frame = 0;
                }
            }
            _ => {
                self.animation.clear();
                self.frame = 0;
            }
        }
    }
}

const ANIM_REPEAT: u8 = 255;

#[derive(Debug, Clone)]
struct PendingMessage {
    due: u64,
    message: Message,
}

/// A fault reported against an agent's (or an ownerless) context.
#[derive(Debug, Clone, PartialEq)]
pub struct FaultRecord {
    pub tick: u64,
    pub agent: Option<AgentId>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// SimWorld
// ---------------------------------------------------------------------------

pub struct SimWorld {
    config: WorldConfig,
    tick: u64,
    next_id: u32,
    agents: BTreeMap<AgentId, AgentState>,
    queue: Vec<PendingMessage>,
    globals: HashMap<String, Value>,
    rng: fastrand::Rng,
    faults: Vec<FaultRecord>,
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new(WorldConfig::default())
    }
}

impl SimWorld {
    pub fn new(config: WorldConfig) -> Self {
        let rng = fastrand::Rng::with_seed(config.seed);
        Self {
            config,
            tick: 0,
            next_id: 1,
            agents: BTreeMap::new(),
            queue: Vec::new(),
            globals: HashMap::new(),
            rng,
            faults: Vec::new(),
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn sprite(&self, agent: AgentId) -> Option<&str> {
        self.agents.get(&agent).map(|a| a.sprite.as_str())
    }

    /// Faults reported so far, oldest first.
    pub fn faults(&self) -> &[FaultRecord] {
        &self.faults
    }

    /// Names of an agent's output ports, by port id.
    pub fn output_names(&self, agent: AgentId) -> Vec<(i32, String)> {
        self.agents
            .get(&agent)
            .map(|a| a.outputs.iter().map(|(id, p)| (*id, p.name.clone())).collect())
            .unwrap_or_default()
    }

    pub fn pending_messages(&self) -> usize {
        self.queue.len()
    }

    /// Amount last set by `EMIT` on a channel, zero when never set.
    pub fn emission(&self, agent: AgentId, channel: i32) -> f32 {
        self.agents
            .get(&agent)
            .and_then(|a| a.emissions.get(&channel).copied())
            .unwrap_or(0.0)
    }

    /// The vehicle currently carrying `agent`.
    pub fn carrier(&self, agent: AgentId) -> Option<AgentId> {
        self.agents.get(&agent).and_then(|a| a.carried_by)
    }

    fn agent(&self, id: AgentId) -> Result<&AgentState, WorldError> {
        self.agents.get(&id).ok_or(WorldError::NoSuchAgent(id))
    }

    fn agent_mut(&mut self, id: AgentId) -> Result<&mut AgentState, WorldError> {
        self.agents.get_mut(&id).ok_or(WorldError::NoSuchAgent(id))
    }

    fn slot(slot: i32) -> Result<usize, WorldError> {
        usize::try_from(slot)
            .ok()
            .filter(|s| *s < VARIABLE_SLOTS)
            .ok_or(WorldError::SlotOutOfRange(slot))
    }

    fn enqueue(&mut self, message: Message, delay: u32) {
        let due = self.tick + u64::from(delay);
        self.queue.push(PendingMessage { due, message });
    }

    fn sprite_size(&self) -> Vec2 {
        Vec2::new(self.config.sprite_width, self.config.sprite_height)
    }

    fn carriage(&self, vehicle: AgentId) -> Result<&Carriage, WorldError> {
        self.agent(vehicle)?.carriage.as_ref().ok_or(WorldError::NotAVehicle(vehicle))
    }

    fn carriage_mut(&mut self, vehicle: AgentId) -> Result<&mut Carriage, WorldError> {
        self.agent_mut(vehicle)?.carriage.as_mut().ok_or(WorldError::NotAVehicle(vehicle))
    }

    /// Top-left and bottom-right corners of a vehicle's cabin in world space.
    fn cabin_bounds(&self, vehicle: AgentId) -> Result<(Vec2, Vec2), WorldError> {
        let origin = self.agent(vehicle)?.position;
        let cabin = self.carriage(vehicle)?.cabin;
        Ok((origin + Vec2::new(cabin.left, cabin.top), origin + Vec2::new(cabin.right, cabin.bottom)))
    }

    /// Move `passenger` into `vehicle`, leaving any vehicle it rode before.
    fn board(&mut self, vehicle: AgentId, passenger: AgentId) -> Result<(), WorldError> {
        let (low, high) = self.cabin_bounds(vehicle)?;
        let open_air = self.agent(vehicle)?.attributes & ATTR_OPEN_AIR_CABIN != 0;
        let size = self.sprite_size();
        let previous = self.agent(passenger)?.carried_by;
        if let Some(previous) = previous {
            self.alight(previous, passenger);
        }
        let state = self.agent_mut(passenger)?;
        if !open_air {
            let p = state.position;
            state.position = Vec2::new(p.x.min(high.x - size.x).max(low.x), p.y.min(high.y - size.y).max(low.y));
        }
        state.carried_by = Some(vehicle);
        state.velocity = Vec2::default();
        self.carriage_mut(vehicle)?.passengers.push(passenger);
        debug!("{} boarded {}", passenger, vehicle);
        Ok(())
    }

    fn alight(&mut self, vehicle: AgentId, passenger: AgentId) {
        if let Some(carriage) = self.agents.get_mut(&vehicle).and_then(|a| a.carriage.as_mut()) {
            carriage.passengers.retain(|p| *p != passenger);
        }
        if let Some(state) = self.agents.get_mut(&passenger) {
            state.carried_by = None;
        }
    }

    /// Carry a vehicle's passengers along by `delta`.
    fn shift_passengers(&mut self, vehicle: AgentId, delta: Vec2) {
        let passengers = match self.agents.get(&vehicle).and_then(|a| a.carriage.as_ref()) {
            Some(carriage) => carriage.passengers.clone(),
            None => return,
        };
        for passenger in passengers {
            if let Some(state) = self.agents.get_mut(&passenger) {
                state.position = state.position + delta;
            }
        }
    }

    /// Greedy cabins board every loose pickable agent that overlaps them.
    fn greedy_pickups(&mut self) {
        let size = self.sprite_size();
        let vehicles: Vec<AgentId> = self
            .agents
            .iter()
            .filter(|(_, a)| a.carriage.is_some() && a.attributes & ATTR_GREEDY_CABIN != 0)
            .map(|(id, _)| *id)
            .collect();
        for vehicle in vehicles {
            let Ok((low, high)) = self.cabin_bounds(vehicle) else { continue };
            let boarding: Vec<AgentId> = self
                .agents
                .iter()
                .filter(|(id, a)| {
                    **id != vehicle
                        && a.carriage.is_none()
                        && a.carried_by.is_none()
                        && a.behaviour & BHVR_PICKUP != 0
                        && a.position.x < high.x
                        && a.position.x + size.x > low.x
                        && a.position.y < high.y
                        && a.position.y + size.y > low.y
                })
                .map(|(id, _)| *id)
                .collect();
            for passenger in boarding {
                if let Err(e) = self.board(vehicle, passenger) {
                    trace!("greedy pickup by {} failed: {}", vehicle, e);
                }
            }
        }
    }

    /// Gravity, velocity and room bounds for one agent.
    fn integrate(&self, agent: &mut AgentState) {
        let Physics { accg, elas, fric } = agent.physics;
        let mut v = agent.velocity;
        if agent.resting {
            if v.y < 0.0 {
                agent.resting = false;
            } else {
                v.y = 0.0;
                if v.x.abs() < REST_SPEED {
                    v.x = 0.0;
                }
            }
        }
        if !agent.resting {
            v.y += accg;
        }
        let mut p = agent.position + v;
        if agent.attributes & ATTR_COLLISIONS != 0 {
            let bounce = elas.clamp(0, 100) as f32 / 100.0;
            let size = self.sprite_size();
            let right = (self.config.width - size.x).max(0.0);
            let floor = (self.config.height - size.y).max(0.0);
            if p.x < 0.0 || p.x > right {
                p.x = p.x.clamp(0.0, right);
                v.x = -v.x * bounce;
            }
            if p.y < 0.0 {
                p.y = 0.0;
                v.y = -v.y * bounce;
            } else if p.y >= floor && !agent.resting {
                p.y = floor;
                v.y = -v.y * bounce;
                v.x *= (100 - fric.clamp(0, 100)) as f32 / 100.0;
                if v.y.abs() <= accg.abs().max(REST_SPEED) {
                    v.y = 0.0;
                    agent.resting = true;
                }
            }
        }
        agent.position = p;
        agent.velocity = v;
    }

    /// Remove every link that touches `agent`'s port, on both ends.
    fn unlink(&mut self, agent: AgentId, direction: PortDirection, id: i32) {
        match direction {
            PortDirection::Input => {
                let source = self
                    .agents
                    .get_mut(&agent)
                    .and_then(|a| a.inputs.get_mut(&id))
                    .and_then(|p| p.source.take());
                if let Some((src, out)) = source {
                    if let Some(port) = self.agents.get_mut(&src).and_then(|a| a.outputs.get_mut(&out)) {
                        port.links.retain(|l| *l != (agent, id));
                    }
                }
            }
            PortDirection::Output => {
                let links = self
                    .agents
                    .get_mut(&agent)
                    .and_then(|a| a.outputs.get_mut(&id))
                    .map(|p| std::mem::take(&mut p.links))
                    .unwrap_or_default();
                for (dest, input) in links {
                    if let Some(port) = self.agents.get_mut(&dest).and_then(|a| a.inputs.get_mut(&input)) {
                        port.source = None;
                    }
                }
            }
        }
    }

    /// Every connection of `agent` as (direction, port id).
    fn connections(&self, agent: AgentId) -> Vec<(PortDirection, i32)> {
        let Some(state) = self.agents.get(&agent) else {
            return Vec::new();
        };
        let inputs = state
            .inputs
            .iter()
            .filter(|(_, p)| p.source.is_some())
            .map(|(id, _)| (PortDirection::Input, *id));
        let outputs = state
            .outputs
            .iter()
            .filter(|(_, p)| !p.links.is_empty())
            .map(|(id, _)| (PortDirection::Output, *id));
        inputs.chain(outputs).collect()
    }
}

impl World for SimWorld {
    fn tick(&self) -> u64 {
        self.tick
    }

    fn advance(&mut self) {
        self.tick += 1;
        let ids: Vec<AgentId> = self.agents.keys().copied().collect();
        let mut timers = Vec::new();
        let mut moved = Vec::new();
        for id in ids {
            let Some(mut agent) = self.agents.remove(&id) else { continue };
            agent.animate();
            if agent.timer > 0 {
                agent.countdown -= 1;
                if agent.countdown <= 0 {
                    agent.countdown = agent.timer;
                    timers.push(id);
                }
            }
            if agent.attributes & ATTR_PHYSICS != 0 && agent.carried_by.is_none() {
                let before = agent.position;
                self.integrate(&mut agent);
                if agent.carriage.is_some() {
                    moved.push((id, agent.position - before));
                }
            }
            self.agents.insert(id, agent);
        }
        for (vehicle, delta) in moved {
            self.shift_passengers(vehicle, delta);
        }
        self.greedy_pickups();
        for id in timers {
            self.enqueue(Message { from: None, to: id, message: TIMER_EVENT, p1: Value::Int(0), p2: Value::Int(0) }, 0);
        }
        trace!("world tick {}", self.tick);
    }

    fn exists(&self, agent: AgentId) -> bool {
        self.agents.contains_key(&agent)
    }

    fn create_agent(&mut self, spec: AgentSpec) -> Result<AgentId, WorldError> {
        let id = AgentId(self.next_id);
        self.next_id += 1;
        debug!("created {} {} \"{}\"", id, spec.classifier, spec.sprite);
        self.agents.insert(id, AgentState::new(spec));
        self.enqueue(
            Message { from: None, to: id, message: CONSTRUCTOR_EVENT, p1: Value::Int(0), p2: Value::Int(0) },
            0,
        );
        Ok(id)
    }

    fn destroy_agent(&mut self, agent: AgentId) -> Result<(), WorldError> {
        for (direction, id) in self.connections(agent) {
            self.unlink(agent, direction, id);
        }
        let state = self.agents.remove(&agent).ok_or(WorldError::NoSuchAgent(agent))?;
        if let Some(vehicle) = state.carried_by {
            self.alight(vehicle, agent);
        }
        for passenger in state.carriage.map(|c| c.passengers).unwrap_or_default() {
            if let Some(p) = self.agents.get_mut(&passenger) {
                p.carried_by = None;
            }
        }
        self.queue.retain(|m| m.message.to != agent);
        debug!("destroyed {}", agent);
        Ok(())
    }

    fn agents(&self) -> Vec<AgentId> {
        self.agents.keys().copied().collect()
    }

    fn find_agents(&self, pattern: Classifier) -> Vec<AgentId> {
        self.agents
            .iter()
            .filter(|(_, a)| pattern.matches(&a.classifier))
            .map(|(id, _)| *id)
            .collect()
    }

    fn classifier(&self, agent: AgentId) -> Result<Classifier, WorldError> {
        Ok(self.agent(agent)?.classifier)
    }

    fn attributes(&self, agent: AgentId) -> Result<i32, WorldError> {
        Ok(self.agent(agent)?.attributes)
    }

    fn set_attributes(&mut self, agent: AgentId, attr: i32) -> Result<(), WorldError> {
        self.agent_mut(agent)?.attributes = attr;
        Ok(())
    }

    fn behaviour(&self, agent: AgentId) -> Result<i32, WorldError> {
        Ok(self.agent(agent)?.behaviour)
    }

    fn set_behaviour(&mut self, agent: AgentId, bhvr: i32) -> Result<(), WorldError> {
        self.agent_mut(agent)?.behaviour = bhvr;
        Ok(())
    }

    fn pose(&self, agent: AgentId) -> Result<i32, WorldError> {
        Ok(self.agent(agent)?.pose)
    }

    fn set_pose(&mut self, agent: AgentId, pose: i32) -> Result<(), WorldError> {
        let state = self.agent_mut(agent)?;
        state.pose = pose;
        state.animation.clear();
        Ok(())
    }

    fn set_animation(&mut self, agent: AgentId, frames: Vec<u8>) -> Result<(), WorldError> {
        let state = self.agent_mut(agent)?;
        state.animation = frames;
        state.frame = 0;
        Ok(())
    }

    fn animating(&self, agent: AgentId) -> Result<bool, WorldError> {
        Ok(!self.agent(agent)?.animation.is_empty())
    }

    fn set_timer(&mut self, agent: AgentId, ticks: i32) -> Result<(), WorldError> {
        let state = self.agent_mut(agent)?;
        state.timer = ticks.max(0);
        state.countdown = state.timer;
        Ok(())
    }

    fn variable(&self, agent: AgentId, slot: i32) -> Result<Value, WorldError> {
        let index = Self::slot(slot)?;
        Ok(self.agent(agent)?.vars[index].clone())
    }

    fn set_variable(&mut self, agent: AgentId, slot: i32, value: Value) -> Result<(), WorldError> {
        let index = Self::slot(slot)?;
        self.agent_mut(agent)?.vars[index] = value;
        Ok(())
    }

    fn position(&self, agent: AgentId) -> Result<Vec2, WorldError> {
        Ok(self.agent(agent)?.position)
    }

    fn size(&self, agent: AgentId) -> Result<Vec2, WorldError> {
        self.agent(agent)?;
        Ok(self.sprite_size())
    }

    fn move_to(&mut self, agent: AgentId, top_left: Vec2) -> Result<(), WorldError> {
        let Vec2 { x, y } = top_left;
        let inside = x.is_finite()
            && y.is_finite()
            && (0.0..=self.config.width).contains(&x)
            && (0.0..=self.config.height).contains(&y);
        if !inside {
            return Err(WorldError::InvalidGeometry { x, y });
        }
        let state = self.agent_mut(agent)?;
        let delta = top_left - state.position;
        state.position = top_left;
        state.resting = false;
        if state.carriage.is_some() {
            self.shift_passengers(agent, delta);
        }
        Ok(())
    }

    fn velocity(&self, agent: AgentId) -> Result<Vec2, WorldError> {
        Ok(self.agent(agent)?.velocity)
    }

    fn set_velocity(&mut self, agent: AgentId, velocity: Vec2) -> Result<(), WorldError> {
        self.agent_mut(agent)?.velocity = velocity;
        Ok(())
    }

    fn physics(&self, agent: AgentId) -> Result<Physics, WorldError> {
        Ok(self.agent(agent)?.physics)
    }

    fn set_physics(&mut self, agent: AgentId, physics: Physics) -> Result<(), WorldError> {
        self.agent_mut(agent)?.physics = physics;
        Ok(())
    }

    fn set_cabin(&mut self, vehicle: AgentId, cabin: Cabin) -> Result<(), WorldError> {
        self.carriage_mut(vehicle)?.cabin = cabin;
        Ok(())
    }

    fn pick_up(&mut self, vehicle: AgentId, passenger: AgentId) -> Result<(), WorldError> {
        self.carriage(vehicle)?;
        let rider = self.agent(passenger)?;
        if passenger == vehicle || rider.carried_by == Some(vehicle) {
            trace!("{} is already aboard {}", passenger, vehicle);
            return Ok(());
        }
        self.board(vehicle, passenger)
    }

    fn drop_passengers(&mut self, vehicle: AgentId, pattern: Classifier) -> Result<(), WorldError> {
        let leaving: Vec<AgentId> = self
            .carriage(vehicle)?
            .passengers
            .iter()
            .copied()
            .filter(|p| self.agents.get(p).is_some_and(|a| pattern.matches(&a.classifier)))
            .collect();
        for passenger in leaving {
            self.alight(vehicle, passenger);
        }
        Ok(())
    }

    fn passenger(&self, vehicle: AgentId, index: i32) -> Result<Option<AgentId>, WorldError> {
        let passengers = &self.carriage(vehicle)?.passengers;
        Ok(usize::try_from(index).ok().and_then(|i| passengers.get(i).copied()))
    }

    fn set_emission(&mut self, agent: AgentId, channel: i32, amount: f32) -> Result<(), WorldError> {
        if !(0..EMISSION_CHANNELS).contains(&channel) {
            return Err(WorldError::NoSuchEmission(channel));
        }
        let emissions = &mut self.agent_mut(agent)?.emissions;
        if amount == 0.0 {
            emissions.remove(&channel);
        } else {
            emissions.insert(channel, amount);
        }
        Ok(())
    }

    fn pointer_over_world(&self) -> bool {
        false
    }

    fn send_message(&mut self, message: Message, delay: u32) -> Result<(), WorldError> {
        self.agent(message.to)?;
        self.enqueue(message, delay);
        Ok(())
    }

    fn pop_message(&mut self, agent: AgentId) -> Option<Message> {
        let tick = self.tick;
        let index = self.queue.iter().position(|m| m.message.to == agent && m.due <= tick)?;
        Some(self.queue.remove(index).message)
    }

    fn create_port(
        &mut self,
        agent: AgentId,
        direction: PortDirection,
        id: i32,
        spec: PortSpec,
    ) -> Result<(), WorldError> {
        let state = self.agent_mut(agent)?;
        let exists = match direction {
            PortDirection::Input => state.inputs.contains_key(&id),
            PortDirection::Output => state.outputs.contains_key(&id),
        };
        if exists {
            return Err(WorldError::PortExists { agent, direction, port: id });
        }
        match direction {
            PortDirection::Input => {
                state.inputs.insert(id, InputPort { spec, source: None });
            }
            PortDirection::Output => {
                state.outputs.insert(id, OutputPort { name: spec.name, links: Vec::new() });
            }
        }
        Ok(())
    }

    fn remove_port(&mut self, agent: AgentId, direction: PortDirection, id: i32) -> Result<(), WorldError> {
        self.break_port(agent, direction, id)?;
        let state = self.agent_mut(agent)?;
        match direction {
            PortDirection::Input => state.inputs.remove(&id).map(|_| ()),
            PortDirection::Output => state.outputs.remove(&id).map(|_| ()),
        }
        .ok_or(WorldError::NoSuchPort { agent, direction, port: id })
    }

    fn port_count(&self, agent: AgentId, direction: PortDirection) -> Result<i32, WorldError> {
        let state = self.agent(agent)?;
        Ok(match direction {
            PortDirection::Input => state.inputs.len(),
            PortDirection::Output => state.outputs.len(),
        } as i32)
    }

    fn join_ports(&mut self, source: AgentId, output: i32, dest: AgentId, input: i32) -> Result<(), WorldError> {
        if !self.agent(source)?.outputs.contains_key(&output) {
            return Err(WorldError::NoSuchPort { agent: source, direction: PortDirection::Output, port: output });
        }
        if !self.agent(dest)?.inputs.contains_key(&input) {
            return Err(WorldError::NoSuchPort { agent: dest, direction: PortDirection::Input, port: input });
        }
        // an input has at most one source
        self.unlink(dest, PortDirection::Input, input);
        if let Some(port) = self.agents.get_mut(&dest).and_then(|a| a.inputs.get_mut(&input)) {
            port.source = Some((source, output));
        }
        if let Some(port) = self.agents.get_mut(&source).and_then(|a| a.outputs.get_mut(&output)) {
            port.links.push((dest, input));
        }
        Ok(())
    }

    fn break_port(&mut self, agent: AgentId, direction: PortDirection, id: i32) -> Result<(), WorldError> {
        let state = self.agent(agent)?;
        let exists = match direction {
            PortDirection::Input => state.inputs.contains_key(&id),
            PortDirection::Output => state.outputs.contains_key(&id),
        };
        if !exists {
            return Err(WorldError::NoSuchPort { agent, direction, port: id });
        }
        self.unlink(agent, direction, id);
        Ok(())
    }

    fn send_on_port(&mut self, agent: AgentId, output: i32, data: Value) -> Result<(), WorldError> {
        let links = self
            .agent(agent)?
            .outputs
            .get(&output)
            .map(|p| p.links.clone())
            .ok_or(WorldError::NoSuchPort { agent, direction: PortDirection::Output, port: output })?;
        for (dest, input) in links {
            let number = self
                .agents
                .get(&dest)
                .and_then(|a| a.inputs.get(&input))
                .map(|p| p.spec.message);
            if let Some(number) = number {
                let message = Message { from: Some(agent), to: dest, message: number, p1: data.clone(), p2: Value::Int(input) };
                self.enqueue(message, 0);
            }
        }
        Ok(())
    }

    fn bang(&mut self, agent: AgentId, strength: i32) -> Result<(), WorldError> {
        self.agent(agent)?;
        for (direction, id) in self.connections(agent) {
            if self.rng.i32(0..100) < strength {
                self.unlink(agent, direction, id);
            }
        }
        Ok(())
    }

    fn create_bundle(&mut self, agent: AgentId, direction: i32, bundle: i32, ports: Vec<u8>) -> Result<(), WorldError> {
        self.agent_mut(agent)?.bundles.insert((direction, bundle), ports);
        Ok(())
    }

    fn bundle(&self, agent: AgentId, direction: i32, bundle: i32) -> Result<Vec<u8>, WorldError> {
        self.agent(agent)?
            .bundles
            .get(&(direction, bundle))
            .cloned()
            .ok_or(WorldError::NoSuchBundle { agent, direction, bundle })
    }

    fn remove_bundle(&mut self, agent: AgentId, direction: i32, bundle: i32) -> Result<(), WorldError> {
        self.agent_mut(agent)?
            .bundles
            .remove(&(direction, bundle))
            .map(|_| ())
            .ok_or(WorldError::NoSuchBundle { agent, direction, bundle })
    }

    fn bundle_count(&self, agent: AgentId, direction: i32) -> Result<i32, WorldError> {
        Ok(self.agent(agent)?.bundles.keys().filter(|(d, _)| *d == direction).count() as i32)
    }

    fn global(&self, name: &str) -> Value {
        self.globals.get(name).cloned().unwrap_or_default()
    }

    fn set_global(&mut self, name: &str, value: Value) {
        self.globals.insert(name.to_string(), value);
    }

    fn random(&mut self, min: i32, max: i32) -> i32 {
        if min >= max {
            return min;
        }
        self.rng.i32(min..=max)
    }

    fn report_fault(&mut self, agent: Option<AgentId>, message: &str) {
        self.faults.push(FaultRecord { tick: self.tick, agent, message: message.to_string() });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(world: &mut SimWorld, kind: AgentKind, family: u8, genus: u8, species: u16) -> AgentId {
        world
            .create_agent(AgentSpec {
                kind,
                classifier: Classifier::new(family, genus, species),
                sprite: "blnk".into(),
                image_count: 2,
                first_image: 0,
                plane: 0,
            })
            .unwrap()
    }

    fn spawn(world: &mut SimWorld, family: u8, genus: u8, species: u16) -> AgentId {
        create(world, AgentKind::Simple, family, genus, species)
    }

    fn vehicle(world: &mut SimWorld, cabin: Cabin) -> AgentId {
        let id = create(world, AgentKind::Vehicle, 3, 2, 1);
        world.set_cabin(id, cabin).unwrap();
        id
    }

    #[test]
    fn test_ids_are_monotonic_and_never_reused() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 3, 2, 1);
        world.destroy_agent(a).unwrap();
        let b = spawn(&mut world, 3, 2, 1);
        assert!(b > a);
        assert!(!world.exists(a));
    }

    #[test]
    fn test_find_agents_wildcards_in_creation_order() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 3, 2, 1);
        let _ = spawn(&mut world, 4, 1, 1);
        let c = spawn(&mut world, 3, 5, 9);
        assert_eq!(world.find_agents(Classifier::new(3, 0, 0)), vec![a, c]);
        assert_eq!(world.find_agents(Classifier::new(0, 0, 0)).len(), 3);
    }

    #[test]
    fn test_constructor_message_is_queued() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 1, 1, 1);
        let msg = world.pop_message(a).unwrap();
        assert_eq!(msg.message, CONSTRUCTOR_EVENT);
        assert!(world.pop_message(a).is_none());
    }

    #[test]
    fn test_delayed_messages_wait_for_their_tick() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 1, 1, 1);
        world.pop_message(a);
        let msg = Message { from: None, to: a, message: 1000, p1: Value::Int(0), p2: Value::Int(0) };
        world.send_message(msg, 2).unwrap();
        assert!(world.pop_message(a).is_none());
        world.advance();
        assert!(world.pop_message(a).is_none());
        world.advance();
        assert_eq!(world.pop_message(a).unwrap().message, 1000);
    }

    #[test]
    fn test_timer_fires_every_n_ticks() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 1, 1, 1);
        world.pop_message(a);
        world.set_timer(a, 2).unwrap();
        world.advance();
        assert!(world.pop_message(a).is_none());
        world.advance();
        assert_eq!(world.pop_message(a).unwrap().message, TIMER_EVENT);
    }

    #[test]
    fn test_animation_does_not_change_pose_until_tick() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 1, 1, 1);
        world.set_pose(a, 1).unwrap();
        world.set_animation(a, vec![0]).unwrap();
        assert_eq!(world.pose(a).unwrap(), 1);
        assert!(world.animating(a).unwrap());
        world.advance();
        assert_eq!(world.pose(a).unwrap(), 0);
        assert!(!world.animating(a).unwrap());
    }

    #[test]
    fn test_repeating_animation_keeps_running() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 1, 1, 1);
        world.set_animation(a, vec![1, 2, ANIM_REPEAT]).unwrap();
        for _ in 0..5 {
            world.advance();
        }
        assert!(world.animating(a).unwrap());
    }

    #[test]
    fn test_landing_applies_friction_once() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 3, 2, 1);
        world.set_attributes(a, 195).unwrap();
        world.set_physics(a, Physics { accg: 1.0, elas: 0, fric: 50 }).unwrap();
        world.move_to(a, Vec2::new(100.0, 100.0)).unwrap();
        world.set_velocity(a, Vec2::new(10.0, 0.0)).unwrap();
        for _ in 0..101 {
            world.advance();
        }
        let v = world.velocity(a).unwrap();
        assert_eq!(v.y, 0.0);
        assert!(v.x > 4.0 && v.x < 6.0, "velx {}", v.x);
    }

    #[test]
    fn test_ports_join_send_and_break() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 1, 1, 1);
        let b = spawn(&mut world, 1, 1, 2);
        world.pop_message(a);
        world.pop_message(b);
        let spec = |message| PortSpec { x: 0, y: 0, name: "p".into(), description: "d".into(), message };
        world.create_port(a, PortDirection::Output, 0, spec(0)).unwrap();
        world.create_port(b, PortDirection::Input, 0, spec(100)).unwrap();
        world.join_ports(a, 0, b, 0).unwrap();
        world.send_on_port(a, 0, Value::Int(7)).unwrap();
        let msg = world.pop_message(b).unwrap();
        assert_eq!((msg.message, msg.p1, msg.from), (100, Value::Int(7), Some(a)));

        world.bang(a, 100).unwrap();
        world.send_on_port(a, 0, Value::Int(7)).unwrap();
        assert!(world.pop_message(b).is_none());
        assert!(matches!(world.send_on_port(a, 9, Value::Int(0)), Err(WorldError::NoSuchPort { .. })));
    }

    #[test]
    fn test_bundles() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 1, 1, 1);
        world.create_bundle(a, 1, 1, vec![0, 1, 2]).unwrap();
        assert_eq!(world.bundle_count(a, 1).unwrap(), 1);
        assert_eq!(world.bundle(a, 1, 1).unwrap(), vec![0, 1, 2]);
        world.remove_bundle(a, 1, 1).unwrap();
        assert_eq!(world.bundle_count(a, 1).unwrap(), 0);
    }

    #[test]
    fn test_seeded_random_is_deterministic() {
        let mut one = SimWorld::new(WorldConfig { seed: 7, ..WorldConfig::default() });
        let mut two = SimWorld::new(WorldConfig { seed: 7, ..WorldConfig::default() });
        let a: Vec<i32> = (0..10).map(|_| one.random(-5, 5)).collect();
        let b: Vec<i32> = (0..10).map(|_| two.random(-5, 5)).collect();
        assert_eq!(a, b);
        assert!(a.iter().all(|n| (-5..=5).contains(n)));
    }

    #[test]
    fn test_boarding_clips_into_closed_cabins() {
        let mut world = SimWorld::default();
        let car = vehicle(&mut world, Cabin { left: 0.0, top: 0.0, right: 100.0, bottom: 100.0 });
        world.move_to(car, Vec2::new(10.0, 10.0)).unwrap();
        let rider = spawn(&mut world, 2, 1, 1);
        world.move_to(rider, Vec2::new(200.0, 5.0)).unwrap();
        world.pick_up(car, rider).unwrap();
        assert_eq!(world.position(rider).unwrap(), Vec2::new(69.0, 10.0));
        assert_eq!(world.passenger(car, 0).unwrap(), Some(rider));
        assert_eq!(world.passenger(car, 1).unwrap(), None);
        assert_eq!(world.passenger(car, -1).unwrap(), None);
        assert_eq!(world.carrier(rider), Some(car));
    }

    #[test]
    fn test_open_air_cabins_leave_passengers_in_place() {
        let mut world = SimWorld::default();
        let car = vehicle(&mut world, Cabin { left: 0.0, top: 0.0, right: 100.0, bottom: 100.0 });
        world.set_attributes(car, ATTR_OPEN_AIR_CABIN).unwrap();
        let rider = spawn(&mut world, 2, 1, 1);
        world.move_to(rider, Vec2::new(300.0, 300.0)).unwrap();
        world.pick_up(car, rider).unwrap();
        assert_eq!(world.position(rider).unwrap(), Vec2::new(300.0, 300.0));
    }

    #[test]
    fn test_passengers_ride_along() {
        let mut world = SimWorld::default();
        let car = vehicle(&mut world, Cabin { left: 0.0, top: 0.0, right: 200.0, bottom: 200.0 });
        let rider = spawn(&mut world, 2, 1, 1);
        world.move_to(rider, Vec2::new(20.0, 20.0)).unwrap();
        world.pick_up(car, rider).unwrap();
        world.move_to(car, Vec2::new(100.0, 50.0)).unwrap();
        assert_eq!(world.position(rider).unwrap(), Vec2::new(120.0, 70.0));

        world.set_attributes(car, ATTR_PHYSICS).unwrap();
        world.set_attributes(rider, ATTR_PHYSICS).unwrap();
        world.advance();
        let fallen = world.position(car).unwrap().y - 50.0;
        assert!(fallen > 0.0);
        assert_eq!(world.position(rider).unwrap().y, 70.0 + fallen);
    }

    #[test]
    fn test_greedy_cabins_pick_up_on_tick() {
        let mut world = SimWorld::default();
        let car = vehicle(&mut world, Cabin { left: 0.0, top: 0.0, right: 200.0, bottom: 200.0 });
        world.set_attributes(car, ATTR_GREEDY_CABIN).unwrap();
        world.move_to(car, Vec2::new(100.0, 100.0)).unwrap();
        let pickable = spawn(&mut world, 2, 1, 1);
        world.set_behaviour(pickable, BHVR_PICKUP).unwrap();
        world.move_to(pickable, Vec2::new(150.0, 150.0)).unwrap();
        let stubborn = spawn(&mut world, 2, 1, 2);
        world.move_to(stubborn, Vec2::new(150.0, 150.0)).unwrap();
        let distant = spawn(&mut world, 2, 1, 3);
        world.set_behaviour(distant, BHVR_PICKUP).unwrap();
        world.move_to(distant, Vec2::new(900.0, 900.0)).unwrap();

        world.advance();
        assert_eq!(world.passenger(car, 0).unwrap(), Some(pickable));
        assert_eq!(world.passenger(car, 1).unwrap(), None);
        assert_eq!(world.carrier(stubborn), None);
        assert_eq!(world.carrier(distant), None);
    }

    #[test]
    fn test_dropping_and_destroying_release_passengers() {
        let mut world = SimWorld::default();
        let car = vehicle(&mut world, Cabin { left: 0.0, top: 0.0, right: 200.0, bottom: 200.0 });
        let a = spawn(&mut world, 2, 1, 1);
        let b = spawn(&mut world, 2, 2, 1);
        let c = spawn(&mut world, 2, 2, 2);
        for rider in [a, b, c] {
            world.pick_up(car, rider).unwrap();
        }
        world.drop_passengers(car, Classifier::new(2, 2, 0)).unwrap();
        assert_eq!(world.passenger(car, 0).unwrap(), Some(a));
        assert_eq!(world.passenger(car, 1).unwrap(), None);
        assert_eq!(world.carrier(b), None);

        world.pick_up(car, b).unwrap();
        world.destroy_agent(a).unwrap();
        assert_eq!(world.passenger(car, 0).unwrap(), Some(b));
        world.destroy_agent(car).unwrap();
        assert_eq!(world.carrier(b), None);
    }

    #[test]
    fn test_vehicle_commands_need_a_vehicle() {
        let mut world = SimWorld::default();
        let plain = spawn(&mut world, 2, 1, 1);
        let other = spawn(&mut world, 2, 1, 2);
        assert_eq!(world.pick_up(plain, other), Err(WorldError::NotAVehicle(plain)));
        assert_eq!(world.passenger(plain, 0), Err(WorldError::NotAVehicle(plain)));
        assert_eq!(world.set_cabin(plain, Cabin::default()), Err(WorldError::NotAVehicle(plain)));
    }

    #[test]
    fn test_emissions() {
        let mut world = SimWorld::default();
        let a = spawn(&mut world, 2, 1, 1);
        world.set_emission(a, 3, 0.5).unwrap();
        assert_eq!(world.emission(a, 3), 0.5);
        world.set_emission(a, 3, 0.0).unwrap();
        assert_eq!(world.emission(a, 3), 0.0);
        assert_eq!(world.set_emission(a, EMISSION_CHANNELS, 1.0), Err(WorldError::NoSuchEmission(EMISSION_CHANNELS)));
        assert_eq!(world.set_emission(a, -1, 1.0), Err(WorldError::NoSuchEmission(-1)));
    }
}
