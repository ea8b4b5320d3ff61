//! Agent, kinematic, vehicle, messaging and port commands.

use super::*;
use crate::world::{AgentKind, AgentSpec, Cabin, Message, PortDirection, PortSpec};
use caos_compiler::compiler::dialect::Family;
use caos_compiler::compiler::opcodes::Opcode;
use log::warn;

/// Frame byte that loops a classic animation.
const ANIM_REPEAT: u8 = 255;

impl ExecutionContext {
    pub(super) fn try_agent_command(
        &mut self,
        instr: &Instruction,
        world: &mut dyn World,
    ) -> Option<Result<Flow, VmError>> {
        let result = match instr.op {
            Opcode::NewSimp | Opcode::NewSimpClassic | Opcode::NewVhcl => self.new_agent(instr, world),
            Opcode::Kill => self.arg_agent(instr, 0, world).and_then(|agent| {
                let agent = agent.ok_or(WorldError::NullAgent)?;
                Ok(world.destroy_agent(agent)?)
            }),
            Opcode::Targ => self.arg_agent(instr, 0, world).map(|agent| self.target = agent),
            Opcode::Rtar => self.random_target(instr, world),
            Opcode::Attr => self.with_target_int(instr, world, |w, t, n| w.set_attributes(t, n)),
            Opcode::Bhvr => self.with_target_int(instr, world, |w, t, n| w.set_behaviour(t, n)),
            Opcode::Pose => self.with_target_int(instr, world, |w, t, n| w.set_pose(t, n)),
            Opcode::Tick => self.with_target_int(instr, world, |w, t, n| w.set_timer(t, n)),
            Opcode::Elas => self.with_target_int(instr, world, |w, t, n| {
                let mut physics = w.physics(t)?;
                physics.elas = n;
                w.set_physics(t, physics)
            }),
            Opcode::Fric => self.with_target_int(instr, world, |w, t, n| {
                let mut physics = w.physics(t)?;
                physics.fric = n;
                w.set_physics(t, physics)
            }),
            Opcode::Accg => self.arg_float(instr, 0, world).and_then(|accg| {
                let target = self.require_target(world)?;
                let mut physics = world.physics(target)?;
                physics.accg = accg;
                Ok(world.set_physics(target, physics)?)
            }),
            Opcode::Anim => self.animate(instr, world),
            Opcode::Mvto | Opcode::Mvby => self.move_target(instr, world),
            Opcode::MesgWrit | Opcode::MesgWrtp => self.write_message(instr, world),
            Opcode::PrtInew | Opcode::PrtOnew => self.new_port(instr, world),
            Opcode::PrtIzap | Opcode::PrtOzap => self.arg_int(instr, 0, world).and_then(|id| {
                let target = self.require_target(world)?;
                let direction = match instr.op {
                    Opcode::PrtIzap => PortDirection::Input,
                    _ => PortDirection::Output,
                };
                Ok(world.remove_port(target, direction, id)?)
            }),
            Opcode::PrtJoin => self.join_ports(instr, world),
            Opcode::PrtKrak => self.break_port(instr, world),
            Opcode::PrtSend => self.send_on_port(instr, world),
            Opcode::PrtBang => self.with_target_int(instr, world, |w, t, n| w.bang(t, n)),
            Opcode::PrtBnew => self.new_bundle(instr, world),
            Opcode::PrtBzap => self.arg_int(instr, 0, world).and_then(|direction| {
                let bundle = self.arg_int(instr, 1, world)?;
                let target = self.require_target(world)?;
                Ok(world.remove_bundle(target, direction, bundle)?)
            }),
            Opcode::Emit => self.arg_int(instr, 0, world).and_then(|channel| {
                let amount = self.arg_float(instr, 1, world)?;
                let target = self.require_target(world)?;
                Ok(world.set_emission(target, channel, amount)?)
            }),
            Opcode::Cabn => self.set_cabin(instr, world),
            Opcode::Spas => self.arg_agent(instr, 0, world).and_then(|vehicle| {
                let vehicle = vehicle.ok_or(WorldError::NullAgent)?;
                let passenger = self.arg_agent(instr, 1, world)?.ok_or(WorldError::NullAgent)?;
                Ok(world.pick_up(vehicle, passenger)?)
            }),
            Opcode::Dpas => self.pattern(instr, 0, world).and_then(|pattern| {
                let target = self.require_target(world)?;
                Ok(world.drop_passengers(target, pattern)?)
            }),
            Opcode::Over => return Some(self.wait_for_animation(world)),
            _ => return None,
        };
        Some(result.map(|()| Flow::Next))
    }

    pub(super) fn try_agent_function(
        &mut self,
        call: &Instruction,
        world: &mut dyn World,
    ) -> Option<Result<Value, VmError>> {
        let result = match call.op {
            Opcode::GetTarg => Ok(Value::Agent(self.target(world))),
            Opcode::Ownr => Ok(Value::Agent(self.owner)),
            Opcode::Null => Ok(Value::Agent(None)),
            Opcode::From => Ok(Value::Agent(self.from)),
            Opcode::P1 => Ok(self.p1.clone()),
            Opcode::P2 => Ok(self.p2.clone()),
            Opcode::Fmly | Opcode::Gnus | Opcode::Spcs => self.require_target(world).and_then(|t| {
                let c = world.classifier(t)?;
                Ok(Value::Int(match call.op {
                    Opcode::Fmly => i32::from(c.family),
                    Opcode::Gnus => i32::from(c.genus),
                    _ => i32::from(c.species),
                }))
            }),
            Opcode::GetAttr => self.target_int(world, |w, t| w.attributes(t)),
            Opcode::GetBhvr => self.target_int(world, |w, t| w.behaviour(t)),
            Opcode::GetPose => self.target_int(world, |w, t| w.pose(t)),
            Opcode::GetElas => self.target_int(world, |w, t| Ok(w.physics(t)?.elas)),
            Opcode::GetFric => self.target_int(world, |w, t| Ok(w.physics(t)?.fric)),
            Opcode::GetAccg => self
                .require_target(world)
                .and_then(|t| Ok(Value::Float(world.physics(t)?.accg))),
            Opcode::Totl => self.pattern(call, 0, world).map(|p| Value::Int(world.find_agents(p).len() as i32)),
            Opcode::Avar => self.arg_agent(call, 0, world).and_then(|agent| {
                let agent = agent.ok_or(WorldError::NullAgent)?;
                let slot = self.arg_int(call, 1, world)?;
                Ok(world.variable(agent, slot)?)
            }),
            Opcode::Posx | Opcode::Posy => self.require_target(world).and_then(|t| {
                let centre = world.position(t)? + world.size(t)?.scale(0.5);
                let component = if call.op == Opcode::Posx {
                    centre.x
                } else {
                    centre.y
                };
                Ok(Value::Float(component))
            }),
            Opcode::Velx | Opcode::Vely => self.require_target(world).and_then(|t| {
                let v = world.velocity(t)?;
                Ok(Value::Float(match call.op {
                    Opcode::Velx => v.x,
                    _ => v.y,
                }))
            }),
            Opcode::Pttv => self.arg_int(call, 0, world).and_then(|index| {
                let t = self.require_target(world)?;
                Ok(Value::Agent(world.passenger(t, index)?))
            }),
            Opcode::Mows => Ok(Value::Int(i32::from(world.pointer_over_world()))),
            Opcode::PrtItot => self.target_int(world, |w, t| w.port_count(t, PortDirection::Input)),
            Opcode::PrtOtot => self.target_int(world, |w, t| w.port_count(t, PortDirection::Output)),
            Opcode::PrtBtot => self.arg_int(call, 0, world).and_then(|direction| {
                let t = self.require_target(world)?;
                Ok(Value::Int(world.bundle_count(t, direction)?))
            }),
            Opcode::PrtBinf => self.arg_int(call, 0, world).and_then(|direction| {
                let bundle = self.arg_int(call, 1, world)?;
                let t = self.require_target(world)?;
                Ok(Value::Bytes(world.bundle(t, direction, bundle)?))
            }),
            _ => return None,
        };
        Some(result)
    }

    fn with_target_int(
        &mut self,
        instr: &Instruction,
        world: &mut dyn World,
        f: impl FnOnce(&mut dyn World, AgentId, i32) -> Result<(), WorldError>,
    ) -> Result<(), VmError> {
        let n = self.arg_int(instr, 0, world)?;
        let target = self.require_target(world)?;
        Ok(f(world, target, n)?)
    }

    fn target_int(
        &self,
        world: &dyn World,
        f: impl FnOnce(&dyn World, AgentId) -> Result<i32, WorldError>,
    ) -> Result<Value, VmError> {
        let target = self.require_target(world)?;
        Ok(Value::Int(f(world, target)?))
    }

    /// Three consecutive integer arguments as a classifier pattern.
    fn pattern(&mut self, instr: &Instruction, first: usize, world: &mut dyn World) -> Result<Classifier, VmError> {
        let family = self.arg_int(instr, first, world)?;
        let genus = self.arg_int(instr, first + 1, world)?;
        let species = self.arg_int(instr, first + 2, world)?;
        classifier_from(family, genus, species)
    }

    fn new_agent(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let spec = if instr.op != Opcode::NewSimpClassic {
            AgentSpec {
                kind: match instr.op {
                    Opcode::NewVhcl => AgentKind::Vehicle,
                    _ => AgentKind::Simple,
                },
                classifier: self.pattern(instr, 0, world)?,
                sprite: self.arg_str(instr, 3, world)?,
                image_count: self.arg_int(instr, 4, world)?,
                first_image: self.arg_int(instr, 5, world)?,
                plane: self.arg_int(instr, 6, world)?,
            }
        } else {
            // classic form: sprite count first plane clone
            let spec = AgentSpec {
                kind: AgentKind::Simple,
                classifier: Classifier::default(),
                sprite: self.arg_str(instr, 0, world)?,
                image_count: self.arg_int(instr, 1, world)?,
                first_image: self.arg_int(instr, 2, world)?,
                plane: self.arg_int(instr, 3, world)?,
            };
            let _clone = self.arg_int(instr, 4, world)?;
            spec
        };
        let agent = world.create_agent(spec)?;
        self.target = Some(agent);
        Ok(())
    }

    fn set_cabin(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let left = self.arg_int(instr, 0, world)?;
        let top = self.arg_int(instr, 1, world)?;
        let right = self.arg_int(instr, 2, world)?;
        let bottom = self.arg_int(instr, 3, world)?;
        if right < left || bottom < top {
            let rect = format!("{} {} {} {}", left, top, right, bottom);
            return Err(VmError::Runtime(format!("CABN rectangle {} is inverted", rect)));
        }
        let target = self.require_target(world)?;
        let cabin = Cabin { left: left as f32, top: top as f32, right: right as f32, bottom: bottom as f32 };
        Ok(world.set_cabin(target, cabin)?)
    }

    fn random_target(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let pattern = self.pattern(instr, 0, world)?;
        let found = world.find_agents(pattern);
        self.target = if found.is_empty() {
            None
        } else {
            let pick = world.random(0, found.len() as i32 - 1);
            found.get(pick as usize).copied()
        };
        Ok(())
    }

    fn animate(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let raw = self.arg_bytes(instr, 0, world)?;
        let frames = match self.dialect().family() {
            Family::C3 => raw,
            Family::C1 | Family::C2 => classic_frames(&raw)?,
        };
        let target = self.require_target(world)?;
        Ok(world.set_animation(target, frames)?)
    }

    fn move_target(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let x = self.arg_float(instr, 0, world)?;
        let y = self.arg_float(instr, 1, world)?;
        let target = self.require_target(world)?;
        let to = if instr.op == Opcode::Mvby {
            world.position(target)? + Vec2::new(x, y)
        } else {
            Vec2::new(x, y)
        };
        Ok(world.move_to(target, to)?)
    }

    fn wait_for_animation(&mut self, world: &mut dyn World) -> Result<Flow, VmError> {
        let target = self.require_target(world)?;
        if world.animating(target)? {
            Ok(Flow::Suspend(SuspendReason::External(ExternalEvent::AnimationOver(target))))
        } else {
            Ok(Flow::Next)
        }
    }

    /// `MESG WRIT`/`MESG WRT+`. A missing recipient is logged, not fatal.
    fn write_message(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let to = self.arg_agent(instr, 0, world)?;
        let message = self.arg_int(instr, 1, world)?;
        let (p1, p2, delay) = if instr.op == Opcode::MesgWrtp {
            (self.arg(instr, 2, world)?, self.arg(instr, 3, world)?, self.arg_int(instr, 4, world)?)
        } else {
            (Value::Int(0), Value::Int(0), 0)
        };
        let Some(to) = to else {
            warn!("{} {} sent to NULL, dropped", instr.op.name(), message);
            return Ok(());
        };
        let delay = u32::try_from(delay).unwrap_or(0);
        let from = self.owner;
        match world.send_message(Message { from, to, message, p1, p2 }, delay) {
            Err(WorldError::NoSuchAgent(agent)) => {
                warn!("{} {} sent to destroyed {}, dropped", instr.op.name(), message, agent);
                Ok(())
            }
            other => Ok(other?),
        }
    }

    fn new_port(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let id = self.arg_int(instr, 0, world)?;
        let x = self.arg_int(instr, 1, world)?;
        let y = self.arg_int(instr, 2, world)?;
        let name = self.arg_str(instr, 3, world)?;
        let description = self.arg_str(instr, 4, world)?;
        let (direction, message) = if instr.op == Opcode::PrtInew {
            (PortDirection::Input, self.arg_int(instr, 5, world)?)
        } else {
            (PortDirection::Output, 0)
        };
        let target = self.require_target(world)?;
        Ok(world.create_port(target, direction, id, PortSpec { x, y, name, description, message })?)
    }

    fn join_ports(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let source = self.arg_agent(instr, 0, world)?.ok_or(WorldError::NullAgent)?;
        let output = self.arg_int(instr, 1, world)?;
        let dest = self.arg_agent(instr, 2, world)?.ok_or(WorldError::NullAgent)?;
        let input = self.arg_int(instr, 3, world)?;
        Ok(world.join_ports(source, output, dest, input)?)
    }

    fn break_port(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let agent = self.arg_agent(instr, 0, world)?.ok_or(WorldError::NullAgent)?;
        let direction = PortDirection::from_flag(self.arg_int(instr, 1, world)?);
        let id = self.arg_int(instr, 2, world)?;
        Ok(world.break_port(agent, direction, id)?)
    }

    /// `PRT: SEND` on a port that does not exist is logged and ignored.
    fn send_on_port(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let id = self.arg_int(instr, 0, world)?;
        let data = self.arg(instr, 1, world)?;
        let target = self.require_target(world)?;
        match world.send_on_port(target, id, data) {
            Err(e @ WorldError::NoSuchPort { .. }) => {
                warn!("PRT: SEND ignored: {}", e);
                Ok(())
            }
            other => Ok(other?),
        }
    }

    fn new_bundle(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let direction = self.arg_int(instr, 0, world)?;
        let bundle = self.arg_int(instr, 1, world)?;
        let ports = self.arg_bytes(instr, 2, world)?;
        let target = self.require_target(world)?;
        Ok(world.create_bundle(target, direction, bundle, ports)?)
    }
}

/// Classic animation strings are digit frames, with `R` to repeat.
fn classic_frames(text: &[u8]) -> Result<Vec<u8>, VmError> {
    text.iter()
        .filter(|b| !b.is_ascii_whitespace())
        .map(|b| match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'R' | b'r' => Ok(ANIM_REPEAT),
            other => Err(VmError::Runtime(format!("invalid animation frame '{}'", char::from(*other)))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classic_frames() {
        assert_eq!(classic_frames(b"0101").unwrap(), vec![0, 1, 0, 1]);
        assert_eq!(classic_frames(b"12R").unwrap(), vec![1, 2, ANIM_REPEAT]);
        assert!(classic_frames(b"1x").is_err());
    }
}
