//! Expression-command dispatch: string, maths and vector functions.
//!
//! Agent-facing functions live in `agents.rs` and the debug/inline ones in
//! `debug.rs`; `call_function` tries each family in turn.

use super::*;
use crate::values::{format_float, parse_float_prefix, parse_int_prefix};
use caos_compiler::compiler::opcodes::Opcode;

impl ExecutionContext {
    /// Evaluate an expression-command to a value.
    pub(crate) fn call_function(&mut self, call: &Instruction, world: &mut dyn World) -> Result<Value, VmError> {
        if let Some(result) = self.try_debug_function(call, world) {
            return result;
        }
        if let Some(result) = self.try_agent_function(call, world) {
            return result;
        }
        if let Some(result) = self.try_string_function(call, world) {
            return result;
        }
        if let Some(result) = self.try_math_function(call, world) {
            return result;
        }
        Err(VmError::Name(format!("{} cannot be used as a value", call.op.name())))
    }

    // -----------------------------------------------------------------------
    // Strings
    // -----------------------------------------------------------------------

    fn try_string_function(&mut self, call: &Instruction, world: &mut dyn World) -> Option<Result<Value, VmError>> {
        let result = match call.op {
            Opcode::Lowa => self.arg_str(call, 0, world).map(|s| Value::String(s.to_ascii_lowercase())),
            Opcode::Uppa => self.arg_str(call, 0, world).map(|s| Value::String(s.to_ascii_uppercase())),
            Opcode::Strl => self.arg_str(call, 0, world).map(|s| Value::Int(s.len() as i32)),
            Opcode::Subs => self.substring(call, world),
            Opcode::Vtos => self.arg(call, 0, world).and_then(|v| match v {
                Value::Int(n) => Ok(Value::String(n.to_string())),
                Value::Float(f) => Ok(Value::String(format_float(f))),
                other => Err(ValueError::Mismatch { expected: "number", found: other.type_name() }.into()),
            }),
            Opcode::Stoi => self
                .arg_str(call, 0, world)
                .and_then(|s| Ok(Value::Int(parse_int_prefix(&s)?))),
            Opcode::Stof => self
                .arg_str(call, 0, world)
                .and_then(|s| Ok(Value::Float(parse_float_prefix(&s)?))),
            Opcode::Sins => self.search(call, world),
            Opcode::GetChar => self.char_at(call, world),
            _ => return None,
        };
        Some(result)
    }

    /// `SUBS text start count`, 1-based.
    fn substring(&mut self, call: &Instruction, world: &mut dyn World) -> Result<Value, VmError> {
        let text = self.arg_str(call, 0, world)?;
        let start = self.arg_int(call, 1, world)?;
        let count = self.arg_int(call, 2, world)?;
        let bytes = text.as_bytes();
        let range = usize::try_from(start)
            .ok()
            .and_then(|s| s.checked_sub(1))
            .zip(usize::try_from(count).ok())
            .and_then(|(from, len)| from.checked_add(len).map(|to| from..to))
            .filter(|r| r.end <= bytes.len())
            .ok_or_else(|| {
                VmError::Runtime(format!("SUBS range {}+{} outside string of length {}", start, count, bytes.len()))
            })?;
        Ok(Value::String(String::from_utf8_lossy(&bytes[range]).into_owned()))
    }

    /// `SINS haystack start needle`: 1-based position of `needle` at or
    /// after `start`, or -1.
    fn search(&mut self, call: &Instruction, world: &mut dyn World) -> Result<Value, VmError> {
        let haystack = self.arg_str(call, 0, world)?;
        let start = self.arg_int(call, 1, world)?;
        let needle = self.arg_str(call, 2, world)?;
        let from = usize::try_from(start.max(1) - 1).unwrap_or(0);
        let found = haystack
            .as_bytes()
            .get(from..)
            .and_then(|rest| {
                if needle.is_empty() {
                    return Some(0);
                }
                rest.windows(needle.len()).position(|w| w == needle.as_bytes())
            })
            .map(|offset| (from + offset + 1) as i32)
            .unwrap_or(-1);
        Ok(Value::Int(found))
    }

    /// `CHAR text index` as a value: the 1-based character code.
    fn char_at(&mut self, call: &Instruction, world: &mut dyn World) -> Result<Value, VmError> {
        let text = self.arg_str(call, 0, world)?;
        let index = self.arg_int(call, 1, world)?;
        usize::try_from(index)
            .ok()
            .and_then(|i| i.checked_sub(1))
            .and_then(|i| text.as_bytes().get(i))
            .map(|b| Value::Int(i32::from(*b)))
            .ok_or_else(|| VmError::Runtime(format!("character index {} out of range", index)))
    }

    // -----------------------------------------------------------------------
    // Maths and vectors
    // -----------------------------------------------------------------------

    fn try_math_function(&mut self, call: &Instruction, world: &mut dyn World) -> Option<Result<Value, VmError>> {
        let result = match call.op {
            Opcode::Rand => self.random(call, world),
            Opcode::Itof => self.arg_float(call, 0, world).map(Value::Float),
            Opcode::Ftoi => self.arg_int(call, 0, world).map(Value::Int),
            Opcode::Sqrt => self.arg_float(call, 0, world).and_then(|x| {
                if x < 0.0 {
                    Err(VmError::Runtime(format!("square root of negative number {}", format_float(x))))
                } else {
                    Ok(Value::Float(x.sqrt()))
                }
            }),
            Opcode::Sin => self.arg_float(call, 0, world).map(|d| Value::Float(d.to_radians().sin())),
            Opcode::Cos => self.arg_float(call, 0, world).map(|d| Value::Float(d.to_radians().cos())),
            Opcode::Tan => self.arg_float(call, 0, world).map(|d| Value::Float(d.to_radians().tan())),
            Opcode::Atan => self.arg_float(call, 0, world).map(|x| Value::Float(x.atan().to_degrees())),
            Opcode::VecMake => self.arg_float(call, 0, world).and_then(|x| {
                let y = self.arg_float(call, 1, world)?;
                Ok(Value::Vector(Vec2::new(x, y)))
            }),
            Opcode::VecUnit => self.arg_float(call, 0, world).map(|deg| Value::Vector(Vec2::unit(deg))),
            Opcode::VecAngl => self.arg_vector(call, 0, world).map(|v| Value::Float(v.angle())),
            Opcode::VecMagn => self.arg_vector(call, 0, world).map(|v| Value::Float(v.magnitude())),
            Opcode::VecNull => Ok(Value::Vector(Vec2::default())),
            Opcode::VecDotp => self.arg_vector(call, 0, world).and_then(|a| {
                let b = self.arg_vector(call, 1, world)?;
                Ok(Value::Float(a.dot(b)))
            }),
            Opcode::Game => self.arg_str(call, 0, world).map(|name| world.global(&name)),
            Opcode::Wtik => Ok(Value::Int(saturating_tick(world.tick()))),
            _ => return None,
        };
        Some(result)
    }

    /// `RAND a b`, inclusive, in either order.
    fn random(&mut self, call: &Instruction, world: &mut dyn World) -> Result<Value, VmError> {
        let a = self.arg_int(call, 0, world)?;
        let b = self.arg_int(call, 1, world)?;
        Ok(Value::Int(world.random(a.min(b), a.max(b))))
    }

    pub(super) fn store_settable(&mut self, call: &Instruction, value: Value, world: &mut dyn World) -> Result<(), VmError> {
        match call.op {
            Opcode::Velx | Opcode::Vely => {
                let target = self.require_target(world)?;
                let mut velocity = world.velocity(target)?;
                let component = value.as_float()?;
                if call.op == Opcode::Velx {
                    velocity.x = component;
                } else {
                    velocity.y = component;
                }
                Ok(world.set_velocity(target, velocity)?)
            }
            Opcode::Avar => {
                let agent = self.arg_agent(call, 0, world)?.ok_or(WorldError::NullAgent)?;
                let slot = self.arg_int(call, 1, world)?;
                Ok(world.set_variable(agent, slot, value)?)
            }
            Opcode::Game => {
                let name = self.arg_str(call, 0, world)?;
                world.set_global(&name, value);
                Ok(())
            }
            other => Err(VmError::Name(format!("{} cannot be assigned to", other.name()))),
        }
    }
}

/// World ticks as a script integer, pinned at `i32::MAX` once they no longer fit.
fn saturating_tick(tick: u64) -> i32 {
    i32::try_from(tick).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wtik_saturates() {
        assert_eq!(saturating_tick(0), 0);
        assert_eq!(saturating_tick(12_345), 12_345);
        assert_eq!(saturating_tick(i32::MAX as u64), i32::MAX);
        assert_eq!(saturating_tick(i32::MAX as u64 + 1), i32::MAX);
        assert_eq!(saturating_tick(u64::MAX), i32::MAX);
    }
}
