//! Variable, arithmetic and vector commands.

use super::*;
use caos_compiler::compiler::opcodes::Opcode;

impl ExecutionContext {
    pub(super) fn try_variable_command(
        &mut self,
        instr: &Instruction,
        world: &mut dyn World,
    ) -> Option<Result<(), VmError>> {
        let result = match instr.op {
            Opcode::Setv => self.assign(instr, world, Ok),
            Opcode::Sets => self.assign(instr, world, |v| match v {
                Value::String(_) => Ok(v),
                other => Err(ValueError::Mismatch { expected: "string", found: other.type_name() }.into()),
            }),
            Opcode::Seta => self.assign(instr, world, |v| match v {
                Value::Agent(_) => Ok(v),
                other => Err(ValueError::Mismatch { expected: "agent", found: other.type_name() }.into()),
            }),
            Opcode::Addv | Opcode::Subv | Opcode::Mulv | Opcode::Divv => self.arithmetic(instr, world),
            Opcode::Modv | Opcode::Andv | Opcode::Orrv => self.integer_op(instr, world),
            Opcode::Negv => self.update(instr, world, |v| match v {
                Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ValueError::Mismatch { expected: "number", found: other.type_name() }.into()),
            }),
            Opcode::Absv => self.update(instr, world, |v| match v {
                Value::Int(n) => Ok(Value::Int(n.wrapping_abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(ValueError::Mismatch { expected: "number", found: other.type_name() }.into()),
            }),
            Opcode::Rndv => self.random_into(instr, world),
            Opcode::Adds => self.append_string(instr, world),
            Opcode::Char => self.set_char(instr, world),
            Opcode::VecSetv => self.assign(instr, world, |v| Ok(Value::Vector(v.as_vector()?))),
            Opcode::VecGetc => self.split_vector(instr, world),
            Opcode::VecMulv => {
                self.arg_float(instr, 1, world).and_then(|s| {
                    self.update(instr, world, |v| Ok(Value::Vector(v.as_vector()?.scale(s))))
                })
            }
            Opcode::VecAddv => self.arg_vector(instr, 1, world).and_then(|rhs| {
                self.update(instr, world, |v| Ok(Value::Vector(v.as_vector()? + rhs)))
            }),
            Opcode::VecSubv => self.arg_vector(instr, 1, world).and_then(|rhs| {
                self.update(instr, world, |v| Ok(Value::Vector(v.as_vector()? - rhs)))
            }),
            Opcode::VecNorm => self.update(instr, world, |v| Ok(Value::Vector(v.as_vector()?.normalized()))),
            _ => return None,
        };
        Some(result)
    }

    /// `dest = check(arg1)`.
    fn assign(
        &mut self,
        instr: &Instruction,
        world: &mut dyn World,
        check: impl FnOnce(Value) -> Result<Value, VmError>,
    ) -> Result<(), VmError> {
        let value = check(self.arg(instr, 1, world)?)?;
        let dest = self.dest(instr, 0)?;
        self.store(dest, value, world)
    }

    /// `dest = f(dest)`.
    fn update(
        &mut self,
        instr: &Instruction,
        world: &mut dyn World,
        f: impl FnOnce(Value) -> Result<Value, VmError>,
    ) -> Result<(), VmError> {
        let dest = self.dest(instr, 0)?;
        let current = self.eval(dest, world)?;
        let next = f(current)?;
        self.store(dest, next, world)
    }

    fn arithmetic(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let rhs = self.arg(instr, 1, world)?;
        let op = instr.op;
        self.update(instr, world, |lhs| arith(op, &lhs, &rhs))
    }

    fn integer_op(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let rhs = self.arg_int(instr, 1, world)?;
        let op = instr.op;
        self.update(instr, world, |lhs| {
            let lhs = lhs.as_int()?;
            let out = match op {
                Opcode::Modv if rhs == 0 => return Err(VmError::Runtime("division by zero".to_string())),
                Opcode::Modv => lhs.wrapping_rem(rhs),
                Opcode::Andv => lhs & rhs,
                _ => lhs | rhs,
            };
            Ok(Value::Int(out))
        })
    }

    fn random_into(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let a = self.arg_int(instr, 1, world)?;
        let b = self.arg_int(instr, 2, world)?;
        let n = world.random(a.min(b), a.max(b));
        let dest = self.dest(instr, 0)?;
        self.store(dest, Value::Int(n), world)
    }

    fn append_string(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let tail = self.arg_str(instr, 1, world)?;
        self.update(instr, world, |v| {
            let mut s = v.as_str()?.to_string();
            s.push_str(&tail);
            Ok(Value::String(s))
        })
    }

    /// `CHAR var index code`: replace the 1-based character at `index`.
    fn set_char(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let index = self.arg_int(instr, 1, world)?;
        let code = self.arg_int(instr, 2, world)?;
        let byte = u8::try_from(code)
            .map_err(|_| VmError::Runtime(format!("character code {} out of range", code)))?;
        self.update(instr, world, |v| {
            let mut bytes = v.as_str()?.as_bytes().to_vec();
            let slot = usize::try_from(index)
                .ok()
                .and_then(|i| i.checked_sub(1))
                .filter(|i| *i < bytes.len())
                .ok_or_else(|| VmError::Runtime(format!("character index {} out of range", index)))?;
            bytes[slot] = byte;
            Ok(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        })
    }

    fn split_vector(&mut self, instr: &Instruction, world: &mut dyn World) -> Result<(), VmError> {
        let v = self.arg_vector(instr, 0, world)?;
        let x_dest = self.dest(instr, 1)?;
        self.store(x_dest, Value::Float(v.x), world)?;
        let y_dest = self.dest(instr, 2)?;
        self.store(y_dest, Value::Float(v.y), world)
    }
}

/// ADDV/SUBV/MULV/DIVV. Integer pairs stay integral and wrap; anything
/// else promotes to float.
pub(crate) fn arith(op: Opcode, lhs: &Value, rhs: &Value) -> Result<Value, VmError> {
    let div_zero = || VmError::Runtime("division by zero".to_string());
    if let (Value::Int(a), Value::Int(b)) = (lhs, rhs) {
        let out = match op {
            Opcode::Addv => a.wrapping_add(*b),
            Opcode::Subv => a.wrapping_sub(*b),
            Opcode::Mulv => a.wrapping_mul(*b),
            _ if *b == 0 => return Err(div_zero()),
            _ => a.wrapping_div(*b),
        };
        return Ok(Value::Int(out));
    }
    let (a, b) = (lhs.as_float()?, rhs.as_float()?);
    let out = match op {
        Opcode::Addv => a + b,
        Opcode::Subv => a - b,
        Opcode::Mulv => a * b,
        _ if b == 0.0 => return Err(div_zero()),
        _ => a / b,
    };
    Ok(Value::Float(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_arithmetic_wraps() {
        assert_eq!(arith(Opcode::Addv, &Value::Int(i32::MAX), &Value::Int(1)).unwrap(), Value::Int(i32::MIN));
        assert_eq!(arith(Opcode::Divv, &Value::Int(17), &Value::Int(3)).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_mixed_arithmetic_promotes() {
        assert_eq!(arith(Opcode::Subv, &Value::Int(1), &Value::Float(0.25)).unwrap(), Value::Float(0.75));
        assert_eq!(arith(Opcode::Mulv, &Value::Float(1.5), &Value::Int(2)).unwrap(), Value::Float(3.0));
    }

    #[test]
    fn test_division_by_zero_is_runtime_fault() {
        let err = arith(Opcode::Divv, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Runtime);
        assert!(arith(Opcode::Divv, &Value::Float(1.0), &Value::Int(0)).is_err());
    }

    #[test]
    fn test_arithmetic_on_strings_is_type_error() {
        let err = arith(Opcode::Addv, &Value::String("a".into()), &Value::Int(1)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Type);
    }
}
