//! Tagged value representation for the CAOS VM.

use caos_compiler::compiler::ast::CmpOp;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Number of variable slots in every frame (locals, and each agent's own).
pub const VARIABLE_SLOTS: usize = 100;

/// Opaque agent handle. Identifiers are allocated monotonically and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "agent#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `degrees`, measured from the positive x axis.
    pub fn unit(degrees: f32) -> Self {
        let r = degrees.to_radians();
        Self { x: r.cos(), y: r.sin() }
    }

    pub fn magnitude(self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Angle in degrees, in (-180, 180].
    pub fn angle(self) -> f32 {
        self.y.atan2(self.x).to_degrees()
    }

    pub fn normalized(self) -> Self {
        let m = self.magnitude();
        if m == 0.0 {
            self
        } else {
            self.scale(1.0 / m)
        }
    }

    pub fn scale(self, s: f32) -> Self {
        Self { x: self.x * s, y: self.y * s }
    }

    pub fn dot(self, other: Vec2) -> f32 {
        self.x * other.x + self.y * other.y
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;
    fn add(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x + o.x, self.y + o.y)
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x - o.x, self.y - o.y)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: &'static str, found: &'static str },
    #[error("cannot compare {left} with {right} using {op:?}")]
    Incomparable { left: &'static str, right: &'static str, op: CmpOp },
    #[error("cannot convert \"{text}\" to {target}")]
    Conversion { text: String, target: &'static str },
}

/// Runtime values in the CAOS VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Int(i32),
    Float(f32),
    String(String),
    Bytes(Vec<u8>),
    /// `None` is the null agent.
    Agent(Option<AgentId>),
    Vector(Vec2),
}

impl Default for Value {
    fn default() -> Self {
        Value::Int(0)
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "byte-string",
            Value::Agent(_) => "agent",
            Value::Vector(_) => "vector",
        }
    }

    fn mismatch(&self, expected: &'static str) -> ValueError {
        ValueError::Mismatch { expected, found: self.type_name() }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Float(_))
    }

    /// Floats truncate toward zero.
    pub fn as_int(&self) -> Result<i32, ValueError> {
        match self {
            Value::Int(n) => Ok(*n),
            Value::Float(f) => Ok(*f as i32),
            other => Err(other.mismatch("integer")),
        }
    }

    pub fn as_float(&self) -> Result<f32, ValueError> {
        match self {
            Value::Int(n) => Ok(*n as f32),
            Value::Float(f) => Ok(*f),
            other => Err(other.mismatch("float")),
        }
    }

    pub fn as_str(&self) -> Result<&str, ValueError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch("string")),
        }
    }

    pub fn as_bytes(&self) -> Result<&[u8], ValueError> {
        match self {
            Value::Bytes(b) => Ok(b),
            other => Err(other.mismatch("byte-string")),
        }
    }

    pub fn as_agent(&self) -> Result<Option<AgentId>, ValueError> {
        match self {
            Value::Agent(a) => Ok(*a),
            other => Err(other.mismatch("agent")),
        }
    }

    pub fn as_vector(&self) -> Result<Vec2, ValueError> {
        match self {
            Value::Vector(v) => Ok(*v),
            other => Err(other.mismatch("vector")),
        }
    }

    /// Text form used by `VTOS`, `OUTV` and string output.
    pub fn to_display(&self) -> String {
        match self {
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => {
                let parts: Vec<String> = b.iter().map(|x| x.to_string()).collect();
                format!("[{}]", parts.join(" "))
            }
            Value::Agent(None) => "NULL".to_string(),
            Value::Agent(Some(id)) => id.to_string(),
            Value::Vector(v) => format!("({}, {})", format_float(v.x), format_float(v.y)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "\"{}\"", s),
            other => f.write_str(&other.to_display()),
        }
    }
}

/// Floats always render with six fractional digits.
pub fn format_float(f: f32) -> String {
    format!("{:.6}", f)
}

/// Length of the leading `[+-]digits` run, if it has at least one digit.
fn numeric_prefix(s: &str, allow_fraction: bool) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        i += 1;
    }
    let digits_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut digits = i - digits_start;
    if allow_fraction && i < bytes.len() && bytes[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        digits += j - frac_start;
        if j > frac_start || digits > 0 {
            i = j;
        }
    }
    (digits > 0).then(|| &s[..i])
}

/// `STOI`: parse the leading integer prefix.
pub fn parse_int_prefix(s: &str) -> Result<i32, ValueError> {
    let trimmed = s.trim_start();
    let fail = || ValueError::Conversion { text: s.to_string(), target: "integer" };
    let prefix = numeric_prefix(trimmed, false).ok_or_else(fail)?;
    prefix.parse::<i64>().map(|n| n.clamp(i32::MIN as i64, i32::MAX as i64) as i32).map_err(|_| fail())
}

/// `STOF`: parse the leading decimal prefix.
pub fn parse_float_prefix(s: &str) -> Result<f32, ValueError> {
    let trimmed = s.trim_start();
    let fail = || ValueError::Conversion { text: s.to_string(), target: "float" };
    let prefix = numeric_prefix(trimmed, true).ok_or_else(fail)?;
    let normalized = if prefix.ends_with('.') { format!("{}0", prefix) } else { prefix.to_string() };
    normalized.parse::<f32>().map_err(|_| fail())
}

fn ordered(ord: Ordering, op: CmpOp) -> bool {
    match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Ge => ord != Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Bt | CmpOp::Bf => false,
    }
}

fn same(equal: bool) -> Ordering {
    if equal {
        Ordering::Equal
    } else {
        Ordering::Less
    }
}

/// Type-aware comparison. Mixed numeric operands compare as floats; strings
/// and byte-strings compare ordinally; agents and vectors only support
/// equality.
pub fn compare(lhs: &Value, op: CmpOp, rhs: &Value) -> Result<bool, ValueError> {
    let incomparable = || ValueError::Incomparable { left: lhs.type_name(), right: rhs.type_name(), op };
    if matches!(op, CmpOp::Bt | CmpOp::Bf) {
        let (a, b) = match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => (*a, *b),
            _ => return Err(incomparable()),
        };
        return Ok(match op {
            CmpOp::Bt => a & b == b,
            _ => a & b == 0,
        });
    }
    let equality_only = matches!(op, CmpOp::Eq | CmpOp::Ne);
    let ord = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => a.cmp(b),
        (a, b) if a.is_numeric() && b.is_numeric() => {
            let (x, y) = (a.as_float()?, b.as_float()?);
            match x.partial_cmp(&y) {
                Some(o) => o,
                None => return Ok(op == CmpOp::Ne),
            }
        }
        (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
        (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
        (Value::Agent(a), Value::Agent(b)) if equality_only => same(a == b),
        (Value::Vector(a), Value::Vector(b)) if equality_only => same(a == b),
        _ => return Err(incomparable()),
    };
    Ok(ordered(ord, op))
}

/// One context's local variable frame.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableFrame {
    slots: Vec<Value>,
}

impl Default for VariableFrame {
    fn default() -> Self {
        Self { slots: vec![Value::Int(0); VARIABLE_SLOTS] }
    }
}

impl VariableFrame {
    pub fn get(&self, slot: u8) -> Value {
        self.slots.get(slot as usize).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, slot: u8, value: Value) {
        if let Some(s) = self.slots.get_mut(slot as usize) {
            *s = value;
        }
    }
}
