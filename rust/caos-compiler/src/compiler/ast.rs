//! Parsed-script model: structured blocks of instructions.
//!
//! Control flow is kept as nested block nodes rather than jump offsets. A
//! `Script` owns a flat arena of `Block`s addressed by `BlockId`; structured
//! statements refer to their bodies through those ids so an execution context
//! can hold a cursor as `(BlockId, index)` pairs.

use crate::compiler::dialect::Dialect;
use crate::compiler::opcodes::Opcode;
use crate::compiler::tokens::Span;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Index of a block inside its owning `Script`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub usize);

/// Family/genus/species triple. Zero in any position matches everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Classifier {
    pub family: u8,
    pub genus: u8,
    pub species: u16,
}

impl Classifier {
    pub fn new(family: u8, genus: u8, species: u16) -> Self {
        Self { family, genus, species }
    }

    /// Whether `self`, treated as a pattern, matches a concrete classifier.
    pub fn matches(&self, other: &Classifier) -> bool {
        (self.family == 0 || self.family == other.family)
            && (self.genus == 0 || self.genus == other.genus)
            && (self.species == 0 || self.species == other.species)
    }
}

impl fmt::Display for Classifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.family, self.genus, self.species)
    }
}

/// A complete source file: installer, optional removal script, event scripts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedScript {
    pub dialect: Dialect,
    pub installer: Arc<Script>,
    pub removal: Option<Arc<Script>>,
    pub events: Vec<EventScript>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventScript {
    pub classifier: Classifier,
    pub event: u16,
    pub script: Arc<Script>,
}

/// One independently executable body with its own subroutine table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    pub dialect: Dialect,
    pub root: BlockId,
    pub blocks: Vec<Block>,
    /// Upper-cased label to subroutine body.
    pub subroutines: BTreeMap<String, BlockId>,
}

impl Script {
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn subroutine(&self, label: &str) -> Option<BlockId> {
        self.subroutines.get(&label.to_ascii_uppercase()).copied()
    }

    /// Number of executable statements across every block.
    pub fn statement_count(&self) -> usize {
        self.blocks.iter().map(|b| b.stmts.len()).sum()
    }
}

/// What happens when control reaches the end of a block's statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tail {
    /// Leave the block and resume in the enclosing one.
    Fallthrough,
    /// `UNTL cond`: leave when the condition holds, otherwise rerun.
    Until(Condition),
    /// `EVER`: rerun unconditionally.
    Ever,
    /// `REPE`
    Repeat,
    /// `NEXT`
    Next,
    /// `RETN` closing a subroutine body.
    Return,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub tail: Tail,
    pub tail_span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Command(Instruction),
    If {
        branches: Vec<(Condition, BlockId)>,
        otherwise: Option<BlockId>,
        span: Span,
    },
    Loop {
        body: BlockId,
        span: Span,
    },
    Reps {
        count: Operand,
        body: BlockId,
        span: Span,
    },
    Enum {
        family: Operand,
        genus: Operand,
        species: Operand,
        body: BlockId,
        span: Span,
    },
    Gosub {
        label: String,
        target: BlockId,
        span: Span,
    },
    /// A `RETN` nested inside a subroutine's inner blocks.
    Return {
        span: Span,
    },
    Stop {
        span: Span,
    },
    /// Marks where a `SUBR` body begins in straight-line code.
    Subroutine {
        label: String,
        span: Span,
    },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Command(i) => i.span,
            Stmt::If { span, .. }
            | Stmt::Loop { span, .. }
            | Stmt::Reps { span, .. }
            | Stmt::Enum { span, .. }
            | Stmt::Gosub { span, .. }
            | Stmt::Return { span }
            | Stmt::Stop { span }
            | Stmt::Subroutine { span, .. } => *span,
        }
    }

    /// Name shown in diagnostics for this statement.
    pub fn name(&self) -> &'static str {
        match self {
            Stmt::Command(i) => i.op.name(),
            Stmt::If { .. } => "DOIF",
            Stmt::Loop { .. } => "LOOP",
            Stmt::Reps { .. } => "REPS",
            Stmt::Enum { .. } => "ENUM",
            Stmt::Gosub { .. } => "GSUB",
            Stmt::Return { .. } => "RETN",
            Stmt::Stop { .. } => "STOP",
            Stmt::Subroutine { .. } => "SUBR",
        }
    }
}

/// An opcode with its positional operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub op: Opcode,
    pub args: Vec<Operand>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Literal(Literal),
    Var(VarRef),
    /// Nested expression-command, evaluated before the enclosing instruction.
    Call(Box<Instruction>),
    Condition(Box<Condition>),
    /// Bareword argument (sprite names in the classic families).
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i32),
    Float(f32),
    Str(String),
    Bytes(Vec<u8>),
}

/// A variable slot: local to the context, on the target, or on the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarRef {
    Local(u8),
    Target(u8),
    Owner(u8),
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarRef::Local(n) => write!(f, "VA{:02}", n),
            VarRef::Target(n) => write!(f, "OV{:02}", n),
            VarRef::Owner(n) => write!(f, "MV{:02}", n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
    /// Bits true: every bit of the right side is set in the left.
    Bt,
    /// Bits false: no bit of the right side is set in the left.
    Bf,
}

impl CmpOp {
    pub fn from_word(word: &str) -> Option<CmpOp> {
        match word.to_ascii_uppercase().as_str() {
            "EQ" => Some(CmpOp::Eq),
            "NE" => Some(CmpOp::Ne),
            "GT" => Some(CmpOp::Gt),
            "LT" => Some(CmpOp::Lt),
            "GE" => Some(CmpOp::Ge),
            "LE" => Some(CmpOp::Le),
            "BT" => Some(CmpOp::Bt),
            "BF" => Some(CmpOp::Bf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub lhs: Operand,
    pub op: CmpOp,
    pub rhs: Operand,
}

/// A chain of comparisons folded strictly left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub first: Comparison,
    pub rest: Vec<(Logic, Comparison)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_wildcards() {
        let concrete = Classifier::new(2, 3, 1000);
        assert!(Classifier::new(0, 0, 0).matches(&concrete));
        assert!(Classifier::new(2, 0, 0).matches(&concrete));
        assert!(Classifier::new(2, 3, 1000).matches(&concrete));
        assert!(!Classifier::new(2, 4, 0).matches(&concrete));
        assert!(!Classifier::new(1, 0, 0).matches(&concrete));
    }

    #[test]
    fn test_var_display() {
        assert_eq!(VarRef::Local(7).to_string(), "VA07");
        assert_eq!(VarRef::Owner(42).to_string(), "MV42");
    }
}
