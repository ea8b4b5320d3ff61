//! Opcode catalogue: every command and expression-command the engine knows,
//! with argument shapes, return kinds, dialect availability and cost class.

use crate::compiler::dialect::{Dialect, Family};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use strum::{EnumIter, IntoStaticStr};

/// Closed set of opcodes, resolved once at parse time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, IntoStaticStr,
)]
pub enum Opcode {
    // -- variables --
    #[strum(serialize = "SETV")]
    Setv,
    #[strum(serialize = "SETS")]
    Sets,
    #[strum(serialize = "SETA")]
    Seta,
    #[strum(serialize = "ADDV")]
    Addv,
    #[strum(serialize = "SUBV")]
    Subv,
    #[strum(serialize = "MULV")]
    Mulv,
    #[strum(serialize = "DIVV")]
    Divv,
    #[strum(serialize = "MODV")]
    Modv,
    #[strum(serialize = "NEGV")]
    Negv,
    #[strum(serialize = "ABSV")]
    Absv,
    #[strum(serialize = "ANDV")]
    Andv,
    #[strum(serialize = "ORRV")]
    Orrv,
    #[strum(serialize = "RNDV")]
    Rndv,
    #[strum(serialize = "ADDS")]
    Adds,
    #[strum(serialize = "CHAR")]
    Char,

    // -- vectors --
    #[strum(serialize = "VEC: SETV")]
    VecSetv,
    #[strum(serialize = "VEC: GETC")]
    VecGetc,
    #[strum(serialize = "VEC: MULV")]
    VecMulv,
    #[strum(serialize = "VEC: ADDV")]
    VecAddv,
    #[strum(serialize = "VEC: SUBV")]
    VecSubv,
    #[strum(serialize = "VEC: NORM")]
    VecNorm,
    #[strum(serialize = "VEC: MAKE")]
    VecMake,
    #[strum(serialize = "VEC: UNIT")]
    VecUnit,
    #[strum(serialize = "VEC: ANGL")]
    VecAngl,
    #[strum(serialize = "VEC: MAGN")]
    VecMagn,
    #[strum(serialize = "VEC: NULL")]
    VecNull,
    #[strum(serialize = "VEC: DOTP")]
    VecDotp,

    // -- debug and output --
    #[strum(serialize = "DBG: ASRT")]
    DbgAsrt,
    #[strum(serialize = "DBG: ASRF")]
    DbgAsrf,
    #[strum(serialize = "DBG: FAIL")]
    DbgFail,
    #[strum(serialize = "DBG: OUTS")]
    DbgOuts,
    #[strum(serialize = "DBG: OUTV")]
    DbgOutv,
    #[strum(serialize = "DBG: TARK")]
    DbgTark,
    #[strum(serialize = "DBG: TSLC")]
    DbgTslc,
    #[strum(serialize = "DBG: TSLC")]
    GetTslc,
    #[strum(serialize = "OUTS")]
    Outs,
    #[strum(serialize = "OUTV")]
    Outv,

    // -- scheduling --
    #[strum(serialize = "WAIT")]
    Wait,
    #[strum(serialize = "INST")]
    Inst,
    #[strum(serialize = "SLOW")]
    Slow,
    #[strum(serialize = "OVER")]
    Over,

    // -- agents --
    #[strum(serialize = "NEW: SIMP")]
    NewSimp,
    #[strum(serialize = "NEW: SIMP")]
    NewSimpClassic,
    #[strum(serialize = "KILL")]
    Kill,
    #[strum(serialize = "TARG")]
    Targ,
    #[strum(serialize = "TARG")]
    GetTarg,
    #[strum(serialize = "RTAR")]
    Rtar,
    #[strum(serialize = "ATTR")]
    Attr,
    #[strum(serialize = "ATTR")]
    GetAttr,
    #[strum(serialize = "BHVR")]
    Bhvr,
    #[strum(serialize = "BHVR")]
    GetBhvr,
    #[strum(serialize = "POSE")]
    Pose,
    #[strum(serialize = "POSE")]
    GetPose,
    #[strum(serialize = "ANIM")]
    Anim,
    #[strum(serialize = "TICK")]
    Tick,
    #[strum(serialize = "OWNR")]
    Ownr,
    #[strum(serialize = "NULL")]
    Null,
    #[strum(serialize = "FROM")]
    From,
    #[strum(serialize = "_P1_")]
    P1,
    #[strum(serialize = "_P2_")]
    P2,
    #[strum(serialize = "FMLY")]
    Fmly,
    #[strum(serialize = "GNUS")]
    Gnus,
    #[strum(serialize = "SPCS")]
    Spcs,
    #[strum(serialize = "TOTL")]
    Totl,
    #[strum(serialize = "AVAR")]
    Avar,

    // -- kinematics --
    #[strum(serialize = "MVTO")]
    Mvto,
    #[strum(serialize = "MVBY")]
    Mvby,
    #[strum(serialize = "POSX")]
    Posx,
    #[strum(serialize = "POSY")]
    Posy,
    #[strum(serialize = "VELX")]
    Velx,
    #[strum(serialize = "VELY")]
    Vely,
    #[strum(serialize = "ACCG")]
    Accg,
    #[strum(serialize = "ACCG")]
    GetAccg,
    #[strum(serialize = "ELAS")]
    Elas,
    #[strum(serialize = "ELAS")]
    GetElas,
    #[strum(serialize = "FRIC")]
    Fric,
    #[strum(serialize = "FRIC")]
    GetFric,

    #[strum(serialize = "EMIT")]
    Emit,

    // -- vehicles --
    #[strum(serialize = "NEW: VHCL")]
    NewVhcl,
    #[strum(serialize = "CABN")]
    Cabn,
    #[strum(serialize = "SPAS")]
    Spas,
    #[strum(serialize = "DPAS")]
    Dpas,
    #[strum(serialize = "PTTV")]
    Pttv,

    // -- messaging --
    #[strum(serialize = "MESG WRIT")]
    MesgWrit,
    #[strum(serialize = "MESG WRT+")]
    MesgWrtp,

    // -- ports --
    #[strum(serialize = "PRT: INEW")]
    PrtInew,
    #[strum(serialize = "PRT: ONEW")]
    PrtOnew,
    #[strum(serialize = "PRT: IZAP")]
    PrtIzap,
    #[strum(serialize = "PRT: OZAP")]
    PrtOzap,
    #[strum(serialize = "PRT: JOIN")]
    PrtJoin,
    #[strum(serialize = "PRT: KRAK")]
    PrtKrak,
    #[strum(serialize = "PRT: SEND")]
    PrtSend,
    #[strum(serialize = "PRT: BANG")]
    PrtBang,
    #[strum(serialize = "PRT: ITOT")]
    PrtItot,
    #[strum(serialize = "PRT: OTOT")]
    PrtOtot,
    #[strum(serialize = "PRT: BNEW")]
    PrtBnew,
    #[strum(serialize = "PRT: BTOT")]
    PrtBtot,
    #[strum(serialize = "PRT: BINF")]
    PrtBinf,
    #[strum(serialize = "PRT: BZAP")]
    PrtBzap,

    // -- strings --
    #[strum(serialize = "LOWA")]
    Lowa,
    #[strum(serialize = "UPPA")]
    Uppa,
    #[strum(serialize = "STRL")]
    Strl,
    #[strum(serialize = "SUBS")]
    Subs,
    #[strum(serialize = "VTOS")]
    Vtos,
    #[strum(serialize = "STOI")]
    Stoi,
    #[strum(serialize = "STOF")]
    Stof,
    #[strum(serialize = "SINS")]
    Sins,
    #[strum(serialize = "CHAR")]
    GetChar,

    // -- maths --
    #[strum(serialize = "RAND")]
    Rand,
    #[strum(serialize = "ITOF")]
    Itof,
    #[strum(serialize = "FTOI")]
    Ftoi,
    #[strum(serialize = "SQRT")]
    Sqrt,
    #[strum(serialize = "SIN_")]
    Sin,
    #[strum(serialize = "COS_")]
    Cos,
    #[strum(serialize = "TAN_")]
    Tan,
    #[strum(serialize = "ATAN")]
    Atan,

    // -- world --
    #[strum(serialize = "GAME")]
    Game,
    #[strum(serialize = "WTIK")]
    Wtik,
    #[strum(serialize = "MOWS")]
    Mows,
    #[strum(serialize = "CAOS")]
    Caos,
}

impl Opcode {
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Shape of one positional argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgKind {
    Int,
    Float,
    /// Integer or float.
    Decimal,
    Str,
    Bytes,
    Agent,
    Vector,
    Any,
    /// A variable slot or a settable expression-command.
    Var,
    /// A comparison chain.
    Cond,
    /// A sprite name: string literal, or a bareword in the classic families.
    Sprite,
}

/// Static type of a value-producing operand, used for literal checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueKind {
    Int,
    Float,
    Str,
    Bytes,
    Agent,
    Vector,
    Any,
}

impl ArgKind {
    /// Whether an operand of static kind `kind` may be passed here.
    pub fn accepts(self, kind: ValueKind) -> bool {
        if kind == ValueKind::Any {
            return true;
        }
        match self {
            ArgKind::Int | ArgKind::Float | ArgKind::Decimal => {
                matches!(kind, ValueKind::Int | ValueKind::Float)
            }
            ArgKind::Str | ArgKind::Sprite => kind == ValueKind::Str,
            ArgKind::Bytes => kind == ValueKind::Bytes,
            ArgKind::Agent => kind == ValueKind::Agent,
            ArgKind::Vector => kind == ValueKind::Vector,
            ArgKind::Any => true,
            ArgKind::Var | ArgKind::Cond => false,
        }
    }
}

const ALL: u8 = 0b111;
const CLASSIC: u8 = 0b011;
const C3: u8 = 0b100;

#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub opcode: Opcode,
    pub args: &'static [ArgKind],
    pub returns: Option<ValueKind>,
    families: u8,
    /// Agent-affecting commands are the only ones charged in C1/C2.
    pub agent_affecting: bool,
    /// May appear as the destination of SETV/SETS/SETA and friends.
    pub settable: bool,
}

impl CommandSpec {
    fn new(opcode: Opcode, args: &'static [ArgKind], returns: Option<ValueKind>) -> Self {
        Self { opcode, args, returns, families: ALL, agent_affecting: false, settable: false }
    }

    fn only(mut self, families: u8) -> Self {
        self.families = families;
        self
    }

    fn weighty(mut self) -> Self {
        self.agent_affecting = true;
        self
    }

    fn settable(mut self) -> Self {
        self.settable = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.opcode.name()
    }

    pub fn available_in(&self, dialect: Dialect) -> bool {
        self.families & dialect.family().bit() != 0
    }

    /// Time-slice units charged each time the command runs.
    pub fn cost(&self, dialect: Dialect) -> u32 {
        match dialect.family() {
            Family::C3 => 1,
            Family::C1 | Family::C2 => u32::from(self.agent_affecting),
        }
    }
}

fn cmd(opcode: Opcode, args: &'static [ArgKind]) -> CommandSpec {
    CommandSpec::new(opcode, args, None)
}

fn func(opcode: Opcode, args: &'static [ArgKind], returns: ValueKind) -> CommandSpec {
    CommandSpec::new(opcode, args, Some(returns))
}

use ArgKind as A;
use ValueKind as V;

static COMMANDS: Lazy<Vec<CommandSpec>> = Lazy::new(|| {
    vec![
        cmd(Opcode::Setv, &[A::Var, A::Any]),
        cmd(Opcode::Sets, &[A::Var, A::Str]).only(C3),
        cmd(Opcode::Seta, &[A::Var, A::Agent]).only(C3),
        cmd(Opcode::Addv, &[A::Var, A::Decimal]),
        cmd(Opcode::Subv, &[A::Var, A::Decimal]),
        cmd(Opcode::Mulv, &[A::Var, A::Decimal]),
        cmd(Opcode::Divv, &[A::Var, A::Decimal]),
        cmd(Opcode::Modv, &[A::Var, A::Int]),
        cmd(Opcode::Negv, &[A::Var]),
        cmd(Opcode::Absv, &[A::Var]),
        cmd(Opcode::Andv, &[A::Var, A::Int]),
        cmd(Opcode::Orrv, &[A::Var, A::Int]),
        cmd(Opcode::Rndv, &[A::Var, A::Int, A::Int]),
        cmd(Opcode::Adds, &[A::Var, A::Str]).only(C3),
        cmd(Opcode::Char, &[A::Var, A::Int, A::Int]).only(C3),
        cmd(Opcode::VecSetv, &[A::Var, A::Vector]).only(C3),
        cmd(Opcode::VecGetc, &[A::Vector, A::Var, A::Var]).only(C3),
        cmd(Opcode::VecMulv, &[A::Var, A::Decimal]).only(C3),
        cmd(Opcode::VecAddv, &[A::Var, A::Vector]).only(C3),
        cmd(Opcode::VecSubv, &[A::Var, A::Vector]).only(C3),
        cmd(Opcode::VecNorm, &[A::Var]).only(C3),
        cmd(Opcode::DbgAsrt, &[A::Cond]),
        cmd(Opcode::DbgAsrf, &[A::Cond]),
        cmd(Opcode::DbgFail, &[]),
        cmd(Opcode::DbgOuts, &[A::Str]),
        cmd(Opcode::DbgOutv, &[A::Any]),
        cmd(Opcode::DbgTark, &[]),
        cmd(Opcode::DbgTslc, &[A::Int]),
        cmd(Opcode::Outs, &[A::Str]),
        cmd(Opcode::Outv, &[A::Decimal]),
        cmd(Opcode::Wait, &[A::Int]),
        cmd(Opcode::Inst, &[]),
        cmd(Opcode::Slow, &[]),
        cmd(Opcode::Over, &[]),
        cmd(Opcode::NewSimp, &[A::Int, A::Int, A::Int, A::Sprite, A::Int, A::Int, A::Int])
            .only(C3)
            .weighty(),
        cmd(Opcode::NewSimpClassic, &[A::Sprite, A::Int, A::Int, A::Int, A::Int])
            .only(CLASSIC)
            .weighty(),
        cmd(Opcode::Kill, &[A::Agent]).weighty(),
        cmd(Opcode::Targ, &[A::Agent]),
        cmd(Opcode::Rtar, &[A::Int, A::Int, A::Int]),
        cmd(Opcode::Attr, &[A::Int]),
        cmd(Opcode::Bhvr, &[A::Int]),
        cmd(Opcode::Pose, &[A::Int]).weighty(),
        cmd(Opcode::Anim, &[A::Bytes]).weighty(),
        cmd(Opcode::Tick, &[A::Int]),
        cmd(Opcode::Mvto, &[A::Decimal, A::Decimal]).weighty(),
        cmd(Opcode::Mvby, &[A::Decimal, A::Decimal]).weighty(),
        cmd(Opcode::Accg, &[A::Decimal]),
        cmd(Opcode::Elas, &[A::Int]),
        cmd(Opcode::Fric, &[A::Int]),
        cmd(Opcode::Emit, &[A::Int, A::Decimal]).only(C3),
        cmd(Opcode::NewVhcl, &[A::Int, A::Int, A::Int, A::Sprite, A::Int, A::Int, A::Int])
            .only(C3)
            .weighty(),
        cmd(Opcode::Cabn, &[A::Int, A::Int, A::Int, A::Int]).only(C3),
        cmd(Opcode::Spas, &[A::Agent, A::Agent]).only(C3).weighty(),
        cmd(Opcode::Dpas, &[A::Int, A::Int, A::Int]).only(C3).weighty(),
        cmd(Opcode::MesgWrit, &[A::Agent, A::Int]),
        cmd(Opcode::MesgWrtp, &[A::Agent, A::Int, A::Any, A::Any, A::Int]),
        cmd(Opcode::PrtInew, &[A::Int, A::Int, A::Int, A::Str, A::Str, A::Int]).only(C3),
        cmd(Opcode::PrtOnew, &[A::Int, A::Int, A::Int, A::Str, A::Str]).only(C3),
        cmd(Opcode::PrtIzap, &[A::Int]).only(C3),
        cmd(Opcode::PrtOzap, &[A::Int]).only(C3),
        cmd(Opcode::PrtJoin, &[A::Agent, A::Int, A::Agent, A::Int]).only(C3),
        cmd(Opcode::PrtKrak, &[A::Agent, A::Int, A::Int]).only(C3),
        cmd(Opcode::PrtSend, &[A::Int, A::Any]).only(C3),
        cmd(Opcode::PrtBang, &[A::Int]).only(C3),
        cmd(Opcode::PrtBnew, &[A::Int, A::Int, A::Bytes]).only(C3),
        cmd(Opcode::PrtBzap, &[A::Int, A::Int]).only(C3),
    ]
});

static FUNCTIONS: Lazy<Vec<CommandSpec>> = Lazy::new(|| {
    vec![
        func(Opcode::GetTarg, &[], V::Agent),
        func(Opcode::Ownr, &[], V::Agent),
        func(Opcode::Null, &[], V::Agent),
        func(Opcode::From, &[], V::Agent),
        func(Opcode::P1, &[], V::Any),
        func(Opcode::P2, &[], V::Any),
        func(Opcode::Fmly, &[], V::Int),
        func(Opcode::Gnus, &[], V::Int),
        func(Opcode::Spcs, &[], V::Int),
        func(Opcode::GetAttr, &[], V::Int),
        func(Opcode::GetBhvr, &[], V::Int),
        func(Opcode::GetPose, &[], V::Int),
        func(Opcode::Totl, &[A::Int, A::Int, A::Int], V::Int),
        func(Opcode::Avar, &[A::Agent, A::Int], V::Any).only(C3).settable(),
        func(Opcode::Posx, &[], V::Float),
        func(Opcode::Posy, &[], V::Float),
        func(Opcode::Velx, &[], V::Float).settable(),
        func(Opcode::Vely, &[], V::Float).settable(),
        func(Opcode::GetAccg, &[], V::Float),
        func(Opcode::GetElas, &[], V::Int),
        func(Opcode::GetFric, &[], V::Int),
        func(Opcode::GetTslc, &[], V::Int),
        func(Opcode::PrtItot, &[], V::Int).only(C3),
        func(Opcode::PrtOtot, &[], V::Int).only(C3),
        func(Opcode::PrtBtot, &[A::Int], V::Int).only(C3),
        func(Opcode::PrtBinf, &[A::Int, A::Int], V::Bytes).only(C3),
        func(Opcode::Lowa, &[A::Str], V::Str).only(C3),
        func(Opcode::Uppa, &[A::Str], V::Str).only(C3),
        func(Opcode::Strl, &[A::Str], V::Int).only(C3),
        func(Opcode::Subs, &[A::Str, A::Int, A::Int], V::Str).only(C3),
        func(Opcode::Vtos, &[A::Decimal], V::Str).only(C3),
        func(Opcode::Stoi, &[A::Str], V::Int).only(C3),
        func(Opcode::Stof, &[A::Str], V::Float).only(C3),
        func(Opcode::Sins, &[A::Str, A::Int, A::Str], V::Int).only(C3),
        func(Opcode::GetChar, &[A::Str, A::Int], V::Int).only(C3),
        func(Opcode::Rand, &[A::Int, A::Int], V::Int),
        func(Opcode::Itof, &[A::Decimal], V::Float).only(C3),
        func(Opcode::Ftoi, &[A::Decimal], V::Int).only(C3),
        func(Opcode::Sqrt, &[A::Decimal], V::Float).only(C3),
        func(Opcode::Sin, &[A::Decimal], V::Float).only(C3),
        func(Opcode::Cos, &[A::Decimal], V::Float).only(C3),
        func(Opcode::Tan, &[A::Decimal], V::Float).only(C3),
        func(Opcode::Atan, &[A::Decimal], V::Float).only(C3),
        func(Opcode::VecMake, &[A::Decimal, A::Decimal], V::Vector).only(C3),
        func(Opcode::VecUnit, &[A::Decimal], V::Vector).only(C3),
        func(Opcode::VecAngl, &[A::Vector], V::Float).only(C3),
        func(Opcode::VecMagn, &[A::Vector], V::Float).only(C3),
        func(Opcode::VecNull, &[], V::Vector).only(C3),
        func(Opcode::VecDotp, &[A::Vector, A::Vector], V::Float).only(C3),
        func(Opcode::Game, &[A::Str], V::Any).only(C3).settable(),
        func(Opcode::Wtik, &[], V::Int),
        func(Opcode::Mows, &[], V::Int).only(C3),
        func(Opcode::Pttv, &[A::Int], V::Agent).only(C3),
        func(
            Opcode::Caos,
            &[A::Int, A::Int, A::Any, A::Any, A::Str, A::Int, A::Int, A::Var],
            V::Str,
        )
        .only(C3),
    ]
});

type SpecIndex = HashMap<&'static str, Vec<&'static CommandSpec>>;

fn index(table: &'static [CommandSpec]) -> SpecIndex {
    let mut map: SpecIndex = HashMap::new();
    for spec in table {
        map.entry(spec.name()).or_default().push(spec);
    }
    map
}

static COMMAND_INDEX: Lazy<SpecIndex> = Lazy::new(|| index(&COMMANDS));
static FUNCTION_INDEX: Lazy<SpecIndex> = Lazy::new(|| index(&FUNCTIONS));
static BY_OPCODE: Lazy<HashMap<Opcode, &'static CommandSpec>> =
    Lazy::new(|| COMMANDS.iter().chain(FUNCTIONS.iter()).map(|s| (s.opcode, s)).collect());

/// Catalogue entry for an opcode.
pub fn spec(op: Opcode) -> Option<&'static CommandSpec> {
    BY_OPCODE.get(&op).copied()
}

/// Static result kind of an expression-command.
pub fn function_returns(op: Opcode) -> ValueKind {
    spec(op).and_then(|s| s.returns).unwrap_or(ValueKind::Any)
}

/// Words that open a two-token opcode name.
const NAMESPACES: &[&str] = &["DBG:", "NEW:", "VEC:", "PRT:", "MESG"];

pub fn is_namespace(word_upper: &str) -> bool {
    NAMESPACES.contains(&word_upper)
}

fn find(index: &SpecIndex, name: &str, dialect: Dialect) -> Option<&'static CommandSpec> {
    index.get(name)?.iter().copied().find(|s| s.available_in(dialect))
}

/// Statement-position lookup by full upper-cased name (e.g. `"NEW: SIMP"`).
pub fn command(name: &str, dialect: Dialect) -> Option<&'static CommandSpec> {
    find(&COMMAND_INDEX, name, dialect)
}

/// Expression-position lookup by full upper-cased name.
pub fn function(name: &str, dialect: Dialect) -> Option<&'static CommandSpec> {
    find(&FUNCTION_INDEX, name, dialect)
}

/// Whether the name exists in any dialect, statement or expression position.
pub fn is_known_anywhere(name: &str) -> bool {
    COMMAND_INDEX.contains_key(name) || FUNCTION_INDEX.contains_key(name)
}

/// Every command and function available in a dialect, in catalogue order.
pub fn catalogue(dialect: Dialect) -> Vec<&'static CommandSpec> {
    COMMANDS.iter().chain(FUNCTIONS.iter()).filter(|s| s.available_in(dialect)).collect()
}

/// All names, for spelling suggestions.
pub fn all_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> =
        COMMAND_INDEX.keys().chain(FUNCTION_INDEX.keys()).copied().collect();
    names.sort_unstable();
    names.dedup();
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_every_opcode_is_catalogued() {
        for op in Opcode::iter() {
            let found = COMMANDS.iter().chain(FUNCTIONS.iter()).any(|s| s.opcode == op);
            assert!(found, "{:?} has no catalogue entry", op);
        }
    }

    #[test]
    fn test_new_simp_differs_by_family() {
        assert_eq!(command("NEW: SIMP", Dialect::C3).unwrap().opcode, Opcode::NewSimp);
        assert_eq!(command("NEW: SIMP", Dialect::C1).unwrap().opcode, Opcode::NewSimpClassic);
        assert_eq!(command("NEW: SIMP", Dialect::C2).unwrap().args.len(), 5);
    }

    #[test]
    fn test_command_and_function_share_names() {
        assert_eq!(command("ATTR", Dialect::C3).unwrap().opcode, Opcode::Attr);
        assert_eq!(function("ATTR", Dialect::C3).unwrap().opcode, Opcode::GetAttr);
        assert_eq!(Opcode::GetTslc.name(), "DBG: TSLC");
    }

    #[test]
    fn test_costs() {
        let setv = command("SETV", Dialect::C1).unwrap();
        let kill = command("KILL", Dialect::C1).unwrap();
        assert_eq!(setv.cost(Dialect::C1), 0);
        assert_eq!(kill.cost(Dialect::C1), 1);
        assert_eq!(setv.cost(Dialect::C3), 1);
    }

    #[test]
    fn test_vehicle_commands_are_c3_only() {
        let vhcl = command("NEW: VHCL", Dialect::C3).unwrap();
        assert_eq!(vhcl.opcode, Opcode::NewVhcl);
        assert!(vhcl.agent_affecting);
        assert!(command("NEW: VHCL", Dialect::C2).is_none());
        assert_eq!(command("SPAS", Dialect::C3).unwrap().args, &[ArgKind::Agent, ArgKind::Agent]);
        assert_eq!(function("PTTV", Dialect::C3).unwrap().returns, Some(ValueKind::Agent));
        assert_eq!(function("MOWS", Dialect::C3).unwrap().returns, Some(ValueKind::Int));
        assert!(command("EMIT", Dialect::C3).is_some());
    }

    #[test]
    fn test_availability() {
        assert!(function("VTOS", Dialect::C3).is_some());
        assert!(function("VTOS", Dialect::C2).is_none());
        assert!(is_known_anywhere("VTOS"));
        assert!(is_namespace("MESG"));
    }
}
