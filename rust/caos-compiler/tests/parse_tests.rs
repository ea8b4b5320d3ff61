//! Parser behaviour across dialects: lexing quirks, block structure,
//! subroutine resolution and error classification.

use caos_compiler::compiler::ast::{Operand, Stmt, Tail, VarRef};
use caos_compiler::compiler::opcodes::Opcode;
use caos_compiler::{parse, CompileError, ErrorKind, Script};

fn root_stmts(script: &Script) -> &[Stmt] {
    &script.block(script.root).stmts
}

fn parses(dialect: &str, src: &str) -> bool {
    parse(dialect, src).is_ok()
}

fn error_kind(dialect: &str, src: &str) -> ErrorKind {
    parse(dialect, src).expect_err("expected a parse failure").kind()
}

// ============================================================================
// Lexing
// ============================================================================

#[test]
fn comment_on_last_line_is_fine() {
    assert!(parses("c3", "** Make sure we can handle a file ending with a comment"));
    assert!(parses("c1", "setv var0 1\n* trailing"));
}

#[test]
fn numeric_literal_forms() {
    let src = "setv va00 0\nsetv va00 1\nsetv va00 -5\nsetv va00 0.4\nsetv va00 -3.2\nsetv va00 -.4\nsetv va00 .3\nsetv va00 3.";
    let script = parse("c3", src).unwrap();
    assert_eq!(root_stmts(&script.installer).len(), 8);
}

#[test]
fn keywords_are_case_insensitive() {
    assert!(parses("c3", "SeTv Va00 1 dOiF va00 Eq 1 EnDi"));
}

#[test]
fn unterminated_literals_are_syntax_errors() {
    assert_eq!(error_kind("c3", "sets va00 \"abc"), ErrorKind::Syntax);
    assert_eq!(error_kind("c3", "anim [1 2 3"), ErrorKind::Syntax);
    assert_eq!(error_kind("c3", "setv va00 'a"), ErrorKind::Syntax);
}

#[test]
fn unknown_dialect_fails_before_parsing() {
    assert!(matches!(parse("unknown dialect", ""), Err(CompileError::UnknownDialect { .. })));
}

// ============================================================================
// Block structure
// ============================================================================

#[test]
fn nested_if_blocks() {
    let src = r#"
        DOIF 1 eq 2
         DOIF 1 eq 1
          DBG: FAIL
         ELSE
          DBG: FAIL
         ENDI
        ELSE
         DOIF 1 eq 1
         ELSE
          DBG: FAIL
         ENDI
        ENDI
    "#;
    let script = parse("c3", src).unwrap().installer;
    match &root_stmts(&script)[0] {
        Stmt::If { branches, otherwise, .. } => {
            assert_eq!(branches.len(), 1);
            let else_block = script.block(otherwise.unwrap());
            assert!(matches!(else_block.stmts[0], Stmt::If { .. }));
        }
        other => panic!("expected DOIF, got {:?}", other),
    }
}

#[test]
fn loop_tails() {
    let script = parse("c3", "loop addv va00 1 untl va00 eq 3 loop stop ever").unwrap().installer;
    let stmts = root_stmts(&script);
    match (&stmts[0], &stmts[1]) {
        (Stmt::Loop { body: a, .. }, Stmt::Loop { body: b, .. }) => {
            assert!(matches!(script.block(*a).tail, Tail::Until(_)));
            assert_eq!(script.block(*b).tail, Tail::Ever);
        }
        other => panic!("expected two loops, got {:?}", other),
    }
}

#[test]
fn reps_and_enum_bodies() {
    let script = parse("c3", "reps 4 addv va00 1 repe enum 3 2 1 kill targ next").unwrap().installer;
    let stmts = root_stmts(&script);
    assert!(matches!(&stmts[0], Stmt::Reps { body, .. } if script.block(*body).tail == Tail::Repeat));
    assert!(matches!(&stmts[1], Stmt::Enum { body, .. } if script.block(*body).tail == Tail::Next));
}

#[test]
fn stray_closers_are_rejected() {
    assert_eq!(error_kind("c3", "endi"), ErrorKind::Syntax);
    assert_eq!(error_kind("c3", "next"), ErrorKind::Syntax);
    assert_eq!(error_kind("c3", "doif 1 eq 1 repe"), ErrorKind::Syntax);
}

// ============================================================================
// Subroutines
// ============================================================================

#[test]
fn gsub_resolves_forward_labels() {
    let src = "SETV VA00 5\nREPS 4\n  GSUB t2\nREPE\nSUBR t2\n ADDV VA00 1\nRETN";
    let script = parse("c3", src).unwrap().installer;
    let target = script.subroutine("t2").unwrap();
    match &root_stmts(&script)[1] {
        Stmt::Reps { body, .. } => {
            assert!(matches!(script.block(*body).stmts[0], Stmt::Gosub { target: t, .. } if t == target));
        }
        other => panic!("expected REPS, got {:?}", other),
    }
}

#[test]
fn labels_allow_punctuation() {
    assert!(parses("c3", "gsub eye-roll subr eye-roll retn"));
    assert!(parses("c1", "GSUB go_to_bed SUBR go_to_bed ADDV VAR0 1 RETN"));
}

#[test]
fn unresolved_label_is_name_error() {
    assert_eq!(error_kind("c3", "gsub nowhere"), ErrorKind::Name);
}

#[test]
fn subroutines_are_scoped_per_script_body() {
    // the event script cannot see the installer's label
    assert_eq!(error_kind("c3", "subr a retn scrp 1 2 3 9 gsub a endm"), ErrorKind::Name);
}

// ============================================================================
// Dialect differences
// ============================================================================

#[test]
fn classic_dialects_use_short_variables() {
    let script = parse("c2", "setv var3 1 setv obv4 2 setv va12 3 setv ov12 4").unwrap().installer;
    let dests: Vec<&Operand> = root_stmts(&script)
        .iter()
        .map(|s| match s {
            Stmt::Command(i) => &i.args[0],
            other => panic!("unexpected {:?}", other),
        })
        .collect();
    assert_eq!(dests[0], &Operand::Var(VarRef::Local(3)));
    assert_eq!(dests[1], &Operand::Var(VarRef::Target(4)));
    assert_eq!(dests[2], &Operand::Var(VarRef::Local(12)));
    assert_eq!(dests[3], &Operand::Var(VarRef::Target(12)));
}

#[test]
fn c1_has_no_two_digit_variables() {
    assert_eq!(error_kind("c1", "setv va00 1"), ErrorKind::Name);
}

#[test]
fn commas_depend_on_dialect() {
    assert!(parses("c1", "setv,var0,1"));
    assert_eq!(error_kind("c3", "setv,va00,1"), ErrorKind::Syntax);
}

#[test]
fn c3_only_commands_are_unknown_in_classic() {
    assert_eq!(error_kind("c2", "sets va00 \"x\""), ErrorKind::Name);
    assert!(parses("sm", "sets va00 \"x\""));
    assert!(parses("cv", "sets va00 \"x\""));
}

#[test]
fn char_literal_is_an_integer_operand() {
    let script = parse("c3", "dbg: asrt 'C' = 67").unwrap().installer;
    match &root_stmts(&script)[0] {
        Stmt::Command(i) => assert_eq!(i.op, Opcode::DbgAsrt),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn literal_type_is_checked() {
    assert_eq!(error_kind("c3", "addv va00 \"1\""), ErrorKind::Syntax);
    assert_eq!(error_kind("c3", "outs 5"), ErrorKind::Syntax);
    assert_eq!(error_kind("c3", "strl 5"), ErrorKind::Name);
    assert_eq!(error_kind("c3", "setv va00 strl 5"), ErrorKind::Syntax);
}
