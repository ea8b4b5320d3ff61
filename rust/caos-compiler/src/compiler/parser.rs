//! Recursive-descent parser producing structured `Script` bodies.

use crate::compiler::ast::*;
use crate::compiler::dialect::Dialect;
use crate::compiler::opcodes::{self, ArgKind, CommandSpec, ValueKind};
use crate::compiler::tokens::{Span, Token, TokenKind};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected {found} at line {line}, col {col}; expected {expected}")]
    Unexpected { found: String, expected: String, line: usize, col: usize },
    #[error("unexpected end of script at line {line}, col {col}; expected {expected}")]
    UnexpectedEof { expected: String, line: usize, col: usize },
    #[error("unknown command '{name}' for dialect {dialect} at line {line}, col {col}")]
    UnknownCommand { name: String, dialect: Dialect, line: usize, col: usize },
    #[error("argument {index} of {command} expects {expected}, found {found} at line {line}, col {col}")]
    ArgumentMismatch {
        command: String,
        index: usize,
        expected: String,
        found: String,
        line: usize,
        col: usize,
    },
    #[error("'{name}' cannot be assigned to (line {line}, col {col})")]
    NotAssignable { name: String, line: usize, col: usize },
    #[error("no subroutine named '{label}' (line {line}, col {col})")]
    UnknownLabel { label: String, line: usize, col: usize },
    #[error("subroutine '{label}' defined twice (line {line}, col {col})")]
    DuplicateLabel { label: String, line: usize, col: usize },
}

impl ParseError {
    pub fn line_col(&self) -> (usize, usize) {
        match self {
            ParseError::Unexpected { line, col, .. }
            | ParseError::UnexpectedEof { line, col, .. }
            | ParseError::UnknownCommand { line, col, .. }
            | ParseError::ArgumentMismatch { line, col, .. }
            | ParseError::NotAssignable { line, col, .. }
            | ParseError::UnknownLabel { line, col, .. }
            | ParseError::DuplicateLabel { line, col, .. } => (*line, *col),
        }
    }

    /// Name-resolution failures, as opposed to malformed text.
    pub fn is_name_error(&self) -> bool {
        matches!(
            self,
            ParseError::UnknownCommand { .. }
                | ParseError::UnknownLabel { .. }
                | ParseError::DuplicateLabel { .. }
        )
    }
}

const UNRESOLVED: BlockId = BlockId(usize::MAX);

const SECTION_WORDS: &[&str] = &["SCRP", "ENDM", "RSCR", "ISCR"];
const CLOSING_WORDS: &[&str] = &["ELIF", "ELSE", "ENDI", "UNTL", "EVER", "REPE", "NEXT", "RETN"];

/// Accumulates the blocks of one executable body.
#[derive(Default)]
struct BodyBuilder {
    blocks: Vec<Block>,
    subroutines: BTreeMap<String, BlockId>,
    root: Vec<Stmt>,
}

impl BodyBuilder {
    fn add_block(&mut self, stmts: Vec<Stmt>, tail: Tail, tail_span: Span) -> BlockId {
        self.blocks.push(Block { stmts, tail, tail_span });
        BlockId(self.blocks.len() - 1)
    }

    fn finish(mut self, dialect: Dialect, end: Span) -> Result<Script, ParseError> {
        let stmts = std::mem::take(&mut self.root);
        let root = self.add_block(stmts, Tail::Fallthrough, end);
        for block in &mut self.blocks {
            for stmt in &mut block.stmts {
                if let Stmt::Gosub { label, target, span } = stmt {
                    *target = *self.subroutines.get(label.as_str()).ok_or_else(|| {
                        ParseError::UnknownLabel { label: label.clone(), line: span.line, col: span.col }
                    })?;
                }
            }
        }
        Ok(Script { dialect, root, blocks: self.blocks, subroutines: self.subroutines })
    }
}

/// Where a statement list stopped.
struct Stop {
    word: Option<String>,
    span: Span,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    dialect: Dialect,
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>, dialect: Dialect) -> Self {
        if !matches!(tokens.last().map(|t| &t.kind), Some(TokenKind::Eof)) {
            let span = tokens.last().map(|t| t.span).unwrap_or_else(Span::dummy);
            tokens.push(Token::new(TokenKind::Eof, span));
        }
        Self { tokens, pos: 0, dialect }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn peek_upper(&self) -> Option<String> {
        self.current().kind.upper()
    }

    fn unexpected(&self, tok: &Token, expected: &str) -> ParseError {
        match tok.kind {
            TokenKind::Eof => ParseError::UnexpectedEof {
                expected: expected.to_string(), line: tok.span.line, col: tok.span.col,
            },
            _ => ParseError::Unexpected {
                found: format!("'{}'", tok.kind), expected: expected.to_string(),
                line: tok.span.line, col: tok.span.col,
            },
        }
    }

    fn expect_word(&mut self, expected: &str) -> Result<(String, Span), ParseError> {
        let tok = self.advance();
        match tok.kind.upper() {
            Some(w) => Ok((w, tok.span)),
            None => Err(self.unexpected(&tok, expected)),
        }
    }

    fn expect_int_literal(&mut self, expected: &str, max: i32) -> Result<i32, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::IntLit(n) if (0..=max).contains(&n) => Ok(n),
            _ => Err(self.unexpected(&tok, expected)),
        }
    }

    // ── Files and sections ──

    pub fn parse_file(&mut self) -> Result<ParsedScript, ParseError> {
        let mut installer = BodyBuilder::default();
        let mut removal: Option<BodyBuilder> = None;
        let mut events = Vec::new();
        let mut in_removal = false;
        loop {
            let builder = if in_removal {
                removal.get_or_insert_with(BodyBuilder::default)
            } else {
                &mut installer
            };
            let (stmts, stop) = self.parse_statements(builder, &[], true)?;
            builder.root.extend(stmts);
            match stop.word.as_deref() {
                None => break,
                Some("SCRP") => events.push(self.parse_event_script(stop.span)?),
                Some("RSCR") => in_removal = true,
                Some("ISCR") => in_removal = false,
                // stray ENDM outside an event script
                _ => {}
            }
        }
        let end = self.current().span;
        Ok(ParsedScript {
            dialect: self.dialect,
            installer: Arc::new(installer.finish(self.dialect, end)?),
            removal: match removal {
                Some(b) => Some(Arc::new(b.finish(self.dialect, end)?)),
                None => None,
            },
            events,
        })
    }

    fn parse_event_script(&mut self, _start: Span) -> Result<EventScript, ParseError> {
        let family = self.expect_int_literal("family number", u8::MAX as i32)?;
        let genus = self.expect_int_literal("genus number", u8::MAX as i32)?;
        let species = self.expect_int_literal("species number", u16::MAX as i32)?;
        let event = self.expect_int_literal("event number", u16::MAX as i32)?;
        let mut body = BodyBuilder::default();
        let (stmts, stop) = self.parse_statements(&mut body, &["ENDM"], false)?;
        body.root = stmts;
        Ok(EventScript {
            classifier: Classifier::new(family as u8, genus as u8, species as u16),
            event: event as u16,
            script: Arc::new(body.finish(self.dialect, stop.span)?),
        })
    }

    // ── Statements ──

    /// Parse statements until one of `terminators`, a section word (at top
    /// level), or end of input (at top level). The terminator is consumed.
    fn parse_statements(
        &mut self,
        b: &mut BodyBuilder,
        terminators: &[&str],
        top_level: bool,
    ) -> Result<(Vec<Stmt>, Stop), ParseError> {
        let mut stmts = Vec::new();
        loop {
            let tok = self.current().clone();
            let word = match &tok.kind {
                TokenKind::Eof if top_level => return Ok((stmts, Stop { word: None, span: tok.span })),
                TokenKind::Eof => return Err(self.unexpected(&tok, &terminators.join(" or "))),
                kind => match kind.upper() {
                    Some(w) => w,
                    None => return Err(self.unexpected(&tok, "a command")),
                },
            };
            if terminators.contains(&word.as_str()) || (top_level && SECTION_WORDS.contains(&word.as_str())) {
                self.advance();
                return Ok((stmts, Stop { word: Some(word), span: tok.span }));
            }
            stmts.push(self.parse_statement(b, &word, &tok)?);
        }
    }

    fn parse_statement(&mut self, b: &mut BodyBuilder, word: &str, tok: &Token) -> Result<Stmt, ParseError> {
        let span = tok.span;
        match word {
            "DOIF" => {
                self.advance();
                self.parse_if(b, span)
            }
            "LOOP" => {
                self.advance();
                let (stmts, stop) = self.parse_statements(b, &["UNTL", "EVER"], false)?;
                let tail = if stop.word.as_deref() == Some("UNTL") {
                    Tail::Until(self.parse_condition()?)
                } else {
                    Tail::Ever
                };
                Ok(Stmt::Loop { body: b.add_block(stmts, tail, stop.span), span })
            }
            "REPS" => {
                self.advance();
                let count = self.parse_arg(ArgKind::Int, "REPS", 1)?;
                let (stmts, stop) = self.parse_statements(b, &["REPE"], false)?;
                Ok(Stmt::Reps { count, body: b.add_block(stmts, Tail::Repeat, stop.span), span })
            }
            "ENUM" => {
                self.advance();
                let family = self.parse_arg(ArgKind::Int, "ENUM", 1)?;
                let genus = self.parse_arg(ArgKind::Int, "ENUM", 2)?;
                let species = self.parse_arg(ArgKind::Int, "ENUM", 3)?;
                let (stmts, stop) = self.parse_statements(b, &["NEXT"], false)?;
                let body = b.add_block(stmts, Tail::Next, stop.span);
                Ok(Stmt::Enum { family, genus, species, body, span })
            }
            "SUBR" => {
                self.advance();
                let (label, _) = self.expect_word("a subroutine label")?;
                let (stmts, stop) = self.parse_statements(b, &["RETN"], false)?;
                let body = b.add_block(stmts, Tail::Return, stop.span);
                if b.subroutines.insert(label.clone(), body).is_some() {
                    return Err(ParseError::DuplicateLabel { label, line: span.line, col: span.col });
                }
                Ok(Stmt::Subroutine { label, span })
            }
            "GSUB" => {
                self.advance();
                let (label, _) = self.expect_word("a subroutine label")?;
                Ok(Stmt::Gosub { label, target: UNRESOLVED, span })
            }
            "RETN" => {
                self.advance();
                Ok(Stmt::Return { span })
            }
            "STOP" => {
                self.advance();
                Ok(Stmt::Stop { span })
            }
            w if CLOSING_WORDS.contains(&w) || SECTION_WORDS.contains(&w) => {
                Err(self.unexpected(tok, "a command"))
            }
            _ => {
                let name = self.read_opcode_name()?;
                let spec = opcodes::command(&name, self.dialect).ok_or(ParseError::UnknownCommand {
                    name, dialect: self.dialect, line: span.line, col: span.col,
                })?;
                Ok(Stmt::Command(self.parse_call(spec, span)?))
            }
        }
    }

    fn parse_if(&mut self, b: &mut BodyBuilder, span: Span) -> Result<Stmt, ParseError> {
        let terminators: &[&str] = if self.dialect.allows_elif() {
            &["ELIF", "ELSE", "ENDI"]
        } else {
            &["ELSE", "ENDI"]
        };
        let mut branches = Vec::new();
        let mut otherwise = None;
        let mut cond = self.parse_condition()?;
        loop {
            let (stmts, stop) = self.parse_statements(b, terminators, false)?;
            branches.push((cond, b.add_block(stmts, Tail::Fallthrough, stop.span)));
            match stop.word.as_deref() {
                Some("ELIF") => cond = self.parse_condition()?,
                Some("ELSE") => {
                    let (stmts, stop) = self.parse_statements(b, &["ENDI"], false)?;
                    otherwise = Some(b.add_block(stmts, Tail::Fallthrough, stop.span));
                    break;
                }
                _ => break,
            }
        }
        Ok(Stmt::If { branches, otherwise, span })
    }

    // ── Commands and expressions ──

    /// Consume an opcode word, joining namespaced pairs like `NEW: SIMP`.
    fn read_opcode_name(&mut self) -> Result<String, ParseError> {
        let (first, _) = self.expect_word("a command")?;
        if opcodes::is_namespace(&first) {
            let (second, _) = self.expect_word(&format!("a {} sub-command", first))?;
            Ok(format!("{} {}", first, second))
        } else {
            Ok(first)
        }
    }

    fn parse_call(&mut self, spec: &'static CommandSpec, span: Span) -> Result<Instruction, ParseError> {
        let mut args = Vec::with_capacity(spec.args.len());
        for (i, kind) in spec.args.iter().enumerate() {
            args.push(self.parse_arg(*kind, spec.name(), i + 1)?);
        }
        Ok(Instruction { op: spec.opcode, args, span })
    }

    fn parse_arg(&mut self, kind: ArgKind, command: &str, index: usize) -> Result<Operand, ParseError> {
        match kind {
            ArgKind::Cond => return Ok(Operand::Condition(Box::new(self.parse_condition()?))),
            ArgKind::Var => return self.parse_lvalue(),
            ArgKind::Sprite if self.dialect.allows_bareword_strings() => {
                if let Some(word) = self.peek_upper() {
                    if self.variable(&word).is_none() && opcodes::function(&word, self.dialect).is_none() {
                        let tok = self.advance();
                        if let TokenKind::Word(raw) = tok.kind {
                            return Ok(Operand::Label(raw));
                        }
                    }
                }
            }
            _ => {}
        }
        let tok = self.current().clone();
        let mut operand = self.parse_expression()?;
        if matches!(kind, ArgKind::Str | ArgKind::Sprite) && self.dialect.bracket_literals_are_text() {
            if let Operand::Literal(Literal::Bytes(bytes)) = &operand {
                operand = Operand::Literal(Literal::Str(String::from_utf8_lossy(bytes).into_owned()));
            }
        }
        let found = operand_kind(&operand);
        if !kind.accepts(found) {
            return Err(ParseError::ArgumentMismatch {
                command: command.to_string(),
                index,
                expected: format!("{:?}", kind).to_lowercase(),
                found: format!("{:?}", found).to_lowercase(),
                line: tok.span.line,
                col: tok.span.col,
            });
        }
        Ok(operand)
    }

    fn parse_lvalue(&mut self) -> Result<Operand, ParseError> {
        let tok = self.current().clone();
        let word = match tok.kind.upper() {
            Some(w) => w,
            None => return Err(self.unexpected(&tok, "a variable")),
        };
        if let Some(var) = self.variable(&word) {
            self.advance();
            return Ok(Operand::Var(var));
        }
        let name = self.read_opcode_name()?;
        match opcodes::function(&name, self.dialect) {
            Some(spec) if spec.settable => Ok(Operand::Call(Box::new(self.parse_call(spec, tok.span)?))),
            Some(_) => Err(ParseError::NotAssignable { name, line: tok.span.line, col: tok.span.col }),
            None => Err(ParseError::UnknownCommand {
                name, dialect: self.dialect, line: tok.span.line, col: tok.span.col,
            }),
        }
    }

    fn parse_expression(&mut self) -> Result<Operand, ParseError> {
        let tok = self.current().clone();
        let literal = match &tok.kind {
            TokenKind::IntLit(n) => Some(Literal::Int(*n)),
            TokenKind::FloatLit(f) => Some(Literal::Float(*f)),
            TokenKind::StringLit(s) => Some(Literal::Str(s.clone())),
            TokenKind::BytesLit(b) => Some(Literal::Bytes(b.clone())),
            TokenKind::Word(_) => None,
            _ => return Err(self.unexpected(&tok, "a value")),
        };
        if let Some(lit) = literal {
            self.advance();
            return Ok(Operand::Literal(lit));
        }
        let word = tok.kind.upper().unwrap_or_default();
        if let Some(var) = self.variable(&word) {
            self.advance();
            return Ok(Operand::Var(var));
        }
        let name = self.read_opcode_name()?;
        let spec = opcodes::function(&name, self.dialect).ok_or(ParseError::UnknownCommand {
            name, dialect: self.dialect, line: tok.span.line, col: tok.span.col,
        })?;
        Ok(Operand::Call(Box::new(self.parse_call(spec, tok.span)?)))
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let first = self.parse_comparison()?;
        let mut rest = Vec::new();
        loop {
            let logic = match self.peek_upper().as_deref() {
                Some("AND") => Logic::And,
                Some("OR") => Logic::Or,
                _ => break,
            };
            self.advance();
            rest.push((logic, self.parse_comparison()?));
        }
        Ok(Condition { first, rest })
    }

    fn parse_comparison(&mut self) -> Result<Comparison, ParseError> {
        let lhs = self.parse_expression()?;
        let tok = self.advance();
        let op = match &tok.kind {
            TokenKind::Eq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::Ne,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::Le,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::Ge,
            TokenKind::Word(w) => match CmpOp::from_word(w) {
                Some(op) => op,
                None => return Err(self.unexpected(&tok, "a comparison operator")),
            },
            _ => return Err(self.unexpected(&tok, "a comparison operator")),
        };
        let rhs = self.parse_expression()?;
        Ok(Comparison { lhs, op, rhs })
    }

    /// Decode a variable name for the current dialect.
    fn variable(&self, word: &str) -> Option<VarRef> {
        let bytes = word.as_bytes();
        if bytes.len() != 4 {
            return None;
        }
        let two_digits = || -> Option<u8> {
            (bytes[2].is_ascii_digit() && bytes[3].is_ascii_digit())
                .then(|| (bytes[2] - b'0') * 10 + (bytes[3] - b'0'))
        };
        let last_digit = bytes[3].is_ascii_digit().then(|| bytes[3] - b'0');
        let d = self.dialect;
        match &word[..2] {
            "VA" if d.allows_two_digit_vars() && two_digits().is_some() => two_digits().map(VarRef::Local),
            "OV" if d.allows_two_digit_vars() && two_digits().is_some() => two_digits().map(VarRef::Target),
            "MV" if d.allows_owner_vars() => two_digits().map(VarRef::Owner),
            _ if word.starts_with("VAR") && d.allows_var_digit() => last_digit.map(VarRef::Local),
            _ if word.starts_with("OBV") => {
                let n = last_digit?;
                (n <= d.max_obv()?).then_some(VarRef::Target(n))
            }
            _ => None,
        }
    }
}

fn operand_kind(operand: &Operand) -> ValueKind {
    match operand {
        Operand::Literal(Literal::Int(_)) => ValueKind::Int,
        Operand::Literal(Literal::Float(_)) => ValueKind::Float,
        Operand::Literal(Literal::Str(_)) | Operand::Label(_) => ValueKind::Str,
        Operand::Literal(Literal::Bytes(_)) => ValueKind::Bytes,
        Operand::Call(call) => opcodes::function_returns(call.op),
        Operand::Var(_) | Operand::Condition(_) => ValueKind::Any,
    }
}
