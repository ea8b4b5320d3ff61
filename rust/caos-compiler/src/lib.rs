//! CAOS Compiler
//!
//! Turns CAOS source text into `ParsedScript`s for one of the supported
//! dialects (`c1`, `c2`, `c3`, `cv`, `sm`).

pub mod compiler;
pub mod diagnostics;

pub use compiler::ast::{Classifier, ParsedScript, Script};
pub use compiler::dialect::{Dialect, Family};
pub use compiler::tokens::Span;
pub use diagnostics::{Diagnostic, ErrorKind};

use compiler::lexer::Lexer;
use compiler::parser::Parser;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unknown dialect '{name}'")]
    UnknownDialect { name: String },
    #[error("lex error: {0}")]
    Lex(#[from] compiler::lexer::LexError),
    #[error("parse error: {0}")]
    Parse(#[from] compiler::parser::ParseError),
}

impl CompileError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CompileError::Parse(e) if e.is_name_error() => ErrorKind::Name,
            _ => ErrorKind::Syntax,
        }
    }

    /// Render against the source it came from.
    pub fn to_diagnostic(&self, source: &str, filename: &str) -> Diagnostic {
        diagnostics::format_compile_error(self, source, filename)
    }
}

/// Parse `source` in the dialect named `dialect_name`.
pub fn parse(dialect_name: &str, source: &str) -> Result<ParsedScript, CompileError> {
    let dialect = Dialect::from_name(dialect_name)
        .ok_or_else(|| CompileError::UnknownDialect { name: dialect_name.to_string() })?;
    parse_dialect(dialect, source)
}

pub fn parse_dialect(dialect: Dialect, source: &str) -> Result<ParsedScript, CompileError> {
    let tokens = Lexer::new(source, dialect).tokenize()?;
    let mut parser = Parser::new(tokens, dialect);
    Ok(parser.parse_file()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_dialect() {
        let err = parse("unknown dialect", "").unwrap_err();
        assert!(matches!(err, CompileError::UnknownDialect { .. }));
        assert_eq!(err.kind(), ErrorKind::Syntax);
    }

    #[test]
    fn test_empty_source_parses_in_every_dialect() {
        for dialect in Dialect::all() {
            let script = parse(dialect.name(), "").unwrap();
            assert_eq!(script.dialect, *dialect);
            assert!(script.events.is_empty());
        }
    }

    #[test]
    fn test_name_error_kind() {
        assert_eq!(parse("c3", "gsub missing").unwrap_err().kind(), ErrorKind::Name);
    }
}
