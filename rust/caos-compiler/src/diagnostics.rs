//! Rich error diagnostics with source snippets, colors, and suggestions.

use crate::compiler::lexer::LexError;
use crate::compiler::opcodes;
use crate::compiler::parser::ParseError;
use crate::CompileError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// Error taxonomy shared by the parser and the virtual machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Syntax,
    Name,
    Type,
    Runtime,
    Assertion,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Syntax => "E0100",
            ErrorKind::Name => "E0200",
            ErrorKind::Type => "E0300",
            ErrorKind::Runtime => "E0400",
            ErrorKind::Assertion => "E0500",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Name => "name error",
            ErrorKind::Type => "type error",
            ErrorKind::Runtime => "runtime fault",
            ErrorKind::Assertion => "assertion failed",
        };
        f.write_str(label)
    }
}

/// A rendered diagnostic with source context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<usize>,
    pub col: Option<usize>,
    pub source_line: Option<String>,
    pub underline: Option<String>,
    pub suggestions: Vec<String>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let severity = match kind {
            ErrorKind::Assertion => Severity::Warning,
            _ => Severity::Error,
        };
        Self {
            severity,
            kind,
            code: kind.code().to_string(),
            message: message.into(),
            file: None,
            line: None,
            col: None,
            source_line: None,
            underline: None,
            suggestions: vec![],
        }
    }

    /// Attach a position, pulling the offending line out of `source`.
    pub fn at(mut self, source: &str, filename: &str, line: usize, col: usize, width: usize) -> Self {
        self.file = Some(filename.to_string());
        if line > 0 {
            self.line = Some(line);
            self.col = Some(col);
            self.source_line = get_source_line(source, line);
            self.underline = self.source_line.as_ref().map(|_| make_underline(col, width));
        }
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    /// Render with ANSI colors for terminal
    pub fn render_ansi(&self) -> String {
        let mut out = String::new();

        let severity_label = match self.severity {
            Severity::Error => red("error"),
            Severity::Warning => yellow("warning"),
            Severity::Note => cyan("note"),
        };
        out.push_str(&format!("{}[{}]: ", severity_label, bold(&self.code)));
        out.push_str(&bold(&self.message));
        out.push('\n');

        if let (Some(file), Some(line), Some(col)) = (&self.file, self.line, self.col) {
            out.push_str(&format!("  {} {}:{}:{}\n", cyan("-->"), file, line, col));
        } else if let Some(file) = &self.file {
            out.push_str(&format!("  {} {}\n", cyan("-->"), file));
        }

        if let (Some(line_num), Some(line_text), Some(underline)) =
            (self.line, &self.source_line, &self.underline)
        {
            out.push_str(&format!("   {}\n", cyan("|")));
            out.push_str(&format!("{:>3} {} {}\n", cyan(&line_num.to_string()), cyan("|"), line_text));
            out.push_str(&format!("   {} {}\n", cyan("|"), red(underline)));
        }

        if !self.suggestions.is_empty() {
            out.push_str(&format!("   {}\n", cyan("|")));
            for suggestion in &self.suggestions {
                out.push_str(&format!("   {} {}: {}\n", cyan("="), cyan("help"), suggestion));
            }
        }

        out
    }

    /// Render without colors (for logs, tests)
    pub fn render_plain(&self) -> String {
        let mut out = String::new();

        let severity_label = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        out.push_str(&format!("{}[{}]: {}\n", severity_label, self.code, self.message));

        if let (Some(file), Some(line), Some(col)) = (&self.file, self.line, self.col) {
            out.push_str(&format!("  --> {}:{}:{}\n", file, line, col));
        } else if let Some(file) = &self.file {
            out.push_str(&format!("  --> {}\n", file));
        }

        if let (Some(line_num), Some(line_text), Some(underline)) =
            (self.line, &self.source_line, &self.underline)
        {
            out.push_str("   |\n");
            out.push_str(&format!("{:>3} | {}\n", line_num, line_text));
            out.push_str(&format!("   | {}\n", underline));
        }

        if !self.suggestions.is_empty() {
            out.push_str("   |\n");
            for suggestion in &self.suggestions {
                out.push_str(&format!("   = help: {}\n", suggestion));
            }
        }

        out
    }
}

// ANSI color helpers
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}

fn yellow(s: &str) -> String {
    format!("\x1b[33m{}\x1b[0m", s)
}

fn cyan(s: &str) -> String {
    format!("\x1b[36m{}\x1b[0m", s)
}

fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

// Source line extraction
fn get_source_line(source: &str, line: usize) -> Option<String> {
    source.lines().nth(line.saturating_sub(1)).map(|s| s.to_string())
}

fn make_underline(col: usize, len: usize) -> String {
    format!("{}{}", " ".repeat(col.saturating_sub(1)), "^".repeat(len.max(1)))
}

// Edit distance for suggestions
fn edit_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (a_len, b_len) = (a_chars.len(), b_chars.len());
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut cur = vec![0; b_len + 1];
    for i in 1..=a_len {
        cur[0] = i;
        for j in 1..=b_len {
            let cost = usize::from(a_chars[i - 1] != b_chars[j - 1]);
            cur[j] = (prev[j] + 1).min(cur[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b_len]
}

fn suggest_similar(name: &str, candidates: &[&str], max_distance: usize) -> Vec<String> {
    let mut matches: Vec<(usize, String)> = candidates
        .iter()
        .filter_map(|c| {
            let d = edit_distance(name, c);
            (d <= max_distance).then(|| (d, c.to_string()))
        })
        .collect();
    matches.sort_by_key(|(d, _)| *d);
    matches.into_iter().map(|(_, s)| s).take(3).collect()
}

/// Convert a CompileError + source text into a Diagnostic
pub fn format_compile_error(error: &CompileError, source: &str, filename: &str) -> Diagnostic {
    match error {
        CompileError::UnknownDialect { name } => {
            Diagnostic::new(ErrorKind::Syntax, format!("unknown dialect '{}'", name))
                .at(source, filename, 0, 0, 0)
                .with_suggestions(vec!["known dialects are c1, c2, c3, cv and sm".to_string()])
        }
        CompileError::Lex(e) => format_lex_error(e, source, filename),
        CompileError::Parse(e) => format_parse_error(e, source, filename),
    }
}

fn format_lex_error(error: &LexError, source: &str, filename: &str) -> Diagnostic {
    let span = error.span();
    let (message, suggestion) = match error {
        LexError::UnexpectedChar { ch, .. } => (format!("unexpected character '{}'", ch), None),
        LexError::UnterminatedString { .. } => {
            ("unterminated string literal".to_string(), Some("add a closing quote"))
        }
        LexError::UnterminatedChar { .. } => {
            ("unterminated character literal".to_string(), Some("character literals look like 'C'"))
        }
        LexError::UnterminatedBytes { .. } => {
            ("unterminated byte-string".to_string(), Some("add a closing ']'"))
        }
        LexError::InvalidNumber { .. } => ("invalid number literal".to_string(), None),
        LexError::InvalidByte { text, .. } => (
            format!("invalid byte value '{}'", text),
            Some("byte-string entries are decimal numbers from 0 to 255"),
        ),
    };
    let width = span.end.saturating_sub(span.start).max(1);
    Diagnostic::new(ErrorKind::Syntax, message)
        .at(source, filename, span.line, span.col, width)
        .with_suggestions(suggestion.map(str::to_string).into_iter().collect())
}

fn format_parse_error(error: &ParseError, source: &str, filename: &str) -> Diagnostic {
    let (line, col) = error.line_col();
    let kind = if error.is_name_error() {
        ErrorKind::Name
    } else {
        ErrorKind::Syntax
    };
    let suggestions = match error {
        ParseError::UnknownCommand { name, .. } => {
            let names = opcodes::all_names();
            suggest_similar(name, &names, 2)
                .into_iter()
                .map(|s| format!("did you mean '{}'?", s))
                .collect()
        }
        ParseError::UnexpectedEof { expected, .. } => vec![format!("add the missing {}", expected)],
        _ => vec![],
    };
    Diagnostic::new(kind, error.to_string())
        .at(source, filename, line, col, 1)
        .with_suggestions(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("SETV", "SETS"), 1);
        assert_eq!(edit_distance("", "ABC"), 3);
        assert_eq!(edit_distance("ADDV", "ADDV"), 0);
    }

    #[test]
    fn test_unknown_command_suggests() {
        let err = crate::parse("c3", "setx va00 1").unwrap_err();
        let diag = format_compile_error(&err, "setx va00 1", "test.cos");
        assert_eq!(diag.code, "E0200");
        assert!(diag.suggestions.iter().any(|s| s.contains("SETV")));
        let plain = diag.render_plain();
        assert!(plain.contains("test.cos:1:1"));
        assert!(plain.contains("^"));
    }

    #[test]
    fn test_syntax_diagnostic_serializes() {
        let err = crate::parse("c3", "sets va00 \"open").unwrap_err();
        let diag = format_compile_error(&err, "sets va00 \"open", "x.cos");
        assert_eq!(diag.kind, ErrorKind::Syntax);
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"code\":\"E0100\""));
    }
}
