//! Dialect-aware lexer for CAOS source text.

use crate::compiler::dialect::Dialect;
use crate::compiler::tokens::{Span, Token, TokenKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {}, col {}", .span.line, .span.col)]
    UnexpectedChar { ch: char, span: Span },
    #[error("unterminated string at line {}, col {}", .span.line, .span.col)]
    UnterminatedString { span: Span },
    #[error("unterminated character literal at line {}, col {}", .span.line, .span.col)]
    UnterminatedChar { span: Span },
    #[error("unterminated byte-string at line {}, col {}", .span.line, .span.col)]
    UnterminatedBytes { span: Span },
    #[error("invalid number at line {}, col {}", .span.line, .span.col)]
    InvalidNumber { span: Span },
    #[error("invalid byte value '{text}' at line {}, col {}", .span.line, .span.col)]
    InvalidByte { text: String, span: Span },
}

impl LexError {
    /// Source range of the offending text, from its first character to
    /// wherever lexing stopped.
    pub fn span(&self) -> Span {
        match self {
            LexError::UnexpectedChar { span, .. }
            | LexError::UnterminatedString { span }
            | LexError::UnterminatedChar { span }
            | LexError::UnterminatedBytes { span }
            | LexError::InvalidNumber { span }
            | LexError::InvalidByte { span, .. } => *span,
        }
    }
}

fn is_word_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_'
}

fn is_word_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | ':' | '+' | '-' | '#' | '$' | '!' | '?')
}

pub struct Lexer {
    source: Vec<char>,
    dialect: Dialect,
    pos: usize,
    line: usize,
    col: usize,
    byte_offset: usize,
}

impl Lexer {
    pub fn new(source: &str, dialect: Dialect) -> Self {
        Self { source: source.chars().collect(), dialect, pos: 0, line: 1, col: 1, byte_offset: 0 }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn peek2(&self) -> Option<char> {
        self.source.get(self.pos + 2).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        self.byte_offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    /// Where the next token starts: byte offset, line, column.
    fn mark(&self) -> (usize, usize, usize) {
        (self.byte_offset, self.line, self.col)
    }

    fn span_here(&self) -> Span {
        Span::new(self.byte_offset, self.byte_offset, self.line, self.col)
    }

    fn span_from(&self, (so, sl, sc): (usize, usize, usize)) -> Span {
        Span::new(so, self.byte_offset, sl, sc)
    }

    fn skip_comment(&mut self) {
        while matches!(self.current(), Some(c) if c != '\n') {
            self.advance();
        }
    }

    fn read_string(&mut self) -> Result<Token, LexError> {
        let start = self.mark();
        self.advance(); // opening quote
        let mut s = String::new();
        loop {
            let ch = match self.current() {
                None | Some('\n') => return Err(LexError::UnterminatedString { span: self.span_from(start) }),
                Some(ch) => ch,
            };
            self.advance();
            match ch {
                '"' => break,
                '\\' => {
                    let escaped = match self.current() {
                        Some('n') => "\n".to_string(),
                        Some('t') => "\t".to_string(),
                        Some('\\') => "\\".to_string(),
                        Some('"') => "\"".to_string(),
                        Some(c) => format!("\\{}", c),
                        None => return Err(LexError::UnterminatedString { span: self.span_from(start) }),
                    };
                    s.push_str(&escaped);
                    self.advance();
                }
                c => s.push(c),
            }
        }
        Ok(Token::new(TokenKind::StringLit(s), self.span_from(start)))
    }

    /// `'C'` yields the character's code point as an integer.
    fn read_char(&mut self) -> Result<Token, LexError> {
        let start = self.mark();
        self.advance(); // opening quote
        let ch = match self.advance() {
            Some('\\') => match self.advance() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some(c) => c,
                None => return Err(LexError::UnterminatedChar { span: self.span_from(start) }),
            },
            Some('\n') | None => return Err(LexError::UnterminatedChar { span: self.span_from(start) }),
            Some(c) => c,
        };
        if self.advance() != Some('\'') {
            return Err(LexError::UnterminatedChar { span: self.span_from(start) });
        }
        Ok(Token::new(TokenKind::IntLit(ch as i32), self.span_from(start)))
    }

    fn read_bytes(&mut self) -> Result<Token, LexError> {
        let start = self.mark();
        self.advance(); // '['
        let mut text = String::new();
        loop {
            match self.advance() {
                None => return Err(LexError::UnterminatedBytes { span: self.span_from(start) }),
                Some(']') => break,
                Some(c) => text.push(c),
            }
        }
        let span = self.span_from(start);
        if self.dialect.bracket_literals_are_text() {
            return Ok(Token::new(TokenKind::BytesLit(text.into_bytes()), span));
        }
        let mut bytes = Vec::new();
        for part in text.split_whitespace() {
            let b = part
                .parse::<u8>()
                .map_err(|_| LexError::InvalidByte { text: part.to_string(), span })?;
            bytes.push(b);
        }
        Ok(Token::new(TokenKind::BytesLit(bytes), span))
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.mark();
        let mut ns = String::new();
        let mut is_float = false;
        if self.current() == Some('-') {
            ns.push('-');
            self.advance();
        }
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() {
                ns.push(ch);
            } else if ch == '.' && !is_float {
                is_float = true;
                ns.push(ch);
            } else {
                break;
            }
            self.advance();
        }
        if matches!(self.current(), Some(c) if is_word_start(c)) {
            self.advance();
            return Err(LexError::InvalidNumber { span: self.span_from(start) });
        }
        let span = self.span_from(start);
        if is_float {
            if !self.dialect.allows_float_literals() {
                return Err(LexError::InvalidNumber { span });
            }
            // "-.4", ".3" and "3." are all accepted
            let normalized = match ns.as_str() {
                "." | "-." => return Err(LexError::InvalidNumber { span }),
                s if s.ends_with('.') => format!("{}0", s),
                s => s.to_string(),
            };
            normalized
                .parse::<f32>()
                .map(|f| Token::new(TokenKind::FloatLit(f), span))
                .map_err(|_| LexError::InvalidNumber { span })
        } else {
            ns.parse::<i32>()
                .map(|n| Token::new(TokenKind::IntLit(n), span))
                .map_err(|_| LexError::InvalidNumber { span })
        }
    }

    fn read_word(&mut self) -> Token {
        let start = self.mark();
        let mut w = String::new();
        while let Some(ch) = self.current().filter(|c| is_word_char(*c)) {
            w.push(ch);
            self.advance();
        }
        Token::new(TokenKind::Word(w), self.span_from(start))
    }

    fn starts_number(&self) -> bool {
        match self.current() {
            Some(c) if c.is_ascii_digit() => true,
            Some('.') => matches!(self.peek(), Some(d) if d.is_ascii_digit()),
            Some('-') => match self.peek() {
                Some(d) if d.is_ascii_digit() => true,
                Some('.') => matches!(self.peek2(), Some(d) if d.is_ascii_digit()),
                _ => false,
            },
            _ => false,
        }
    }

    /// `<`, `<=`, `<>`, `>` and `>=`.
    fn read_comparison(&mut self, first: char) -> Token {
        let start = self.mark();
        self.advance();
        let kind = match (first, self.current()) {
            ('<', Some('>')) => Some(TokenKind::NotEq),
            ('<', Some('=')) => Some(TokenKind::LtEq),
            ('>', Some('=')) => Some(TokenKind::GtEq),
            _ => None,
        };
        let kind = match kind {
            Some(kind) => {
                self.advance();
                kind
            }
            None if first == '<' => TokenKind::Lt,
            None => TokenKind::Gt,
        };
        Token::new(kind, self.span_from(start))
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        while let Some(ch) = self.current() {
            match ch {
                ' ' | '\t' | '\r' | '\n' => {
                    self.advance();
                }
                ',' if self.dialect.commas_are_whitespace() => {
                    self.advance();
                }
                '*' => self.skip_comment(),
                '"' => tokens.push(self.read_string()?),
                '\'' if self.dialect.allows_char_literals() => tokens.push(self.read_char()?),
                '[' => tokens.push(self.read_bytes()?),
                _ if self.starts_number() => tokens.push(self.read_number()?),
                c if is_word_start(c) => tokens.push(self.read_word()),
                '=' => {
                    let start = self.mark();
                    self.advance();
                    tokens.push(Token::new(TokenKind::Eq, self.span_from(start)));
                }
                '<' | '>' => tokens.push(self.read_comparison(ch)),
                _ => {
                    let start = self.mark();
                    self.advance();
                    return Err(LexError::UnexpectedChar { ch, span: self.span_from(start) });
                }
            }
        }
        tokens.push(Token::new(TokenKind::Eof, self.span_here()));
        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(dialect: Dialect, src: &str) -> Vec<TokenKind> {
        Lexer::new(src, dialect).tokenize().unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_lex_command() {
        let kinds = lex(Dialect::C3, "setv va00 5");
        assert!(matches!(&kinds[0], TokenKind::Word(w) if w == "setv"));
        assert!(matches!(&kinds[1], TokenKind::Word(w) if w == "va00"));
        assert_eq!(kinds[2], TokenKind::IntLit(5));
        assert_eq!(kinds[3], TokenKind::Eof);
    }

    #[test]
    fn test_lex_number_forms() {
        let kinds = lex(Dialect::C3, "-5 0.4 -3.2 -.4 .3 3.");
        assert_eq!(kinds[0], TokenKind::IntLit(-5));
        assert_eq!(kinds[1], TokenKind::FloatLit(0.4));
        assert_eq!(kinds[2], TokenKind::FloatLit(-3.2));
        assert_eq!(kinds[3], TokenKind::FloatLit(-0.4));
        assert_eq!(kinds[4], TokenKind::FloatLit(0.3));
        assert_eq!(kinds[5], TokenKind::FloatLit(3.0));
    }

    #[test]
    fn test_classic_rejects_floats() {
        assert!(Lexer::new("setv var0 0.5", Dialect::C1).tokenize().is_err());
    }

    #[test]
    fn test_lex_char_literal() {
        let kinds = lex(Dialect::C3, "'C'");
        assert_eq!(kinds[0], TokenKind::IntLit(67));
    }

    #[test]
    fn test_lex_bytes() {
        assert_eq!(lex(Dialect::C3, "[0 1 255]")[0], TokenKind::BytesLit(vec![0, 1, 255]));
        assert_eq!(lex(Dialect::C1, "[0101]")[0], TokenKind::BytesLit(b"0101".to_vec()));
        assert!(Lexer::new("[256]", Dialect::C3).tokenize().is_err());
    }

    #[test]
    fn test_comment_on_final_line() {
        let kinds = lex(Dialect::C3, "** Make sure we can handle a file ending with a comment");
        assert_eq!(kinds, vec![TokenKind::Eof]);
    }

    #[test]
    fn test_trailing_comment_after_arguments() {
        let kinds = lex(Dialect::C3, "attr 3575 * all attributes\nkill targ");
        assert_eq!(kinds.len(), 5);
    }

    #[test]
    fn test_unterminated_forms() {
        assert!(matches!(Lexer::new("sets va00 \"abc", Dialect::C3).tokenize(), Err(LexError::UnterminatedString { .. })));
        assert!(matches!(Lexer::new("anim [1 2", Dialect::C3).tokenize(), Err(LexError::UnterminatedBytes { .. })));
    }

    #[test]
    fn test_errors_carry_byte_offsets() {
        let err = Lexer::new("setv va00 5\nsets va01 \"abc", Dialect::C3).tokenize().unwrap_err();
        let span = err.span();
        assert_eq!((span.start, span.end), (22, 26));
        assert_eq!((span.line, span.col), (2, 11));

        let err = Lexer::new("outv 12ab", Dialect::C3).tokenize().unwrap_err();
        assert!(matches!(err, LexError::InvalidNumber { .. }));
        assert_eq!((err.span().start, err.span().end), (5, 8));

        let err = Lexer::new("é ~", Dialect::C3).tokenize().unwrap_err();
        assert!(matches!(err, LexError::UnexpectedChar { ch: 'é', .. }));
        assert_eq!((err.span().start, err.span().end), (0, 2));
    }

    #[test]
    fn test_commas_by_dialect() {
        assert_eq!(lex(Dialect::C1, "setv,var0,1").len(), 4);
        assert!(Lexer::new("setv,va00,1", Dialect::C3).tokenize().is_err());
    }

    #[test]
    fn test_symbolic_comparisons() {
        let kinds = lex(Dialect::C3, "= <> < <= > >=");
        assert_eq!(kinds[..6], [TokenKind::Eq, TokenKind::NotEq, TokenKind::Lt, TokenKind::LtEq, TokenKind::Gt, TokenKind::GtEq]);
    }

    #[test]
    fn test_namespaced_words() {
        let kinds = lex(Dialect::C3, "MESG WRT+ dbg: asrt _p1_ eye-roll");
        assert!(matches!(&kinds[1], TokenKind::Word(w) if w == "WRT+"));
        assert!(matches!(&kinds[2], TokenKind::Word(w) if w == "dbg:"));
        assert!(matches!(&kinds[4], TokenKind::Word(w) if w == "_p1_"));
        assert!(matches!(&kinds[5], TokenKind::Word(w) if w == "eye-roll"));
    }
}
