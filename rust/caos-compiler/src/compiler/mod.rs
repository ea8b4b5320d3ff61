pub mod ast;
pub mod dialect;
pub mod lexer;
pub mod opcodes;
pub mod parser;
pub mod tokens;
