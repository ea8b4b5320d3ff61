//! CAOS CLI library.
//!
//! Shared pieces of the `caos` binary: configuration discovery, terminal
//! colors and the script test runner.

pub mod colors;
pub mod config;
pub mod test_cmd;
