//! Scoreload - CLI wiring
//!
//! Argument parsing, command implementations and report rendering for the
//! `scoreload` binary.

pub mod cli;
pub mod commands;
pub mod report;

pub use cli::{Cli, Commands, RunArgs};
pub use commands::{CommandError, Wiring};
