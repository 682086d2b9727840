//! Command-line interface
//!
//! This module contains the CLI commands and argument parsing
//! for the tokensend binary.

pub mod commands;

pub use commands::{Command, InputArg, Opt, OutputArg};
