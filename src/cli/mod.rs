//! CLI module for the tenant-sync tool.
//!
//! This module provides the command-line interface for planning and
//! applying tenant reconciliation.

mod commands;
mod output;

pub use commands::{Cli, Commands, KindArg, OutputFormat};
pub use output::OutputFormatter;
