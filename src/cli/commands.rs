//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::resource::ResourceKind;

/// tenant-sync - Declarative tenant resource reconciliation.
#[derive(Parser, Debug)]
#[command(name = "tenant-sync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the tenant file.
    #[arg(short, long, global = true, env = "TENANT_SYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter tenant file.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the tenant file.
    Validate {
        /// Treat duplicate names as errors.
        #[arg(long)]
        strict: bool,
    },

    /// Compute and display the reconciliation plan.
    Plan {
        /// Restrict to one resource kind.
        #[arg(short, long)]
        kind: Option<KindArg>,

        /// Show field-level changes.
        #[arg(short, long)]
        detailed: bool,

        /// Only report drift; exit with status 2 if any is found.
        #[arg(long)]
        check: bool,
    },

    /// Apply the reconciliation plan.
    Apply {
        /// Restrict to one resource kind.
        #[arg(short, long)]
        kind: Option<KindArg>,

        /// Skip confirmation prompts.
        #[arg(short, long)]
        yes: bool,

        /// Maximum operations in flight per class (overrides the tenant file).
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..=64))]
        concurrency: Option<u16>,

        /// Fail instead of skipping conflicting names.
        #[arg(long)]
        fail_on_conflict: bool,

        /// Treat duplicate names as configuration errors.
        #[arg(long)]
        strict: bool,
    },

    /// List existing remote resources.
    List {
        /// Resource kind to list.
        #[arg(short, long, default_value = "apps")]
        kind: KindArg,
    },

    /// Show recent runs.
    History {
        /// Number of runs to show.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Force-release the run lock.
    Unlock,
}

/// Resource kinds accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    /// Applications.
    #[value(alias = "applications", alias = "app")]
    Apps,
    /// Roles.
    #[value(alias = "role")]
    Roles,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl From<KindArg> for ResourceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Apps => Self::Application,
            KindArg::Roles => Self::Role,
        }
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
