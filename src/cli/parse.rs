//! CLI parse: clap types for Strata. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strata CLI - keeps a versioned tree in step with the filesystem
#[derive(Parser)]
#[command(name = "strata")]
#[command(about = "Reconcile filesystem changes into a versioned tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Workspace root directory
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Configuration file path (overrides default config loading)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (default: off)
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Synchronise every content root with the disk once
    Sync,
    /// Synchronise, then follow filesystem events until interrupted
    Watch {
        /// Batch window in milliseconds (overrides config)
        #[arg(long)]
        batch_window_ms: Option<u64>,
    },
    /// Show the tree entry at a path
    Show {
        /// Path relative to the workspace root
        path: String,
    },
    /// List changesets touching a path or anything below it
    Log {
        /// Path relative to the workspace root; omit for the whole tree
        #[arg(default_value = "")]
        path: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the content roots in effect
    Roots,
}
