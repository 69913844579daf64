//! # netloop CLI Module
//!
//! ## Available Commands
//!
//! - `stages` - Show the fixed stage order
//! - `run` - Drive a workload through the host loop and print a report
//! - `check` - Validate a scenario file

mod commands;

use crate::config::Pattern;
use clap::{Parser, Subcommand};
use netloop_core::NetloopError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// netloop - staged per-frame update loop
///
/// Subscribers attach to named stages of a repeating frame loop and are
/// invoked once per stage dispatch.
#[derive(Parser, Debug)]
#[command(name = "netloop")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the stage order
    Stages,

    /// Drive a workload through the host loop
    Run {
        /// Scenario file (TOML); built-in defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Frames to drive (overrides run.frames)
        #[arg(short, long)]
        frames: Option<u64>,

        /// Number of subscribers (overrides workload.subscribers)
        #[arg(short, long)]
        subscribers: Option<usize>,

        /// Registration pattern (overrides workload.pattern)
        #[arg(short, long, value_enum)]
        pattern: Option<Pattern>,

        /// Pace frames in real time at run.target_fps; Ctrl+C stops early
        #[arg(long)]
        paced: bool,
    },

    /// Validate a scenario file and print the resolved configuration
    Check {
        /// Scenario file (TOML)
        #[arg(short, long)]
        config: PathBuf,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), NetloopError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Stages) => cmd_stages(json_mode),
        Some(Commands::Run {
            config,
            frames,
            subscribers,
            pattern,
            paced,
        }) => {
            let overrides = RunOverrides {
                frames,
                subscribers,
                pattern,
            };
            cmd_run(config.as_deref(), overrides, paced, json_mode, cli.verbose).await
        }
        Some(Commands::Check { config }) => cmd_check(&config, json_mode),
        None => {
            // No subcommand - show stages by default
            cmd_stages(json_mode)
        }
    }
}
