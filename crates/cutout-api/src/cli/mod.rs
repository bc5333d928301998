//! CLI command definitions for the `cutout` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod config;
pub mod remove;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Remove image backgrounds, from the command line or as a Telegram bot.
#[derive(Parser)]
#[command(name = "cutout", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Read configuration from this file instead of the data directory.
    #[arg(long, global = true, env = "CUTOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Also export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the Telegram bot until interrupted.
    Serve,

    /// Remove the background from one image file.
    Remove {
        /// Input image (JPEG, PNG, WebP, BMP or TIFF).
        input: PathBuf,

        /// Output PNG path (default: `<input stem>_transparent.png`).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Write the smaller preview encoding instead of the lossless one.
        #[arg(long)]
        preview: bool,
    },

    /// Print the effective configuration.
    Config,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}
