//! CLI Module
//!
//! Command-line interface for the Worthy mastering engine.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Backend;

/// Worthy - preview and export a mastering chain
#[derive(Parser, Debug)]
#[command(name = "worthy-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Stage-list output style
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainFormat {
    /// ffmpeg `-af` filter expression
    Ffmpeg,
    /// Stage names and settings as JSON
    Json,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendArg {
    Native,
    Ffmpeg,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Native => Backend::Native,
            BackendArg::Ffmpeg => Backend::Ffmpeg,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show duration, rates and codec of an audio file
    #[command(name = "probe")]
    Probe {
        /// Input audio file
        input: PathBuf,
    },

    /// Measure loudness as the normalization stage would see it
    #[command(name = "measure")]
    Measure {
        /// Input audio file
        input: PathBuf,

        /// Mastering settings (JSON)
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// Print the stage list for a settings file
    #[command(name = "chain")]
    Chain {
        /// Mastering settings (JSON)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "ffmpeg")]
        format: ChainFormat,
    },

    /// Export a mastered WAV file
    #[command(name = "render")]
    Render {
        /// Input audio file
        input: PathBuf,

        /// Output WAV file
        output: PathBuf,

        /// Mastering settings (JSON)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Override the configured backend
        #[arg(short, long, value_enum)]
        backend: Option<BackendArg>,
    },

    /// Run the live preview chain offline, for A/B listening
    #[command(name = "preview")]
    Preview {
        /// Input audio file
        input: PathBuf,

        /// Output WAV file
        output: PathBuf,

        /// Mastering settings (JSON)
        #[arg(short, long)]
        settings: Option<PathBuf>,

        /// Write the bypassed (neutral) graph output instead
        #[arg(long)]
        bypass: bool,
    },
}
