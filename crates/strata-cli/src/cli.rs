//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strata CLI - Inspect and watch layered code-unit classpaths
#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path (toml, yaml or json)
    #[arg(short = 'c', long, global = true, env = "STRATA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Skip the http/https providers
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the default loader chain, level by level
    Classpath {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Load a code unit and report where it came from
    Load {
        /// Dotted unit name (e.g. com.acme.Filter)
        name: String,

        /// Load through a named context instead of the default chain
        #[arg(short = 'x', long)]
        context: Option<String>,

        /// Write the unit bytes to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List contexts and their current layers
    Contexts {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,

        /// Create every configured context before listing
        #[arg(long)]
        all: bool,
    },

    /// Run the supervisors and log reloads until Ctrl-C
    Watch {
        /// Contexts to watch alongside the default chain
        #[arg(short = 'x', long = "context")]
        contexts: Vec<String>,

        /// Override the polling interval
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval_ms: Option<u64>,

        /// Stop after this many milliseconds instead of waiting for Ctrl-C
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}
