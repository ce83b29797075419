//! CLI argument definitions using clap
//!
//! Commands:
//! - courier inspect (--dir <path> | --config <path>)
//! - courier recover --config <path>
//! - courier check-config --config <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// courier - crash-safe, order-preserving delivery of worker results
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Report journal segments, markers and open messages without modifying them
    Inspect {
        /// Journal directory
        #[arg(long, conflicts_with = "config")]
        dir: Option<PathBuf>,

        /// Path to configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run journal recovery and report the messages that would be resent
    Recover {
        /// Path to configuration file
        #[arg(long, default_value = "./courier.json")]
        config: PathBuf,
    },

    /// Validate a configuration file and print the resolved settings
    CheckConfig {
        /// Path to configuration file
        #[arg(long, default_value = "./courier.json")]
        config: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
