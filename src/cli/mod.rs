//! CLI module for courier
//!
//! Provides command-line interface for:
//! - inspect: Read-only report of a journal directory
//! - recover: Run journal recovery and list messages to resend
//! - check-config: Validate a configuration file

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{check_config, inspect, recover, run, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};
