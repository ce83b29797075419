//! CLI command implementations
//!
//! `inspect` and `check-config` never modify anything on disk. `recover`
//! runs the same recovery the pipeline runs at startup: it clears ignore
//! markers, truncates torn records and deletes fully completed segments.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use crate::config::Config;
use crate::fault::FaultMonitor;
use crate::journal::{self, Journal, JournalConfig};
use crate::observability::{init_tracing, PipelineMetrics};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::write_response;

/// Parse arguments, install logging and run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.log_level.as_deref());
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::io_error(format!("Failed to start runtime: {}", e)))?;

    let data = match cmd {
        Command::Inspect { dir, config } => runtime.block_on(inspect(dir, config))?,
        Command::Recover { config } => runtime.block_on(recover(&config))?,
        Command::CheckConfig { config } => check_config(&config)?,
    };

    write_response(data)
}

fn journal_config(config_path: &Path) -> CliResult<JournalConfig> {
    Config::load(config_path)?
        .journal
        .ok_or_else(|| CliError::config_error("Configuration has no journal section"))
}

/// Read-only report of a journal directory
pub async fn inspect(dir: Option<PathBuf>, config: Option<PathBuf>) -> CliResult<Value> {
    let directory = match (dir, config) {
        (Some(dir), _) => dir,
        (None, Some(config)) => journal_config(&config)?.directory,
        (None, None) => {
            return Err(CliError::config_error(
                "Either --dir or --config must be given",
            ))
        }
    };

    if !directory.is_dir() {
        return Err(CliError::journal_error(format!(
            "Journal directory {} does not exist",
            directory.display()
        )));
    }

    let report = journal::inspect(&directory).await?;
    Ok(serde_json::to_value(report)?)
}

/// Open the journal, report what recovery found, and close it again
pub async fn recover(config_path: &Path) -> CliResult<Value> {
    let config = journal_config(config_path)?;
    let metrics = Arc::new(PipelineMetrics::new());

    let (journal, recovery) = Journal::open(&config, FaultMonitor::new(), Arc::clone(&metrics)).await?;
    let stats = journal.stats().await?;
    journal.close().await?;

    info!(
        directory = %config.directory.display(),
        resend = recovery.resend_messages.len(),
        max_message_id = recovery.max_message_id,
        "Recovery complete"
    );

    Ok(json!({
        "recovery": recovery,
        "journal": stats,
        "metrics": metrics.snapshot(),
    }))
}

/// Validate a config file and echo the resolved settings
pub fn check_config(config_path: &Path) -> CliResult<Value> {
    let config = Config::load(config_path)?;

    let journal = match &config.journal {
        Some(journal) => {
            let bounds = journal.bounds()?;
            json!({
                "directory": journal.directory,
                "min_segment_size": bounds.min,
                "max_segment_size": bounds.max,
                "retry": journal.retry,
            })
        }
        None => Value::Null,
    };

    Ok(json!({
        "valid": true,
        "persistence": config.journal.is_some(),
        "journal": journal,
        "delivery": config.delivery,
    }))
}
