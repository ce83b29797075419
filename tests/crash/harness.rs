//! Crash test harness for subprocess management
//!
//! Re-runs this test binary, filtered to the ignored workload test, with a
//! crash point enabled. The child aborts at the point; the parent then
//! inspects the journal directory it left behind.

use std::path::Path;
use std::process::{Command, ExitStatus};

use courier::crash_point::CRASH_POINT_ENV;

/// Journal directory handed to the child process
pub const CRASH_DIR_ENV: &str = "COURIER_CRASH_DIR";

/// Fully qualified name of the workload test
const WORKLOAD_TEST: &str = "crash::workload::journal_workload";

/// Result of a crash test execution
#[derive(Debug)]
pub struct CrashTestResult {
    /// Whether the process crashed at the requested point
    pub crashed: bool,
    pub exit_status: Option<ExitStatus>,
    pub stdout: String,
    pub stderr: String,
}

/// Run the journal workload in a child process until `crash_point` fires
pub fn run_workload_with_crash_point(crash_point: &str, data_dir: &Path) -> CrashTestResult {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return failed_to_start(e),
    };

    let output = Command::new(exe)
        .args(["--exact", WORKLOAD_TEST, "--ignored", "--nocapture", "--test-threads=1"])
        .env(CRASH_POINT_ENV, crash_point)
        .env(CRASH_DIR_ENV, data_dir)
        .output();

    match output {
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            CrashTestResult {
                crashed: !output.status.success() && stderr.contains(crash_point),
                exit_status: Some(output.status),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr,
            }
        }
        Err(e) => failed_to_start(e),
    }
}

fn failed_to_start(e: std::io::Error) -> CrashTestResult {
    CrashTestResult {
        crashed: false,
        exit_status: None,
        stdout: String::new(),
        stderr: format!("Failed to execute: {}", e),
    }
}

/// Report crash test failure
pub fn report_failure(crash_point: &str, expected: &str, result: &CrashTestResult) {
    eprintln!("=== CRASH TEST FAILURE ===");
    eprintln!("Crash point: {}", crash_point);
    eprintln!("Expected: {}", expected);
    eprintln!("Exit status: {:?}", result.exit_status);
    eprintln!("Child stdout:\n{}", result.stdout);
    eprintln!("Child stderr:\n{}", result.stderr);
    eprintln!("==========================");
}

/// Run the workload and fail the test unless the child crashed
pub fn crash_at(crash_point: &str, data_dir: &Path) {
    let result = run_workload_with_crash_point(crash_point, data_dir);
    if !result.crashed {
        report_failure(crash_point, "child aborted at crash point", &result);
        panic!("workload did not crash at {}", crash_point);
    }
}
