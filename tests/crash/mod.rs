//! Crash testing framework
//!
//! - Crash injection at deterministic points via `COURIER_CRASH_POINT`
//! - The workload runs in a child process that aborts at the point
//! - The parent recovers the journal and validates what is left

pub mod harness;
pub mod scenarios;
pub mod workload;

pub use harness::*;
