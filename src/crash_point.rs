//! Crash point injection for testing durability
//!
//! Crash points are enabled through the `COURIER_CRASH_POINT` environment
//! variable. When the named point is reached the process terminates via
//! `std::process::abort()`: no cleanup, no unwinding, no catching.
//!
//! # Usage
//!
//! ```ignore
//! use courier::crash_point::{maybe_crash, points};
//!
//! maybe_crash(points::JOURNAL_AFTER_FSYNC);
//! ```
//!
//! # Testing
//!
//! `tests/crash_tests.rs` re-runs its own binary with the variable set, one
//! point per child process, and recovers whatever the child left on disk.

use std::sync::OnceLock;

/// Environment variable naming the enabled crash point
pub const CRASH_POINT_ENV: &str = "COURIER_CRASH_POINT";

static CRASH_POINT: OnceLock<Option<String>> = OnceLock::new();

#[inline]
fn get_crash_point() -> Option<&'static str> {
    CRASH_POINT
        .get_or_init(|| std::env::var(CRASH_POINT_ENV).ok())
        .as_deref()
}

/// Returns true if `COURIER_CRASH_POINT` equals the given name
#[inline]
pub fn crash_point_enabled(name: &str) -> bool {
    get_crash_point().map(|p| p == name).unwrap_or(false)
}

/// Abort the process if the named crash point is enabled.
///
/// No-op when `COURIER_CRASH_POINT` is unset or names another point.
#[inline]
pub fn maybe_crash(name: &str) {
    if crash_point_enabled(name) {
        eprintln!("[CRASH] Triggering crash at point: {}", name);
        std::process::abort();
    }
}

/// All defined crash point names
pub mod points {
    // Append path
    pub const JOURNAL_BEFORE_APPEND: &str = "journal_before_append";
    pub const JOURNAL_BEFORE_FSYNC: &str = "journal_before_fsync";
    pub const JOURNAL_AFTER_FSYNC: &str = "journal_after_fsync";

    // Rotation
    pub const JOURNAL_AFTER_ROTATE: &str = "journal_after_rotate";

    // Deletion protocol
    pub const JOURNAL_DELETE_AFTER_MARKER: &str = "journal_delete_after_marker";
    pub const JOURNAL_DELETE_AFTER_UNLINK: &str = "journal_delete_after_unlink";

    /// Get all crash point names
    pub fn all() -> &'static [&'static str] {
        &[
            JOURNAL_BEFORE_APPEND,
            JOURNAL_BEFORE_FSYNC,
            JOURNAL_AFTER_FSYNC,
            JOURNAL_AFTER_ROTATE,
            JOURNAL_DELETE_AFTER_MARKER,
            JOURNAL_DELETE_AFTER_UNLINK,
        ]
    }
}
