//! courier CLI entry point
//!
//! Parses arguments and dispatches to `cli::run`; errors are reported on
//! stdout as a JSON error object and on stderr, with a non-zero exit code.

use courier::cli;

fn main() {
    if let Err(e) = cli::run() {
        let _ = cli::write_error(e.code_str(), e.message());
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
