//! Output mode flags and JSON printing.
//!
//! `main` records the global flags in the environment so every command can
//! check them without threading them through.

use serde::Serialize;

pub const ENV_JSON: &str = "REPORT_SYNC_JSON";
pub const ENV_QUIET: &str = "REPORT_SYNC_QUIET";

/// Whether `--json` was passed.
pub fn is_json() -> bool {
    std::env::var_os(ENV_JSON).is_some()
}

/// Whether `--quiet` was passed.
pub fn is_quiet() -> bool {
    std::env::var_os(ENV_QUIET).is_some()
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to encode output: {e}"),
    }
}
