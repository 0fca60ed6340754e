//! CLI subcommand implementations for the report-sync binary.
//!
//! Each command returns the process exit code on a handled outcome and an
//! error for anything that stopped it early.

pub mod doctor;
pub mod output;
pub mod publish_cmd;
pub mod run_cmd;

use crate::config::ConfigOverrides;
use crate::error::{exit_codes, RunError};
use std::path::PathBuf;

/// Destination and table options shared by `run` and `publish`.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct DestinationArgs {
    /// Destination spreadsheet id (overrides REPORT_SYNC_SPREADSHEET_ID)
    #[arg(long)]
    pub spreadsheet_id: Option<String>,
    /// Destination tab (overrides REPORT_SYNC_TAB)
    #[arg(long)]
    pub tab: Option<String>,
    /// Rows per append request
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Publish every row, without first-column deduplication
    #[arg(long)]
    pub no_dedup: bool,
    /// Local staging directory, removed when the command finishes
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,
}

/// Options of the unattended run.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub destination: DestinationArgs,
    /// Show the browser window
    #[arg(long)]
    pub headed: bool,
}

impl From<DestinationArgs> for ConfigOverrides {
    fn from(a: DestinationArgs) -> Self {
        ConfigOverrides {
            spreadsheet_id: a.spreadsheet_id,
            tab: a.tab,
            batch_size: a.batch_size,
            staging_dir: a.staging_dir,
            no_dedup: a.no_dedup,
            headed: false,
        }
    }
}

impl From<RunArgs> for ConfigOverrides {
    fn from(a: RunArgs) -> Self {
        ConfigOverrides {
            headed: a.headed,
            ..a.destination.into()
        }
    }
}

/// Exit code for an error that escaped a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<RunError>()
        .map_or(exit_codes::GENERIC, RunError::exit_code)
}
