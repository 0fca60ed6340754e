//! States of one acquisition run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a run is. `Done` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Start,
    LoggingIn,
    Navigated,
    ExportDialogOpen,
    ReportGenerating,
    Downloading,
    Staged,
    Published,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// The state a successful transition out of `self` leads to.
    pub fn next(self) -> Option<RunState> {
        use RunState::*;
        match self {
            Start => Some(LoggingIn),
            LoggingIn => Some(Navigated),
            Navigated => Some(ExportDialogOpen),
            ExportDialogOpen => Some(ReportGenerating),
            ReportGenerating => Some(Downloading),
            Downloading => Some(Staged),
            Staged => Some(Published),
            Published => Some(Done),
            Done | Failed => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Start => "start",
            RunState::LoggingIn => "logging_in",
            RunState::Navigated => "navigated",
            RunState::ExportDialogOpen => "export_dialog_open",
            RunState::ReportGenerating => "report_generating",
            RunState::Downloading => "downloading",
            RunState::Staged => "staged",
            RunState::Published => "published",
            RunState::Done => "done",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
