//! Session: one run of the orchestrator.
//!
//! Tracks identity, timing, and the current state for logging. The staging
//! directory named here is owned by the session for its whole lifetime.

use crate::orchestrator::state::RunState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalStatus {
    Success,
    Failure,
}

/// One run.
#[derive(Debug)]
pub struct Session {
    /// Unique run identifier.
    pub id: String,
    /// Wall-clock start, for logs and summaries.
    pub started_at: DateTime<Utc>,
    /// Report being acquired.
    pub report_kind: String,
    /// Local staging directory, purged at teardown.
    pub staging_dir: PathBuf,
    created: Instant,
    state_entered: Instant,
    state: RunState,
    status: Option<TerminalStatus>,
}

impl Session {
    pub fn new(report_kind: impl Into<String>, staging_dir: impl Into<PathBuf>) -> Self {
        let now = Instant::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            report_kind: report_kind.into(),
            staging_dir: staging_dir.into(),
            created: now,
            state_entered: now,
            state: RunState::Start,
            status: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn status(&self) -> Option<TerminalStatus> {
        self.status
    }

    /// How long the session has been alive.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Record a transition and log how long the previous state took.
    pub fn enter(&mut self, next: RunState) {
        let step_ms = self.state_entered.elapsed().as_millis() as u64;
        info!(
            run_id = %self.id,
            from = %self.state,
            to = %next,
            step_ms,
            "state transition"
        );
        self.state = next;
        self.state_entered = Instant::now();
        self.status = match next {
            RunState::Done => Some(TerminalStatus::Success),
            RunState::Failed => Some(TerminalStatus::Failure),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_follows_terminal_state() {
        let mut session = Session::new("Packed", "/tmp/x");
        assert_eq!(session.state(), RunState::Start);
        assert!(session.status().is_none());

        session.enter(RunState::LoggingIn);
        assert!(session.status().is_none());

        session.enter(RunState::Failed);
        assert_eq!(session.status(), Some(TerminalStatus::Failure));
    }

    #[test]
    fn test_sessions_have_distinct_ids() {
        let a = Session::new("Packed", "/tmp/a");
        let b = Session::new("Packed", "/tmp/b");
        assert_ne!(a.id, b.id);
    }
}
