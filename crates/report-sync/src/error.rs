//! Error taxonomy for a run.
//!
//! Every failure is eventually folded into a [`RunError`] at the orchestrator
//! boundary. Browser capability code stays on `anyhow::Result` and is converted
//! here with the step it failed in.

use std::path::PathBuf;

/// Process exit codes, one per failure family.
pub mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const GENERIC: i32 = 1;
    pub const PRECONDITION: i32 = 2;
    pub const INTERACTION: i32 = 3;
    pub const ARTIFACT: i32 = 4;
    pub const PUBLISH: i32 = 5;
}

/// All errors that terminate a run.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// Missing credentials or configuration. Raised before any remote interaction.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A bounded wait on the remote surface exceeded its limit.
    #[error("timed out after {timeout_ms}ms waiting for {what}")]
    InteractionTimeout { what: String, timeout_ms: u64 },

    /// The remote surface rejected or failed an interaction.
    #[error("interaction failed while {step}: {message}")]
    Interaction { step: &'static str, message: String },

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl RunError {
    /// Wrap a capability-layer error with the step it happened in.
    pub fn interaction(step: &'static str, err: anyhow::Error) -> Self {
        RunError::Interaction {
            step,
            message: format!("{err:#}"),
        }
    }

    pub fn exit_code(&self) -> i32 {
        use exit_codes::*;
        match self {
            RunError::Precondition(_) => PRECONDITION,
            RunError::InteractionTimeout { .. } | RunError::Interaction { .. } => INTERACTION,
            RunError::Artifact(_) => ARTIFACT,
            RunError::Publish(_) => PUBLISH,
        }
    }
}

/// Failures while staging, unpacking, or parsing the downloaded artifact.
#[derive(thiserror::Error, Debug)]
pub enum ArtifactError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("{path} is not valid UTF-8 (invalid byte at offset {offset})")]
    Encoding { path: PathBuf, offset: usize },

    #[error("{path} is not a delimited table: {reason}")]
    MalformedTable { path: PathBuf, reason: String },

    #[error("header of {path} {found:?} does not match {expected:?}")]
    SchemaMismatch {
        path: PathBuf,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl ArtifactError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ArtifactError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures while writing to the destination spreadsheet.
#[derive(thiserror::Error, Debug)]
pub enum PublishError {
    /// Service credentials are missing or unusable.
    #[error("spreadsheet credentials unavailable: {0}")]
    AuthConfig(String),

    /// The named tab does not exist. Tabs are never created implicitly.
    #[error("tab '{tab}' not found in spreadsheet {spreadsheet_id}")]
    TabNotFound { spreadsheet_id: String, tab: String },

    #[error("spreadsheet API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("spreadsheet request failed: {0}")]
    Transport(String),

    /// A body batch failed. Rows committed before it remain in the tab.
    #[error("batch {batch} failed after {committed_rows} rows were committed: {source}")]
    BatchWrite {
        batch: usize,
        committed_rows: usize,
        #[source]
        source: Box<PublishError>,
    },
}

impl From<reqwest::Error> for PublishError {
    fn from(e: reqwest::Error) -> Self {
        PublishError::Transport(e.to_string())
    }
}
