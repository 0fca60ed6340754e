// Copyright 2026 Report Sync Contributors
// SPDX-License-Identifier: Apache-2.0

//! report-sync: unattended export of a portal report into a Google Sheets tab.
//!
//! A run logs into the portal with a headless browser, requests the report,
//! downloads the resulting archive, unifies its CSV files into one table, and
//! replaces the contents of a destination tab with it.

pub mod artifact;
pub mod cli;
pub mod config;
pub mod error;
pub mod live;
pub mod orchestrator;
pub mod renderer;
pub mod sheets;
pub mod table;

pub use config::{ConfigOverrides, Credentials, RunConfig, Timeouts};
pub use error::{ArtifactError, PublishError, RunError};
pub use orchestrator::state::RunState;
pub use orchestrator::{Orchestrator, RunOutcome};
pub use table::{RawTable, TableMode, UnifiedTable};
