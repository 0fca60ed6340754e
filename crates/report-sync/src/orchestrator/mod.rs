//! Acquisition orchestrator: drives one run from login to publication.
//!
//! Each non-terminal [`RunState`] owns exactly one transition. A transition
//! either succeeds and the run advances to [`RunState::next`], or it fails and
//! the run moves straight to [`RunState::Failed`]. Nothing is retried; the
//! external scheduler re-invokes the whole process instead.
//!
//! Teardown always runs: the browser context is closed and the staging
//! directory is purged, whichever state the run ended in.

pub mod state;

use crate::artifact::ArtifactStager;
use crate::config::RunConfig;
use crate::error::{exit_codes, ArtifactError, RunError};
use crate::live::driver::{dwell, Dismissal, ExportHandle, PortalDriver, WaitPolicy};
use crate::live::session::Session;
use crate::renderer::Renderer;
use crate::sheets::publisher::{PublishReport, PublishSettings, SyncPublisher};
use crate::sheets::SheetsService;
use crate::table::{read_and_concat, RawTable, TableMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use state::RunState;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Stage a downloaded archive and turn its tabular files into one table.
///
/// `Ok(None)` means the archive held no tabular file, which is not an error.
pub fn load_artifact(
    stager: &ArtifactStager,
    download: &Path,
    mode: TableMode,
) -> Result<Option<RawTable>, ArtifactError> {
    let staged = stager.stage(download)?;
    let Some(extraction) = stager.unpack(&staged)? else {
        return Ok(None);
    };
    let raw = read_and_concat(extraction.files())?;
    drop(extraction);
    info!(rows = raw.len(), columns = raw.columns.len(), "artifact loaded");
    Ok(Some(mode.apply(raw)))
}

/// Publish `table` unless there is nothing to write.
///
/// Shared by the unattended run and manual re-publication.
pub async fn publish_table(
    publisher: &SyncPublisher,
    table: Option<&RawTable>,
    spreadsheet_id: &str,
    tab: &str,
) -> Result<Option<PublishReport>, RunError> {
    match table {
        Some(table) if !table.is_empty() => {
            let report = publisher.publish(table, spreadsheet_id, tab).await?;
            info!(
                tab = %report.tab.title,
                rows = report.rows_committed,
                batches = report.batches,
                "published"
            );
            Ok(Some(report))
        }
        _ => {
            info!("no data to publish; destination left untouched");
            Ok(None)
        }
    }
}

/// How a run ended.
#[derive(Debug)]
pub struct RunOutcome {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    /// Terminal state: `Done` or `Failed`.
    pub state: RunState,
    /// State whose transition failed, if any.
    pub failed_in: Option<RunState>,
    pub error: Option<RunError>,
    pub published: Option<PublishReport>,
    pub elapsed_ms: u64,
}

/// Serializable view of a [`RunOutcome`].
#[derive(Debug, Serialize)]
pub struct RunSummary<'a> {
    pub run_id: &'a str,
    pub started_at: DateTime<Utc>,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_in: Option<RunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub rows_published: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<&'a PublishReport>,
    pub elapsed_ms: u64,
    pub exit_code: i32,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RunState::Done && self.error.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        match &self.error {
            Some(e) => e.exit_code(),
            None if self.state == RunState::Done => exit_codes::SUCCESS,
            None => exit_codes::GENERIC,
        }
    }

    pub fn rows_published(&self) -> usize {
        self.published.as_ref().map_or(0, |r| r.rows_committed)
    }

    pub fn summary(&self) -> RunSummary<'_> {
        RunSummary {
            run_id: &self.run_id,
            started_at: self.started_at,
            state: self.state,
            failed_in: self.failed_in,
            error: self.error.as_ref().map(|e| format!("{e:#}")),
            rows_published: self.rows_published(),
            publish: self.published.as_ref(),
            elapsed_ms: self.elapsed_ms,
            exit_code: self.exit_code(),
        }
    }
}

/// One acquisition run.
pub struct Orchestrator {
    config: RunConfig,
    renderer: Arc<dyn Renderer>,
    publisher: SyncPublisher,
    session: Session,
    stager: ArtifactStager,
    driver: Option<PortalDriver>,
    export: Option<ExportHandle>,
    table: Option<RawTable>,
    published: Option<PublishReport>,
}

impl Orchestrator {
    pub fn new(
        config: RunConfig,
        renderer: Arc<dyn Renderer>,
        sheets: Arc<dyn SheetsService>,
    ) -> Self {
        let publisher = SyncPublisher::new(
            sheets,
            PublishSettings {
                batch_size: config.batch_size,
                pause: config.batch_pause,
            },
        );
        let session = Session::new(config.report_kind.clone(), config.staging_dir.clone());
        let stager = ArtifactStager::new(
            config.staging_dir.clone(),
            config.portal.artifact_stem.clone(),
        );
        Self {
            config,
            renderer,
            publisher,
            session,
            stager,
            driver: None,
            export: None,
            table: None,
            published: None,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run to a terminal state, then tear down.
    pub async fn run(mut self) -> RunOutcome {
        info!(
            run_id = %self.session.id,
            report_kind = %self.session.report_kind,
            staging_dir = %self.session.staging_dir.display(),
            "run started"
        );

        let mut failure: Option<(RunState, RunError)> = None;
        while !self.session.state().is_terminal() {
            let current = self.session.state();
            match self.transition(current).await {
                Ok(()) => {
                    if let Some(next) = current.next() {
                        self.session.enter(next);
                    }
                }
                Err(e) => {
                    error!(run_id = %self.session.id, state = %current, "run failed: {e:#}");
                    self.capture_diagnostics().await;
                    self.session.enter(RunState::Failed);
                    failure = Some((current, e));
                }
            }
        }

        self.teardown().await;

        let (failed_in, error) = match failure {
            Some((s, e)) => (Some(s), Some(e)),
            None => (None, None),
        };
        let outcome = RunOutcome {
            run_id: self.session.id.clone(),
            started_at: self.session.started_at,
            state: self.session.state(),
            failed_in,
            error,
            published: self.published.take(),
            elapsed_ms: self.session.age().as_millis() as u64,
        };
        info!(
            run_id = %outcome.run_id,
            state = %outcome.state,
            rows = outcome.rows_published(),
            elapsed_ms = outcome.elapsed_ms,
            "run finished"
        );
        outcome
    }

    async fn transition(&mut self, state: RunState) -> Result<(), RunError> {
        match state {
            RunState::Start => self.start(),
            RunState::LoggingIn => self.log_in().await,
            RunState::Navigated => self.open_export_dialog().await,
            RunState::ExportDialogOpen => self.request_report().await,
            RunState::ReportGenerating => self.await_generation().await,
            RunState::Downloading => self.download_and_stage().await,
            RunState::Staged => self.publish().await,
            RunState::Published | RunState::Done | RunState::Failed => Ok(()),
        }
    }

    /// Preconditions, checked before anything remote happens.
    fn start(&mut self) -> Result<(), RunError> {
        self.config.require_credentials()?;
        let dir = &self.session.staging_dir;
        std::fs::create_dir_all(dir)
            .map_err(|e| RunError::Artifact(ArtifactError::io(dir, e)))?;
        Ok(())
    }

    async fn log_in(&mut self) -> Result<(), RunError> {
        let credentials = self.config.require_credentials()?.clone();
        let context = self
            .renderer
            .new_context()
            .await
            .map_err(|e| RunError::interaction("opening a browser context", e))?;
        let mut driver = PortalDriver::new(
            context,
            self.config.portal.clone(),
            self.config.timeouts.clone(),
        );
        let result = driver.authenticate(&credentials).await;
        self.driver = Some(driver);
        result?;

        let close = Dismissal::CloseControl(self.config.portal.post_login_overlay_close.clone());
        self.dismiss_optional(&close).await;

        let report_url = self.config.portal.report_url.clone();
        let settle = WaitPolicy::Settle(self.config.timeouts.report_settle);
        self.driver()?.navigate(&report_url, settle).await?;
        Ok(())
    }

    async fn open_export_dialog(&mut self) -> Result<(), RunError> {
        let escape = Dismissal::Escape {
            overlay: self.config.portal.report_overlay.clone(),
            settle: self.config.timeouts.overlay_escape_settle,
        };
        self.dismiss_optional(&escape).await;
        self.driver()?.open_export_dialog().await
    }

    async fn request_report(&mut self) -> Result<(), RunError> {
        let kind = self.config.report_kind.clone();
        let handle = self.driver()?.trigger_export(&kind).await?;
        self.export = Some(handle);
        Ok(())
    }

    async fn await_generation(&mut self) -> Result<(), RunError> {
        let d = self.config.timeouts.generation_dwell;
        info!(dwell_ms = d.as_millis() as u64, "waiting for report generation");
        dwell(d).await;
        Ok(())
    }

    async fn download_and_stage(&mut self) -> Result<(), RunError> {
        let handle = self.export.clone().ok_or_else(|| RunError::Interaction {
            step: "downloading the report",
            message: "no export was requested".into(),
        })?;
        let dir = self.session.staging_dir.clone();
        let file = self.driver()?.await_download(&handle, &dir).await?;
        self.table = load_artifact(&self.stager, &file.path, self.config.table_mode)?;
        Ok(())
    }

    async fn publish(&mut self) -> Result<(), RunError> {
        self.published = publish_table(
            &self.publisher,
            self.table.as_ref(),
            &self.config.spreadsheet_id,
            &self.config.tab_name,
        )
        .await?;
        Ok(())
    }

    fn driver(&mut self) -> Result<&mut PortalDriver, RunError> {
        self.driver.as_mut().ok_or_else(|| RunError::Interaction {
            step: "driving the portal",
            message: "no browser context is open".into(),
        })
    }

    /// Overlays are optional: absence is normal and a failed probe is only logged.
    async fn dismiss_optional(&mut self, dismissal: &Dismissal) {
        let Some(driver) = self.driver.as_mut() else {
            return;
        };
        match driver.dismiss_overlay(dismissal).await {
            Ok(found) => debug!(found, "overlay probe"),
            Err(e) => warn!("overlay probe failed, continuing: {e}"),
        }
    }

    /// Best-effort screenshot of the page the run failed on.
    async fn capture_diagnostics(&self) {
        let Some(driver) = self.driver.as_ref() else {
            debug!("no browser context; skipping screenshot");
            return;
        };
        let path = &self.config.screenshot_path;
        match driver.screenshot(path).await {
            Ok(()) => info!(path = %path.display(), "failure screenshot saved"),
            Err(e) => warn!("failure screenshot not captured: {e}"),
        }
    }

    async fn teardown(&mut self) {
        if let Some(driver) = self.driver.take() {
            if let Err(e) = driver.close().await {
                warn!("closing the browser context failed: {e}");
            }
        }
        self.table = None;
        match self.stager.purge() {
            Ok(()) => debug!(dir = %self.stager.staging_dir().display(), "staging purged"),
            Err(e) => warn!(
                dir = %self.stager.staging_dir().display(),
                "failed to purge staging directory: {e}"
            ),
        }
    }
}
