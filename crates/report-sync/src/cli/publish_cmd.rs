//! CLI handler for `report-sync publish <ARTIFACT>`.
//!
//! Re-publishes a report archive that is already on disk, without a browser.
//! The archive is copied into staging first; the original is never moved.

use crate::artifact::ArtifactStager;
use crate::cli::output;
use crate::config::{ConfigOverrides, RunConfig};
use crate::error::{ArtifactError, RunError};
use crate::orchestrator::{load_artifact, publish_table};
use crate::sheets::google::GoogleSheetsClient;
use crate::sheets::publisher::{PublishReport, PublishSettings, SyncPublisher};
use crate::sheets::SheetsService;
use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// Name the copied archive gets inside the staging directory.
const LOCAL_COPY: &str = "manual-upload.zip";

pub async fn run(artifact: &Path, overrides: ConfigOverrides) -> Result<i32> {
    let config = RunConfig::from_env()?.with_overrides(overrides)?;
    if !artifact.is_file() {
        return Err(RunError::Precondition(format!(
            "artifact not found: {}",
            artifact.display()
        ))
        .into());
    }
    config.require_destination()?;
    let sheets = GoogleSheetsClient::from_service_account_file(&config.service_account_path)
        .map_err(RunError::from)?;

    let report = publish_local(&config, Arc::new(sheets), artifact).await?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "artifact": artifact.display().to_string(),
            "rows_published": report.as_ref().map_or(0, |r| r.rows_committed),
            "publish": report,
        }));
    } else if !output::is_quiet() {
        match &report {
            Some(r) => println!(
                "  Published {} rows to '{}' in {} batch(es)",
                r.rows_committed, r.tab.title, r.batches
            ),
            None => println!("  {} holds no data; nothing published", artifact.display()),
        }
    }
    Ok(0)
}

/// Stage, unify, and publish a local archive. Staging is always purged.
pub async fn publish_local(
    config: &RunConfig,
    sheets: Arc<dyn SheetsService>,
    artifact: &Path,
) -> Result<Option<PublishReport>, RunError> {
    let stager = ArtifactStager::new(&config.staging_dir, &config.portal.artifact_stem);
    let publisher = SyncPublisher::new(
        sheets,
        PublishSettings {
            batch_size: config.batch_size,
            pause: config.batch_pause,
        },
    );

    let result: Result<Option<PublishReport>, RunError> = async {
        let dir = stager.staging_dir();
        std::fs::create_dir_all(dir).map_err(|e| ArtifactError::io(dir, e))?;
        let copy = dir.join(LOCAL_COPY);
        std::fs::copy(artifact, &copy).map_err(|e| ArtifactError::io(artifact, e))?;

        let table = load_artifact(&stager, &copy, config.table_mode)?;
        publish_table(
            &publisher,
            table.as_ref(),
            &config.spreadsheet_id,
            &config.tab_name,
        )
        .await
    }
    .await;

    if let Err(e) = stager.purge() {
        warn!(dir = %stager.staging_dir().display(), "failed to purge staging directory: {e}");
    }
    result
}
