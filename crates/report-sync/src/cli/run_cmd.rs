//! CLI handler for `report-sync run`.

use crate::cli::output;
use crate::config::{ConfigOverrides, RunConfig};
use crate::error::RunError;
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::sheets::google::GoogleSheetsClient;
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

/// Run one unattended acquisition and return its exit code.
pub async fn run(overrides: ConfigOverrides) -> Result<i32> {
    let config = RunConfig::from_env()?.with_overrides(overrides)?;

    // Everything that can be checked locally is checked before Chromium starts.
    config.require_credentials()?;
    config.require_destination()?;
    let sheets = GoogleSheetsClient::from_service_account_file(&config.service_account_path)
        .map_err(RunError::from)?;

    let renderer: Arc<dyn Renderer> = Arc::new(
        ChromiumRenderer::new(&config.launch)
            .await
            .map_err(|e| RunError::interaction("launching Chromium", e))?,
    );

    let outcome = Orchestrator::new(config, Arc::clone(&renderer), Arc::new(sheets))
        .run()
        .await;

    if let Err(e) = renderer.shutdown().await {
        warn!("Chromium did not shut down cleanly: {e:#}");
    }

    print_outcome(&outcome);
    Ok(outcome.exit_code())
}

/// Print the run summary for humans or, under `--json`, as JSON.
pub fn print_outcome(outcome: &RunOutcome) {
    if output::is_json() {
        output::print_json(&outcome.summary());
        return;
    }
    if output::is_quiet() && outcome.is_success() {
        return;
    }

    match (&outcome.error, outcome.failed_in) {
        (Some(e), Some(state)) => {
            eprintln!("  Run {} failed while {state}: {e:#}", outcome.run_id);
        }
        _ => {
            println!(
                "  Run {} finished: {} ({} ms)",
                outcome.run_id, outcome.state, outcome.elapsed_ms
            );
            match &outcome.published {
                Some(r) => println!(
                    "  Published {} rows to '{}' in {} batch(es)",
                    r.rows_committed, r.tab.title, r.batches
                ),
                None => println!("  Nothing to publish"),
            }
        }
    }
}
