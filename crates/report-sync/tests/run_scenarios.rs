//! End-to-end runs against a scripted browser and a recording spreadsheet.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use report_sync::cli::publish_cmd::publish_local;
use report_sync::config::{ENV_PASSWORD, ENV_SPREADSHEET_ID, ENV_STAGING_DIR, ENV_USER};
use report_sync::error::exit_codes;
use report_sync::live::portal::PortalLayout;
use report_sync::renderer::{DownloadedFile, NavigationResult, RenderContext, Renderer, Target};
use report_sync::sheets::{SheetsService, TabRef};
use report_sync::{
    ArtifactError, Orchestrator, PublishError, RunConfig, RunError, RunState, Timeouts,
};
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Scripted browser
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Script {
    /// Targets (by their display form) that report as visible.
    visible: HashSet<String>,
    /// Entries of the archive the download produces.
    archive: Vec<(String, String)>,
    contexts: AtomicUsize,
    actions: Mutex<Vec<String>>,
    screenshots: Mutex<Vec<PathBuf>>,
}

impl Script {
    fn log(&self, action: String) {
        self.actions.lock().unwrap().push(action);
    }

    fn actions(&self) -> Vec<String> {
        self.actions.lock().unwrap().clone()
    }
}

struct FakeRenderer {
    script: Arc<Script>,
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.script.contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            script: Arc::clone(&self.script),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

struct FakeContext {
    script: Arc<Script>,
}

#[async_trait]
impl RenderContext for FakeContext {
    async fn navigate(&mut self, url: &str, _timeout_ms: u64) -> Result<NavigationResult> {
        self.script.log(format!("navigate {url}"));
        Ok(NavigationResult {
            final_url: url.to_string(),
            load_time_ms: 0,
        })
    }

    async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
        Ok(serde_json::Value::Null)
    }

    async fn is_visible(&self, target: &Target) -> Result<bool> {
        Ok(self.script.visible.contains(&target.to_string()))
    }

    async fn click(&mut self, target: &Target) -> Result<()> {
        self.script.log(format!("click {target}"));
        Ok(())
    }

    async fn fill(&mut self, target: &Target, _value: &str) -> Result<()> {
        self.script.log(format!("fill {target}"));
        Ok(())
    }

    async fn press_key(&mut self, key: &str) -> Result<()> {
        self.script.log(format!("key {key}"));
        Ok(())
    }

    async fn download(
        &mut self,
        trigger: &Target,
        dir: &Path,
        _timeout: Duration,
    ) -> Result<DownloadedFile> {
        self.script.log(format!("download {trigger}"));
        let path = dir.join("report.zip");
        let file = std::fs::File::create(&path)?;
        let mut zip = zip::ZipWriter::new(file);
        for (name, body) in &self.script.archive {
            zip.start_file(name.as_str(), zip::write::FileOptions::default())?;
            zip.write_all(body.as_bytes())?;
        }
        zip.finish()?;
        let bytes = std::fs::metadata(&path)?.len();
        Ok(DownloadedFile {
            suggested_name: "report.zip".into(),
            path,
            bytes,
        })
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.script.screenshots.lock().unwrap().push(path.to_path_buf());
        Err(anyhow!("page is gone"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.script.log("close".into());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recording spreadsheet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum SheetCall {
    Open(String),
    Clear,
    Append(Vec<Vec<String>>),
}

#[derive(Default)]
struct RecordingSheets {
    calls: Mutex<Vec<SheetCall>>,
    /// Zero-based append (header included) that fails.
    fail_on_append: Option<usize>,
}

impl RecordingSheets {
    fn calls(&self) -> Vec<SheetCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SheetsService for RecordingSheets {
    async fn open_tab(&self, spreadsheet_id: &str, tab: &str) -> Result<TabRef, PublishError> {
        self.calls.lock().unwrap().push(SheetCall::Open(tab.into()));
        Ok(TabRef {
            spreadsheet_id: spreadsheet_id.into(),
            sheet_id: 1,
            title: tab.into(),
        })
    }

    async fn clear(&self, _tab: &TabRef) -> Result<(), PublishError> {
        self.calls.lock().unwrap().push(SheetCall::Clear);
        Ok(())
    }

    async fn append_rows(&self, _tab: &TabRef, rows: &[Vec<String>]) -> Result<(), PublishError> {
        let mut calls = self.calls.lock().unwrap();
        let appends = calls
            .iter()
            .filter(|c| matches!(c, SheetCall::Append(_)))
            .count();
        if self.fail_on_append == Some(appends) {
            return Err(PublishError::Api {
                status: 503,
                message: "backend unavailable".into(),
            });
        }
        calls.push(SheetCall::Append(rows.to_vec()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn fast_timeouts() -> Timeouts {
    Timeouts {
        navigation: Duration::from_millis(200),
        login_field: Duration::from_millis(20),
        post_login_settle: Duration::ZERO,
        report_settle: Duration::ZERO,
        overlay_escape_settle: Duration::ZERO,
        export_control: Duration::from_millis(20),
        dialog_step_settle: Duration::ZERO,
        generation_dwell: Duration::ZERO,
        download: Duration::from_millis(200),
        poll_interval: Duration::from_millis(5),
    }
}

fn config(staging: &Path, with_credentials: bool) -> RunConfig {
    let staging = staging.display().to_string();
    let mut vars = vec![
        (ENV_SPREADSHEET_ID, "sheet-1".to_string()),
        (ENV_STAGING_DIR, staging),
    ];
    if with_credentials {
        vars.push((ENV_USER, "ops1".into()));
        vars.push((ENV_PASSWORD, "secret".into()));
    }
    let mut config = RunConfig::from_lookup(move |k| {
        vars.iter().find(|(name, _)| *name == k).map(|(_, v)| v.clone())
    })
    .unwrap();
    config.timeouts = fast_timeouts();
    config.batch_pause = Duration::ZERO;
    config.screenshot_path = PathBuf::from("unused-screenshot.png");
    config
}

/// A portal where login works and the export control renders.
fn healthy_portal(archive: &[(&str, &str)]) -> Script {
    let layout = PortalLayout::default();
    Script {
        visible: [layout.user_field.to_string(), layout.export_button.to_string()]
            .into_iter()
            .collect(),
        archive: archive
            .iter()
            .map(|(n, b)| (n.to_string(), b.to_string()))
            .collect(),
        ..Script::default()
    }
}

fn rows(r: &[&[&str]]) -> Vec<Vec<String>> {
    r.iter()
        .map(|row| row.iter().map(|c| c.to_string()).collect())
        .collect()
}

async fn run(
    script: Script,
    config: RunConfig,
) -> (report_sync::RunOutcome, Arc<Script>, Arc<RecordingSheets>) {
    run_with_sheets(script, config, RecordingSheets::default()).await
}

async fn run_with_sheets(
    script: Script,
    config: RunConfig,
    sheets: RecordingSheets,
) -> (report_sync::RunOutcome, Arc<Script>, Arc<RecordingSheets>) {
    let script = Arc::new(script);
    let sheets = Arc::new(sheets);
    let renderer = Arc::new(FakeRenderer {
        script: Arc::clone(&script),
    });
    let outcome = Orchestrator::new(config, renderer, sheets.clone()).run().await;
    (outcome, script, sheets)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_archive_without_tables_skips_publish_and_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let script = healthy_portal(&[("README.txt", "no data today")]);

    let (outcome, _script, sheets) = run(script, config(&staging, true)).await;

    assert_eq!(outcome.state, RunState::Done);
    assert_eq!(outcome.exit_code(), exit_codes::SUCCESS);
    assert!(outcome.published.is_none());
    assert!(sheets.calls().is_empty());
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_two_files_are_deduplicated_and_published() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let script = healthy_portal(&[
        ("part1.csv", "id,qty\n1,5\n"),
        ("part2.csv", "id,qty\n1,7\n2,3\n"),
    ]);

    let (outcome, script, sheets) = run(script, config(&staging, true)).await;

    assert!(outcome.is_success(), "{:?}", outcome.error);
    assert_eq!(outcome.rows_published(), 2);
    assert_eq!(
        sheets.calls(),
        vec![
            SheetCall::Open("Base".into()),
            SheetCall::Clear,
            SheetCall::Append(rows(&[&["id", "qty"]])),
            SheetCall::Append(rows(&[&["1", "5"], &["2", "3"]])),
        ]
    );

    let actions = script.actions();
    let layout = PortalLayout::default();
    let position = |needle: &str| {
        actions
            .iter()
            .position(|a| a == needle)
            .unwrap_or_else(|| panic!("missing action {needle}: {actions:?}"))
    };
    let login = position(&format!("click {}", layout.login_button));
    let export = position(&format!("click {}", layout.export_button));
    let confirm = position(&format!("click {}", layout.confirm_button));
    let download = position(&format!("download {}", layout.download_button));
    assert!(login < export && export < confirm && confirm < download);
    assert_eq!(actions.last().map(String::as_str), Some("close"));
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_missing_credentials_fail_before_any_browser_use() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let script = healthy_portal(&[]);

    let (outcome, script, sheets) = run(script, config(&staging, false)).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failed_in, Some(RunState::Start));
    assert!(matches!(outcome.error, Some(RunError::Precondition(_))));
    assert_ne!(outcome.exit_code(), 0);
    assert_eq!(script.contexts.load(Ordering::SeqCst), 0);
    assert!(script.actions().is_empty());
    assert!(script.screenshots.lock().unwrap().is_empty());
    assert!(sheets.calls().is_empty());
}

#[tokio::test]
async fn test_export_control_never_visible_fails_with_screenshot() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let layout = PortalLayout::default();
    let script = Script {
        visible: [layout.user_field.to_string()].into_iter().collect(),
        ..Script::default()
    };

    let (outcome, script, sheets) = run(script, config(&staging, true)).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failed_in, Some(RunState::Navigated));
    assert!(matches!(
        outcome.error,
        Some(RunError::InteractionTimeout { .. })
    ));
    assert_eq!(outcome.exit_code(), exit_codes::INTERACTION);
    // Capture failed inside the fake, which must not change the outcome.
    assert_eq!(script.screenshots.lock().unwrap().len(), 1);
    assert_eq!(script.actions().last().map(String::as_str), Some("close"));
    assert!(sheets.calls().is_empty());
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_mismatched_headers_in_archive_fail_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let script = healthy_portal(&[
        ("part1.csv", "id,qty\n1,5\n"),
        ("part2.csv", "qty,id\n7,1\n"),
    ]);

    let (outcome, script, sheets) = run(script, config(&staging, true)).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failed_in, Some(RunState::Downloading));
    assert!(matches!(
        outcome.error,
        Some(RunError::Artifact(ArtifactError::SchemaMismatch { .. }))
    ));
    assert_eq!(outcome.exit_code(), exit_codes::ARTIFACT);
    assert_eq!(script.screenshots.lock().unwrap().len(), 1);
    assert!(sheets.calls().is_empty());
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_failed_batch_fails_the_run_and_keeps_committed_rows() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let script = healthy_portal(&[("part1.csv", "id,qty\n1,5\n2,3\n")]);
    let mut config = config(&staging, true);
    config.batch_size = 1;
    let sheets = RecordingSheets {
        fail_on_append: Some(2),
        ..RecordingSheets::default()
    };

    let (outcome, script, sheets) = run_with_sheets(script, config, sheets).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failed_in, Some(RunState::Staged));
    match &outcome.error {
        Some(RunError::Publish(PublishError::BatchWrite {
            batch,
            committed_rows,
            ..
        })) => {
            assert_eq!(*batch, 2);
            assert_eq!(*committed_rows, 1);
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(outcome.exit_code(), exit_codes::PUBLISH);
    assert_eq!(script.screenshots.lock().unwrap().len(), 1);
    assert_eq!(
        sheets.calls().last(),
        Some(&SheetCall::Append(rows(&[&["1", "5"]])))
    );
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_post_login_overlay_is_closed_when_present() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tmp.path().join("staging");
    let layout = PortalLayout::default();
    let mut script = healthy_portal(&[("README.txt", "")]);
    script
        .visible
        .insert(layout.post_login_overlay_close.to_string());
    script.visible.insert(layout.report_overlay.to_string());

    let (outcome, script, _sheets) = run(script, config(&staging, true)).await;

    assert!(outcome.is_success());
    let actions = script.actions();
    assert!(actions.contains(&format!("click {}", layout.post_login_overlay_close)));
    assert!(actions.contains(&"key Escape".to_string()));
}

#[tokio::test]
async fn test_manual_publish_leaves_the_original_archive() {
    let tmp = tempfile::tempdir().unwrap();
    let archive = tmp.path().join("TO-Packed09.zip");
    {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
        zip.start_file("a.csv", zip::write::FileOptions::default())
            .unwrap();
        zip.write_all(b"id,qty\n3,1\n3,2\n4,\n").unwrap();
        zip.finish().unwrap();
    }
    let staging = tmp.path().join("staging");
    let sheets = Arc::new(RecordingSheets::default());

    let report = publish_local(&config(&staging, false), sheets.clone(), &archive)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(report.rows_committed, 2);
    assert_eq!(
        sheets.calls().last(),
        Some(&SheetCall::Append(rows(&[&["3", "1"], &["4", ""]])))
    );
    assert!(archive.exists());
    assert!(!staging.exists());
}
