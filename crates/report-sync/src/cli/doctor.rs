//! Environment readiness check.

use crate::cli::output;
use crate::config::{RunConfig, ENV_PASSWORD, ENV_SPREADSHEET_ID, ENV_USER};
use crate::error::exit_codes;
use crate::renderer::chromium::find_chromium;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

impl Check {
    fn new(name: &'static str, ok: bool, detail: impl Into<String>) -> Self {
        Self {
            name,
            ok,
            detail: detail.into(),
        }
    }
}

/// Check the browser binary, credentials, destination, and staging directory.
pub async fn run() -> Result<i32> {
    let config = RunConfig::from_env()?;
    let checks = collect(&config);
    let ready = checks.iter().all(|c| c.ok);

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "ready": ready,
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "checks": checks,
        }));
    } else {
        println!("report-sync doctor");
        println!("==================");
        println!();
        println!("OS:   {}", std::env::consts::OS);
        println!("Arch: {}", std::env::consts::ARCH);
        println!();
        for c in &checks {
            let mark = if c.ok { "[OK]" } else { "[!!]" };
            println!("{mark} {}: {}", c.name, c.detail);
        }
        println!();
        println!("Status: {}", if ready { "READY" } else { "NOT READY" });
    }

    Ok(if ready {
        exit_codes::SUCCESS
    } else {
        exit_codes::PRECONDITION
    })
}

fn collect(config: &RunConfig) -> Vec<Check> {
    let mut checks = Vec::new();

    checks.push(match find_chromium() {
        Some(path) => Check::new("chromium", true, path.display().to_string()),
        None => Check::new(
            "chromium",
            false,
            "not found; set REPORT_SYNC_CHROMIUM_PATH or install Chrome",
        ),
    });

    checks.push(match config.require_credentials() {
        Ok(c) => Check::new("credentials", true, format!("user {}", c.user())),
        Err(_) => Check::new(
            "credentials",
            false,
            format!("set {ENV_USER} and {ENV_PASSWORD}"),
        ),
    });

    checks.push(if config.spreadsheet_id.trim().is_empty() {
        Check::new("spreadsheet", false, format!("set {ENV_SPREADSHEET_ID}"))
    } else {
        Check::new(
            "spreadsheet",
            true,
            format!("{} / tab '{}'", config.spreadsheet_id, config.tab_name),
        )
    });

    let key = &config.service_account_path;
    checks.push(Check::new(
        "service account",
        key.is_file(),
        key.display().to_string(),
    ));

    checks.push(staging_check(config));
    checks
}

/// The staging directory must be creatable; an existing one is left alone.
fn staging_check(config: &RunConfig) -> Check {
    let dir = &config.staging_dir;
    let detail = dir.display().to_string();
    if dir.is_dir() {
        return Check::new("staging directory", true, detail);
    }
    let creatable = dir
        .ancestors()
        .skip(1)
        .find(|a| a.exists())
        .is_some_and(|a| a.is_dir());
    Check::new(
        "staging directory",
        creatable,
        if creatable {
            format!("{detail} (will be created)")
        } else {
            format!("{detail} (parent missing or not a directory)")
        },
    )
}
