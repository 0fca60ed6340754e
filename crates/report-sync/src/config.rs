//! Run configuration.
//!
//! Built once from the environment (plus command-line overrides) and handed to
//! the orchestrator by value. Nothing below this module reads the environment.

use crate::error::RunError;
use crate::live::portal::{PortalLayout, DEFAULT_REPORT_KIND};
use crate::renderer::chromium::LaunchOptions;
use crate::table::TableMode;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_USER: &str = "REPORT_SYNC_USER";
pub const ENV_PASSWORD: &str = "REPORT_SYNC_PASSWORD";
pub const ENV_SPREADSHEET_ID: &str = "REPORT_SYNC_SPREADSHEET_ID";
pub const ENV_TAB: &str = "REPORT_SYNC_TAB";
pub const ENV_SERVICE_ACCOUNT: &str = "REPORT_SYNC_SERVICE_ACCOUNT";
pub const ENV_STAGING_DIR: &str = "REPORT_SYNC_STAGING_DIR";
pub const ENV_BATCH_SIZE: &str = "REPORT_SYNC_BATCH_SIZE";
pub const ENV_DEDUP: &str = "REPORT_SYNC_DEDUP";
pub const ENV_HEADLESS: &str = "REPORT_SYNC_HEADLESS";
pub const ENV_SCREENSHOT: &str = "REPORT_SYNC_SCREENSHOT";

pub const DEFAULT_TAB: &str = "Base";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "service-account.json";
pub const DEFAULT_SCREENSHOT: &str = "error_screenshot.png";
pub const DEFAULT_BATCH_SIZE: usize = 15_000;
pub const DEFAULT_BATCH_PAUSE: Duration = Duration::from_secs(1);

/// Portal login. The secret never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    secret: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    fn is_complete(&self) -> bool {
        !self.user.trim().is_empty() && !self.secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Bounds for every wait on the remote surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    pub navigation: Duration,
    pub login_field: Duration,
    pub post_login_settle: Duration,
    pub report_settle: Duration,
    pub overlay_escape_settle: Duration,
    /// Visibility wait for the export control; shorter than a whole step.
    pub export_control: Duration,
    pub dialog_step_settle: Duration,
    /// Fixed dwell while the server generates the report.
    pub generation_dwell: Duration,
    pub download: Duration,
    pub poll_interval: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation: Duration::from_secs(30),
            login_field: Duration::from_secs(15),
            post_login_settle: Duration::from_secs(10),
            report_settle: Duration::from_secs(8),
            overlay_escape_settle: Duration::from_secs(1),
            export_control: Duration::from_secs(30),
            dialog_step_settle: Duration::from_secs(5),
            generation_dwell: Duration::from_secs(60),
            download: Duration::from_secs(120),
            poll_interval: Duration::from_millis(250),
        }
    }
}

/// Everything one run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub credentials: Option<Credentials>,
    pub report_kind: String,
    pub portal: PortalLayout,
    pub staging_dir: PathBuf,
    pub spreadsheet_id: String,
    pub tab_name: String,
    pub service_account_path: PathBuf,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub table_mode: TableMode,
    pub timeouts: Timeouts,
    pub screenshot_path: PathBuf,
    pub launch: LaunchOptions,
}

/// Command-line values that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub spreadsheet_id: Option<String>,
    pub tab: Option<String>,
    pub batch_size: Option<usize>,
    pub staging_dir: Option<PathBuf>,
    pub no_dedup: bool,
    pub headed: bool,
}

impl RunConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self, RunError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve configuration through `lookup`, which maps a variable name to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, RunError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let credentials = match (get(ENV_USER), lookup(ENV_PASSWORD)) {
            (Some(user), Some(secret)) => Some(Credentials::new(user, secret)),
            _ => None,
        };

        let batch_size = match get(ENV_BATCH_SIZE) {
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                RunError::Precondition(format!("{ENV_BATCH_SIZE} is not a number: {raw:?}"))
            })?,
            None => DEFAULT_BATCH_SIZE,
        };

        let table_mode = if get(ENV_DEDUP).is_some_and(|v| is_false(&v)) {
            TableMode::Raw
        } else {
            TableMode::Deduplicate
        };

        let launch = LaunchOptions {
            headless: !get(ENV_HEADLESS).is_some_and(|v| is_false(&v)),
            ..LaunchOptions::default()
        };

        let config = Self {
            credentials,
            report_kind: DEFAULT_REPORT_KIND.to_string(),
            portal: PortalLayout::default(),
            staging_dir: get(ENV_STAGING_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("report-sync")),
            spreadsheet_id: get(ENV_SPREADSHEET_ID).unwrap_or_default(),
            tab_name: get(ENV_TAB).unwrap_or_else(|| DEFAULT_TAB.to_string()),
            service_account_path: get(ENV_SERVICE_ACCOUNT)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SERVICE_ACCOUNT)),
            batch_size,
            batch_pause: DEFAULT_BATCH_PAUSE,
            table_mode,
            timeouts: Timeouts::default(),
            screenshot_path: get(ENV_SCREENSHOT)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCREENSHOT)),
            launch,
        };
        config.check_batch_size()?;
        Ok(config)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, o: ConfigOverrides) -> Result<Self, RunError> {
        if let Some(id) = o.spreadsheet_id {
            self.spreadsheet_id = id;
        }
        if let Some(tab) = o.tab {
            self.tab_name = tab;
        }
        if let Some(size) = o.batch_size {
            self.batch_size = size;
        }
        if let Some(dir) = o.staging_dir {
            self.staging_dir = dir;
        }
        if o.no_dedup {
            self.table_mode = TableMode::Raw;
        }
        if o.headed {
            self.launch.headless = false;
        }
        self.check_batch_size()?;
        Ok(self)
    }

    /// Portal credentials, or a precondition failure naming what is missing.
    pub fn require_credentials(&self) -> Result<&Credentials, RunError> {
        match &self.credentials {
            Some(c) if c.is_complete() => Ok(c),
            _ => Err(RunError::Precondition(format!(
                "portal credentials missing: set {ENV_USER} and {ENV_PASSWORD}"
            ))),
        }
    }

    /// Destination spreadsheet and service-account file must be present.
    pub fn require_destination(&self) -> Result<(), RunError> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(RunError::Precondition(format!(
                "destination spreadsheet missing: set {ENV_SPREADSHEET_ID}"
            )));
        }
        if self.tab_name.trim().is_empty() {
            return Err(RunError::Precondition("destination tab name is empty".into()));
        }
        if !self.service_account_path.is_file() {
            return Err(RunError::Precondition(format!(
                "service-account file not found: {}",
                self.service_account_path.display()
            )));
        }
        Ok(())
    }

    fn check_batch_size(&self) -> Result<(), RunError> {
        if self.batch_size == 0 {
            return Err(RunError::Precondition("batch size must be at least 1".into()));
        }
        Ok(())
    }
}

fn is_false(v: &str) -> bool {
    matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = RunConfig::from_lookup(lookup(&[])).unwrap();
        assert!(config.credentials.is_none());
        assert_eq!(config.tab_name, DEFAULT_TAB);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.table_mode, TableMode::Deduplicate);
        assert!(config.launch.headless);
        assert!(config.require_credentials().is_err());
    }

    #[test]
    fn test_missing_either_credential_is_precondition() {
        let only_user = RunConfig::from_lookup(lookup(&[(ENV_USER, "ops1")])).unwrap();
        assert!(matches!(
            only_user.require_credentials(),
            Err(RunError::Precondition(_))
        ));

        let blank =
            RunConfig::from_lookup(lookup(&[(ENV_USER, " "), (ENV_PASSWORD, "x")])).unwrap();
        assert!(blank.require_credentials().is_err());

        let both =
            RunConfig::from_lookup(lookup(&[(ENV_USER, "ops1"), (ENV_PASSWORD, "pw")])).unwrap();
        assert_eq!(both.require_credentials().unwrap().user(), "ops1");
    }

    #[test]
    fn test_environment_values_are_parsed() {
        let config = RunConfig::from_lookup(lookup(&[
            (ENV_BATCH_SIZE, "500"),
            (ENV_DEDUP, "false"),
            (ENV_HEADLESS, "0"),
            (ENV_TAB, "Dados"),
        ]))
        .unwrap();
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.table_mode, TableMode::Raw);
        assert!(!config.launch.headless);
        assert_eq!(config.tab_name, "Dados");
    }

    #[test]
    fn test_bad_batch_size_is_rejected() {
        assert!(RunConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "lots")])).is_err());
        assert!(RunConfig::from_lookup(lookup(&[(ENV_BATCH_SIZE, "0")])).is_err());

        let config = RunConfig::from_lookup(lookup(&[])).unwrap();
        let overrides = ConfigOverrides {
            batch_size: Some(0),
            ..ConfigOverrides::default()
        };
        assert!(config.with_overrides(overrides).is_err());
    }

    #[test]
    fn test_destination_requires_service_account_file() {
        let dir = tempfile::tempdir().unwrap();
        let key = dir.path().join("sa.json");
        let mut config =
            RunConfig::from_lookup(lookup(&[(ENV_SPREADSHEET_ID, "sheet-1")])).unwrap();
        config.service_account_path = key.clone();
        assert!(config.require_destination().is_err());

        std::fs::write(&key, "{}").unwrap();
        config.require_destination().unwrap();
    }

    #[test]
    fn test_debug_redacts_secret() {
        let creds = Credentials::new("ops1", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("ops1"));
        assert!(!shown.contains("hunter2"));
    }
}
