//! Google Sheets REST client.
//!
//! Authenticates with a service-account key through `gcp_auth` and talks to
//! the Sheets v4 values API with `reqwest`.

use super::{SheetsService, TabRef};
use crate::error::PublishError;
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/";

/// Scopes requested for the service account.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];

/// Supplies bearer tokens for API calls.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String, PublishError>;
}

/// Tokens minted from a service-account key file.
pub struct ServiceAccountTokens {
    provider: Arc<dyn TokenProvider>,
}

impl ServiceAccountTokens {
    pub fn from_file(path: &Path) -> Result<Self, PublishError> {
        if !path.is_file() {
            return Err(PublishError::AuthConfig(format!(
                "service-account file not found: {}",
                path.display()
            )));
        }
        let account = CustomServiceAccount::from_file(path).map_err(|e| {
            PublishError::AuthConfig(format!(
                "invalid service-account file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self {
            provider: Arc::new(account),
        })
    }
}

#[async_trait]
impl AccessTokenSource for ServiceAccountTokens {
    async fn access_token(&self) -> Result<String, PublishError> {
        let token = self
            .provider
            .token(SCOPES)
            .await
            .map_err(|e| PublishError::AuthConfig(format!("failed to get access token: {e}")))?;
        Ok(token.as_str().to_string())
    }
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    #[serde(default)]
    sheet_id: i64,
    title: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    major_dimension: &'static str,
    values: &'a [Vec<String>],
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Sheets v4 client.
pub struct GoogleSheetsClient {
    http: reqwest::Client,
    base: Url,
    tokens: Arc<dyn AccessTokenSource>,
}

impl std::fmt::Debug for GoogleSheetsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleSheetsClient")
            .field("base", &self.base.as_str())
            .field("tokens", &"<AccessTokenSource>")
            .finish()
    }
}

impl GoogleSheetsClient {
    /// Client authenticated by the service-account key at `path`.
    pub fn from_service_account_file(path: &Path) -> Result<Self, PublishError> {
        let tokens = ServiceAccountTokens::from_file(path)?;
        Self::with_base_url(Arc::new(tokens), SHEETS_API_BASE)
    }

    /// Client against an alternative API root.
    pub fn with_base_url(
        tokens: Arc<dyn AccessTokenSource>,
        base: &str,
    ) -> Result<Self, PublishError> {
        let base = Url::parse(base)
            .map_err(|e| PublishError::Transport(format!("invalid API base {base}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(PublishError::Transport(format!("invalid API base {base}")));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { http, base, tokens })
    }

    /// `{base}/spreadsheets/{id}/...segments`.
    fn endpoint(&self, spreadsheet_id: &str, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .push("spreadsheets")
                .push(spreadsheet_id)
                .extend(segments);
        }
        url
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, PublishError> {
        let token = self.tokens.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        Err(PublishError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

/// A1 range covering a whole tab.
fn whole_tab(title: &str) -> String {
    format!("'{}'", title.replace('\'', "''"))
}

#[async_trait]
impl SheetsService for GoogleSheetsClient {
    async fn open_tab(&self, spreadsheet_id: &str, tab: &str) -> Result<TabRef, PublishError> {
        let mut url = self.endpoint(spreadsheet_id, &[]);
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties(sheetId,title)");

        let meta: SpreadsheetMeta = self.send(self.http.get(url)).await?.json().await?;
        debug!(tabs = meta.sheets.len(), "spreadsheet metadata loaded");

        meta.sheets
            .into_iter()
            .map(|s| s.properties)
            .find(|p| p.title == tab)
            .map(|p| TabRef {
                spreadsheet_id: spreadsheet_id.to_string(),
                sheet_id: p.sheet_id,
                title: p.title,
            })
            .ok_or_else(|| PublishError::TabNotFound {
                spreadsheet_id: spreadsheet_id.to_string(),
                tab: tab.to_string(),
            })
    }

    async fn clear(&self, tab: &TabRef) -> Result<(), PublishError> {
        let range = format!("{}:clear", whole_tab(&tab.title));
        let url = self.endpoint(&tab.spreadsheet_id, &["values", &range]);
        self.send(self.http.post(url).json(&serde_json::json!({})))
            .await?;
        Ok(())
    }

    async fn append_rows(&self, tab: &TabRef, rows: &[Vec<String>]) -> Result<(), PublishError> {
        let range = format!("{}:append", whole_tab(&tab.title));
        let mut url = self.endpoint(&tab.spreadsheet_id, &["values", &range]);
        url.query_pairs_mut()
            .append_pair("valueInputOption", "USER_ENTERED")
            .append_pair("insertDataOption", "OVERWRITE");

        let body = ValueRange {
            major_dimension: "ROWS",
            values: rows,
        };
        self.send(self.http.post(url).json(&body)).await?;
        debug!(tab = %tab.title, rows = rows.len(), "rows appended");
        Ok(())
    }
}
