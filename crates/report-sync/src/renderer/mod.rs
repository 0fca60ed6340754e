//! Browser capability interface.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). Everything above
//! this layer talks to the portal through these traits only.

pub mod chromium;
pub mod script;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// How an element on the page is addressed. The first match is used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", rename_all = "snake_case")]
pub enum Target {
    /// CSS selector.
    Css { selector: String },
    /// XPath expression.
    XPath { expr: String },
    /// Input with the given `placeholder` attribute.
    Placeholder { text: String },
    /// ARIA role plus accessible name.
    Role {
        role: String,
        name: String,
        exact: bool,
    },
}

impl Target {
    pub fn css(selector: impl Into<String>) -> Self {
        Target::Css {
            selector: selector.into(),
        }
    }

    pub fn xpath(expr: impl Into<String>) -> Self {
        Target::XPath { expr: expr.into() }
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Target::Placeholder { text: text.into() }
    }

    /// Role with a substring match on the accessible name.
    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Target::Role {
            role: role.into(),
            name: name.into(),
            exact: false,
        }
    }

    /// Role with an exact match on the accessible name.
    pub fn role_exact(role: impl Into<String>, name: impl Into<String>) -> Self {
        Target::Role {
            role: role.into(),
            name: name.into(),
            exact: true,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Css { selector } => write!(f, "css={selector}"),
            Target::XPath { expr } => write!(f, "xpath={expr}"),
            Target::Placeholder { text } => write!(f, "placeholder={text}"),
            Target::Role { role, name, exact } => {
                write!(f, "role={role}[name={name:?}{}]", if *exact { "" } else { "i" })
            }
        }
    }
}

/// A bounded wait inside a capability call ran out.
///
/// Implementations return this (through `anyhow`) so callers can tell a
/// timeout apart from any other failure.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{what} timed out after {timeout_ms}ms")]
pub struct TimedOut {
    pub what: String,
    pub timeout_ms: u64,
}

impl TimedOut {
    pub fn new(what: impl Into<String>, timeout: Duration) -> Self {
        Self {
            what: what.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }
}

/// A completed download, already persisted to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// File name the server suggested.
    pub suggested_name: String,
    /// Where the bytes were written.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub bytes: u64,
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
}

/// A single browser context (tab).
///
/// Each call is a single bounded attempt; nothing here retries.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL with a timeout.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Whether the target exists and is rendered with a non-empty box.
    async fn is_visible(&self, target: &Target) -> Result<bool>;
    /// Click the target without waiting for actionability.
    async fn click(&mut self, target: &Target) -> Result<()>;
    /// Replace the value of an input.
    async fn fill(&mut self, target: &Target, value: &str) -> Result<()>;
    /// Send a key press (e.g. `"Escape"`) to the focused element.
    async fn press_key(&mut self, key: &str) -> Result<()>;
    /// Click `trigger` and wait for the download it starts to finish in `dir`.
    async fn download(
        &mut self,
        trigger: &Target,
        dir: &Path,
        timeout: Duration,
    ) -> Result<DownloadedFile>;
    /// Capture a full-page PNG screenshot.
    async fn screenshot(&self, path: &Path) -> Result<()>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}
