//! Spreadsheet capability interface.
//!
//! The publisher only needs three operations from the destination: resolve a
//! tab, clear it, and append rows to it. [`google::GoogleSheetsClient`] is the
//! production implementation.

pub mod google;
pub mod publisher;

use crate::error::PublishError;
use async_trait::async_trait;
use serde::Serialize;

/// A resolved tab inside a spreadsheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabRef {
    pub spreadsheet_id: String,
    /// Numeric id of the tab within the spreadsheet.
    pub sheet_id: i64,
    pub title: String,
}

/// Operations a destination spreadsheet must support.
#[async_trait]
pub trait SheetsService: Send + Sync {
    /// Resolve `tab` by title. Never creates it.
    async fn open_tab(&self, spreadsheet_id: &str, tab: &str) -> Result<TabRef, PublishError>;
    /// Remove every value in the tab.
    async fn clear(&self, tab: &TabRef) -> Result<(), PublishError>;
    /// Append rows after the last non-empty row, letting the service interpret
    /// cell text (numbers, dates) as a user typing it would.
    async fn append_rows(&self, tab: &TabRef, rows: &[Vec<String>]) -> Result<(), PublishError>;
}
