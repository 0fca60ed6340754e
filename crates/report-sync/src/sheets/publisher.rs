//! Sync publisher: clear-then-replace upload in bounded batches.

use super::{SheetsService, TabRef};
use crate::error::PublishError;
use crate::table::RawTable;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Batch size and pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishSettings {
    /// Maximum body rows per append request.
    pub batch_size: usize,
    /// Pause between consecutive body batches.
    pub pause: Duration,
}

/// What a completed publish wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub tab: TabRef,
    pub rows_committed: usize,
    pub batches: usize,
}

/// Writes a table into a tab, replacing whatever was there.
pub struct SyncPublisher {
    service: Arc<dyn SheetsService>,
    settings: PublishSettings,
}

impl SyncPublisher {
    pub fn new(service: Arc<dyn SheetsService>, settings: PublishSettings) -> Self {
        Self { service, settings }
    }

    /// Clear `tab_name`, write the header, then the body in batches.
    ///
    /// Batches are appended strictly in row order. Any failed write, header
    /// (batch 0) included, is a `BatchWrite` carrying the number of body rows
    /// already committed; those rows stay in the tab.
    pub async fn publish(
        &self,
        table: &RawTable,
        spreadsheet_id: &str,
        tab_name: &str,
    ) -> Result<PublishReport, PublishError> {
        let tab = self.service.open_tab(spreadsheet_id, tab_name).await?;
        info!(tab = %tab.title, "clearing tab");
        self.service.clear(&tab).await?;

        self.service
            .append_rows(&tab, std::slice::from_ref(&table.columns))
            .await
            .map_err(|e| PublishError::BatchWrite {
                batch: 0,
                committed_rows: 0,
                source: Box::new(e),
            })?;

        let rows = table.to_sheet_rows();
        let size = self.settings.batch_size;
        let total = batch_count(rows.len(), size);
        info!(rows = rows.len(), batches = total, "uploading body");

        let mut committed = 0;
        for (i, batch) in partition(&rows, size).enumerate() {
            if i > 0 && !self.settings.pause.is_zero() {
                tokio::time::sleep(self.settings.pause).await;
            }
            self.service
                .append_rows(&tab, batch)
                .await
                .map_err(|e| PublishError::BatchWrite {
                    batch: i + 1,
                    committed_rows: committed,
                    source: Box::new(e),
                })?;
            committed += batch.len();
            info!(batch = i + 1, of = total, committed, "batch sent");
        }

        Ok(PublishReport {
            tab,
            rows_committed: committed,
            batches: total,
        })
    }
}

/// Split rows into consecutive batches of at most `size` rows.
pub fn partition(rows: &[Vec<String>], size: usize) -> std::slice::Chunks<'_, Vec<String>> {
    rows.chunks(size.max(1))
}

/// Number of non-empty batches for `rows` rows.
pub fn batch_count(rows: usize, size: usize) -> usize {
    rows.div_ceil(size.max(1))
}
