//! Local scan history, kept apart from the in-memory view.

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::domain::{ComicSummary, HistoryEntryId, ScanHistoryEntry, ScanResult};
use storage::Storage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The entry was removed (or never existed).
    Missing,
}

#[async_trait]
pub trait ScanHistory: Send + Sync {
    async fn create_entry(&self, scan: &ScanResult) -> Result<HistoryEntryId>;
    /// Appending a hash the entry already lists is a no-op.
    async fn append_comic(
        &self,
        entry_id: &HistoryEntryId,
        comic: &ComicSummary,
    ) -> Result<AppendOutcome>;
    /// Newest first.
    async fn list_entries(&self) -> Result<Vec<ScanHistoryEntry>>;
    async fn load_entry(&self, entry_id: &HistoryEntryId) -> Result<Option<ScanHistoryEntry>>;
}

#[async_trait]
impl ScanHistory for Storage {
    async fn create_entry(&self, scan: &ScanResult) -> Result<HistoryEntryId> {
        self.create_history_entry(scan)
            .await
            .with_context(|| format!("failed to record scan of '{}'", scan.filename))
    }

    async fn append_comic(
        &self,
        entry_id: &HistoryEntryId,
        comic: &ComicSummary,
    ) -> Result<AppendOutcome> {
        let appended = self
            .append_history_comic(entry_id, comic)
            .await
            .with_context(|| format!("failed to add comic to history entry '{entry_id}'"))?;
        Ok(if appended {
            AppendOutcome::Appended
        } else {
            AppendOutcome::Missing
        })
    }

    async fn list_entries(&self) -> Result<Vec<ScanHistoryEntry>> {
        self.list_history_entries().await
    }

    async fn load_entry(&self, entry_id: &HistoryEntryId) -> Result<Option<ScanHistoryEntry>> {
        self.load_history_entry(entry_id).await
    }
}
