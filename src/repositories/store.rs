use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::models::entry::{Entry, EntryCounts, EntryInput, EntryKind, EntrySet};
use crate::models::portfolio::{Holding, HoldingInput, HoldingUpdate, PortfolioSnapshot, SiteSettings};

/// Everything the notebook persists.
///
/// Entry lists come back newest first, snapshots oldest first and holdings
/// newest first.
#[async_trait]
pub trait NotebookStore: Send + Sync {
    async fn list_entries(&self, kind: EntryKind) -> Result<Vec<Entry>>;
    async fn get_entry(&self, kind: EntryKind, id: &str) -> Result<Option<Entry>>;
    /// Stores a new entry under a fresh id.
    async fn create_entry(&self, input: EntryInput) -> Result<Entry>;
    /// Replaces the fields of an existing entry, keeping `createdAt`.
    async fn update_entry(&self, id: &str, input: EntryInput) -> Result<Option<Entry>>;
    async fn delete_entry(&self, kind: EntryKind, id: &str) -> Result<bool>;

    async fn all_entries(&self) -> Result<EntrySet>;
    /// Swaps all three collections for `entries` in one atomic step.
    async fn replace_all_entries(&self, entries: EntrySet) -> Result<EntryCounts>;

    async fn list_snapshots(&self) -> Result<Vec<PortfolioSnapshot>>;
    async fn upsert_snapshot(&self, date: NaiveDate, value: f64) -> Result<PortfolioSnapshot>;

    async fn list_holdings(&self) -> Result<Vec<Holding>>;
    /// Inserts holdings, merging into existing rows with the same ticker.
    async fn upsert_holdings(&self, holdings: Vec<HoldingInput>) -> Result<Vec<Holding>>;
    async fn update_holding(&self, id: &str, update: HoldingUpdate) -> Result<Option<Holding>>;
    async fn delete_holding(&self, id: &str) -> Result<bool>;

    async fn get_settings(&self) -> Result<SiteSettings>;
    async fn update_settings(&self, settings: SiteSettings) -> Result<SiteSettings>;
}
