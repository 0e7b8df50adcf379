use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::models::entry::{Entry, EntryCounts, EntryInput, EntryKind, EntrySet};
use crate::models::portfolio::{Holding, HoldingInput, HoldingUpdate, PortfolioSnapshot, SiteSettings};
use crate::repositories::store::NotebookStore;

#[derive(Default)]
struct Notebook {
    entries: EntrySet,
    snapshots: BTreeMap<NaiveDate, PortfolioSnapshot>,
    holdings: Vec<Holding>,
    settings: Option<SiteSettings>,
}

/// Process-local store used when no database is configured.
///
/// One lock guards every collection, so a restore is observed either fully
/// or not at all.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Notebook>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut entries: Vec<Entry>) -> Vec<Entry> {
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    entries
}

#[async_trait]
impl NotebookStore for MemoryStore {
    async fn list_entries(&self, kind: EntryKind) -> Result<Vec<Entry>> {
        let notebook = self.inner.read().await;
        Ok(newest_first(notebook.entries.get(kind).clone()))
    }

    async fn get_entry(&self, kind: EntryKind, id: &str) -> Result<Option<Entry>> {
        let notebook = self.inner.read().await;
        Ok(notebook.entries.get(kind).iter().find(|e| e.id == id).cloned())
    }

    async fn create_entry(&self, input: EntryInput) -> Result<Entry> {
        let now = Utc::now();
        let entry = Entry {
            id: Uuid::new_v4().to_string(),
            fields: input,
            created_at: now,
            updated_at: now,
        };
        let mut notebook = self.inner.write().await;
        notebook.entries.get_mut(entry.kind()).push(entry.clone());
        Ok(entry)
    }

    async fn update_entry(&self, id: &str, input: EntryInput) -> Result<Option<Entry>> {
        let mut notebook = self.inner.write().await;
        let Some(entry) = notebook
            .entries
            .get_mut(input.kind())
            .iter_mut()
            .find(|e| e.id == id)
        else {
            return Ok(None);
        };
        entry.fields = input;
        entry.updated_at = Utc::now();
        Ok(Some(entry.clone()))
    }

    async fn delete_entry(&self, kind: EntryKind, id: &str) -> Result<bool> {
        let mut notebook = self.inner.write().await;
        let entries = notebook.entries.get_mut(kind);
        let before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() != before)
    }

    async fn all_entries(&self) -> Result<EntrySet> {
        let notebook = self.inner.read().await;
        Ok(EntrySet {
            journal: newest_first(notebook.entries.journal.clone()),
            learning: newest_first(notebook.entries.learning.clone()),
            resources: newest_first(notebook.entries.resources.clone()),
        })
    }

    async fn replace_all_entries(&self, entries: EntrySet) -> Result<EntryCounts> {
        let counts = entries.counts();
        let mut notebook = self.inner.write().await;
        notebook.entries = entries;
        Ok(counts)
    }

    async fn list_snapshots(&self) -> Result<Vec<PortfolioSnapshot>> {
        let notebook = self.inner.read().await;
        Ok(notebook.snapshots.values().cloned().collect())
    }

    async fn upsert_snapshot(&self, date: NaiveDate, value: f64) -> Result<PortfolioSnapshot> {
        let snapshot = PortfolioSnapshot {
            date,
            value,
            updated_at: Utc::now(),
        };
        let mut notebook = self.inner.write().await;
        notebook.snapshots.insert(date, snapshot.clone());
        Ok(snapshot)
    }

    async fn list_holdings(&self) -> Result<Vec<Holding>> {
        let notebook = self.inner.read().await;
        let mut holdings = notebook.holdings.clone();
        holdings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(holdings)
    }

    async fn upsert_holdings(&self, inputs: Vec<HoldingInput>) -> Result<Vec<Holding>> {
        let mut notebook = self.inner.write().await;
        let mut saved = Vec::with_capacity(inputs.len());

        for input in inputs {
            if let Some(existing) = notebook.holdings.iter_mut().find(|h| h.ticker == input.ticker) {
                existing.label = input.label.or(existing.label.take());
                existing.quantity = input.quantity.or(existing.quantity);
                existing.purchase_price = input.purchase_price.or(existing.purchase_price);
                saved.push(existing.clone());
                continue;
            }
            let holding = Holding {
                id: Uuid::new_v4().to_string(),
                ticker: input.ticker,
                label: input.label,
                quantity: input.quantity,
                purchase_price: input.purchase_price,
                created_at: Utc::now(),
            };
            notebook.holdings.push(holding.clone());
            saved.push(holding);
        }

        Ok(saved)
    }

    async fn update_holding(&self, id: &str, update: HoldingUpdate) -> Result<Option<Holding>> {
        let mut notebook = self.inner.write().await;
        let Some(holding) = notebook.holdings.iter_mut().find(|h| h.id == id) else {
            return Ok(None);
        };
        holding.label = update.label;
        holding.quantity = update.quantity;
        holding.purchase_price = update.purchase_price;
        Ok(Some(holding.clone()))
    }

    async fn delete_holding(&self, id: &str) -> Result<bool> {
        let mut notebook = self.inner.write().await;
        let before = notebook.holdings.len();
        notebook.holdings.retain(|h| h.id != id);
        Ok(notebook.holdings.len() != before)
    }

    async fn get_settings(&self) -> Result<SiteSettings> {
        let notebook = self.inner.read().await;
        Ok(notebook.settings.clone().unwrap_or_default())
    }

    async fn update_settings(&self, settings: SiteSettings) -> Result<SiteSettings> {
        let mut notebook = self.inner.write().await;
        notebook.settings = Some(settings.clone());
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::LearningFields;

    fn learning(title: &str) -> EntryInput {
        EntryInput::Learning(LearningFields {
            title: title.to_string(),
            content: "notes".to_string(),
            goal: None,
            next_step: None,
        })
    }

    #[tokio::test]
    async fn entry_crud() {
        let store = MemoryStore::new();
        let created = store.create_entry(learning("First")).await.unwrap();
        assert_eq!(created.kind(), EntryKind::Learning);

        let updated = store
            .update_entry(&created.id, learning("Renamed"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.fields.title(), "Renamed");
        assert_eq!(updated.created_at, created.created_at);
        assert!(updated.updated_at >= created.updated_at);

        assert!(store.get_entry(EntryKind::Journal, &created.id).await.unwrap().is_none());
        assert!(store.delete_entry(EntryKind::Learning, &created.id).await.unwrap());
        assert!(!store.delete_entry(EntryKind::Learning, &created.id).await.unwrap());
    }

    #[tokio::test]
    async fn holdings_upsert_by_ticker() {
        let store = MemoryStore::new();
        let first = store
            .upsert_holdings(vec![HoldingInput {
                ticker: "VTI".to_string(),
                label: Some("Total market".to_string()),
                quantity: Some(3.0),
                purchase_price: None,
            }])
            .await
            .unwrap();
        let second = store
            .upsert_holdings(vec![HoldingInput {
                ticker: "VTI".to_string(),
                label: None,
                quantity: None,
                purchase_price: Some(210.5),
            }])
            .await
            .unwrap();

        assert_eq!(first[0].id, second[0].id);
        assert_eq!(second[0].label.as_deref(), Some("Total market"));
        assert_eq!(second[0].quantity, Some(3.0));
        assert_eq!(second[0].purchase_price, Some(210.5));
        assert_eq!(store.list_holdings().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn snapshots_upsert_and_sort_by_date() {
        let store = MemoryStore::new();
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        store.upsert_snapshot(d("2025-02-01"), 10.0).await.unwrap();
        store.upsert_snapshot(d("2025-01-01"), 5.0).await.unwrap();
        store.upsert_snapshot(d("2025-02-01"), 12.0).await.unwrap();

        let snapshots = store.list_snapshots().await.unwrap();
        let values: Vec<f64> = snapshots.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![5.0, 12.0]);
    }

    #[tokio::test]
    async fn settings_default_until_saved() {
        let store = MemoryStore::new();
        assert_eq!(store.get_settings().await.unwrap(), SiteSettings::default());
    }
}
