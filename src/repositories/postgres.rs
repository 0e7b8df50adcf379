use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::{types::Json, GenericClient, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::entry::{
    Entry, EntryCounts, EntryInput, EntryKind, EntrySet, JournalFields, LearningFields,
    ResourceFields,
};
use crate::models::portfolio::{Holding, HoldingInput, HoldingUpdate, PortfolioSnapshot, SiteSettings};
use crate::repositories::store::NotebookStore;

const SETTINGS_ID: &str = "profile";

fn select_columns(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Journal => {
            "id, title, content, outcome, emotion, tags, ticker, created_at, updated_at"
        }
        EntryKind::Learning => "id, title, content, goal, next_step, created_at, updated_at",
        EntryKind::Resources => {
            "id, title, content, url, source_type, tags, created_at, updated_at"
        }
    }
}

fn tags_column(row: &Row) -> Result<Option<Vec<String>>> {
    let tags: Option<Json<Vec<String>>> = row.try_get("tags")?;
    Ok(tags.map(|Json(tags)| tags).filter(|tags| !tags.is_empty()))
}

fn entry_from_row(kind: EntryKind, row: &Row) -> Result<Entry> {
    let title: String = row.try_get("title")?;
    let content: String = row.try_get("content")?;

    let fields = match kind {
        EntryKind::Journal => EntryInput::Journal(JournalFields {
            title,
            content,
            outcome: row.try_get("outcome")?,
            emotion: row.try_get("emotion")?,
            tags: tags_column(row)?,
            ticker: row.try_get("ticker")?,
        }),
        EntryKind::Learning => EntryInput::Learning(LearningFields {
            title,
            content,
            goal: row.try_get("goal")?,
            next_step: row.try_get("next_step")?,
        }),
        EntryKind::Resources => EntryInput::Resource(ResourceFields {
            title,
            content,
            url: row.try_get("url")?,
            source_type: row.try_get("source_type")?,
            tags: tags_column(row)?,
        }),
    };

    Ok(Entry {
        id: row.try_get("id")?,
        fields,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

async fn insert_entry<C: GenericClient + Sync>(client: &C, entry: &Entry) -> Result<()> {
    match &entry.fields {
        EntryInput::Journal(f) => {
            client
                .execute(
                    "INSERT INTO journal_entries
                        (id, title, content, outcome, emotion, tags, ticker, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
                    &[
                        &entry.id,
                        &f.title,
                        &f.content,
                        &f.outcome,
                        &f.emotion,
                        &f.tags.as_ref().map(Json),
                        &f.ticker,
                        &entry.created_at,
                        &entry.updated_at,
                    ],
                )
                .await?;
        }
        EntryInput::Learning(f) => {
            client
                .execute(
                    "INSERT INTO learning_entries
                        (id, title, content, goal, next_step, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    &[
                        &entry.id,
                        &f.title,
                        &f.content,
                        &f.goal,
                        &f.next_step,
                        &entry.created_at,
                        &entry.updated_at,
                    ],
                )
                .await?;
        }
        EntryInput::Resource(f) => {
            client
                .execute(
                    "INSERT INTO resource_entries
                        (id, title, content, url, source_type, tags, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                    &[
                        &entry.id,
                        &f.title,
                        &f.content,
                        &f.url,
                        &f.source_type,
                        &f.tags.as_ref().map(Json),
                        &entry.created_at,
                        &entry.updated_at,
                    ],
                )
                .await?;
        }
    }
    Ok(())
}

fn snapshot_from_row(row: &Row) -> Result<PortfolioSnapshot> {
    Ok(PortfolioSnapshot {
        date: row.try_get("snapshot_date")?,
        value: row.try_get("value")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn holding_from_row(row: &Row) -> Result<Holding> {
    Ok(Holding {
        id: row.try_get("id")?,
        ticker: row.try_get("ticker")?,
        label: row.try_get("label")?,
        quantity: row.try_get("quantity")?,
        purchase_price: row.try_get("purchase_price")?,
        created_at: row.try_get("created_at")?,
    })
}

const HOLDING_COLUMNS: &str = "id, ticker, label, quantity, purchase_price, created_at";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotebookStore for PgStore {
    async fn list_entries(&self, kind: EntryKind) -> Result<Vec<Entry>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM {} ORDER BY created_at DESC",
            select_columns(kind),
            kind.table()
        );
        let stmt = client.prepare_cached(&query).await?;
        let rows = client.query(&stmt, &[]).await?;
        rows.iter().map(|row| entry_from_row(kind, row)).collect()
    }

    async fn get_entry(&self, kind: EntryKind, id: &str) -> Result<Option<Entry>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM {} WHERE id = $1",
            select_columns(kind),
            kind.table()
        );
        let stmt = client.prepare_cached(&query).await?;
        client
            .query_opt(&stmt, &[&id])
            .await?
            .map(|row| entry_from_row(kind, &row))
            .transpose()
    }

    async fn create_entry(&self, input: EntryInput) -> Result<Entry> {
        let client = self.pool.get().await?;
        let now = Utc::now();
        let entry = Entry {
            id: Uuid::new_v4().to_string(),
            fields: input,
            created_at: now,
            updated_at: now,
        };
        insert_entry(&**client, &entry).await?;
        tracing::debug!("Created {} entry {}", entry.kind(), entry.id);
        Ok(entry)
    }

    async fn update_entry(&self, id: &str, input: EntryInput) -> Result<Option<Entry>> {
        let client = self.pool.get().await?;
        let now: DateTime<Utc> = Utc::now();
        let kind = input.kind();

        let row = match &input {
            EntryInput::Journal(f) => {
                let stmt = client
                    .prepare_cached(
                        "UPDATE journal_entries
                         SET title = $1, content = $2, outcome = $3, emotion = $4,
                             tags = $5, ticker = $6, updated_at = $7
                         WHERE id = $8
                         RETURNING id, title, content, outcome, emotion, tags, ticker, created_at, updated_at",
                    )
                    .await?;
                client
                    .query_opt(
                        &stmt,
                        &[
                            &f.title,
                            &f.content,
                            &f.outcome,
                            &f.emotion,
                            &f.tags.as_ref().map(Json),
                            &f.ticker,
                            &now,
                            &id,
                        ],
                    )
                    .await?
            }
            EntryInput::Learning(f) => {
                let stmt = client
                    .prepare_cached(
                        "UPDATE learning_entries
                         SET title = $1, content = $2, goal = $3, next_step = $4, updated_at = $5
                         WHERE id = $6
                         RETURNING id, title, content, goal, next_step, created_at, updated_at",
                    )
                    .await?;
                client
                    .query_opt(
                        &stmt,
                        &[&f.title, &f.content, &f.goal, &f.next_step, &now, &id],
                    )
                    .await?
            }
            EntryInput::Resource(f) => {
                let stmt = client
                    .prepare_cached(
                        "UPDATE resource_entries
                         SET title = $1, content = $2, url = $3, source_type = $4,
                             tags = $5, updated_at = $6
                         WHERE id = $7
                         RETURNING id, title, content, url, source_type, tags, created_at, updated_at",
                    )
                    .await?;
                client
                    .query_opt(
                        &stmt,
                        &[
                            &f.title,
                            &f.content,
                            &f.url,
                            &f.source_type,
                            &f.tags.as_ref().map(Json),
                            &now,
                            &id,
                        ],
                    )
                    .await?
            }
        };

        row.map(|row| entry_from_row(kind, &row)).transpose()
    }

    async fn delete_entry(&self, kind: EntryKind, id: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let query = format!("DELETE FROM {} WHERE id = $1", kind.table());
        let stmt = client.prepare_cached(&query).await?;
        Ok(client.execute(&stmt, &[&id]).await? > 0)
    }

    async fn all_entries(&self) -> Result<EntrySet> {
        let mut set = EntrySet::default();
        for kind in EntryKind::ALL {
            *set.get_mut(kind) = self.list_entries(kind).await?;
        }
        Ok(set)
    }

    async fn replace_all_entries(&self, entries: EntrySet) -> Result<EntryCounts> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        tx.batch_execute(
            "DELETE FROM journal_entries; DELETE FROM learning_entries; DELETE FROM resource_entries;",
        )
        .await?;
        for kind in EntryKind::ALL {
            for entry in entries.get(kind) {
                insert_entry(&*tx, entry).await?;
            }
        }
        tx.commit().await?;

        let counts = entries.counts();
        tracing::info!(
            "Replaced entries: {} journal, {} learning, {} resources",
            counts.journal,
            counts.learning,
            counts.resources
        );
        Ok(counts)
    }

    async fn list_snapshots(&self) -> Result<Vec<PortfolioSnapshot>> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "SELECT snapshot_date, value, updated_at FROM portfolio_snapshots ORDER BY snapshot_date ASC",
            )
            .await?;
        let rows = client.query(&stmt, &[]).await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn upsert_snapshot(&self, date: NaiveDate, value: f64) -> Result<PortfolioSnapshot> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "INSERT INTO portfolio_snapshots (snapshot_date, value, updated_at)
                 VALUES ($1, $2, $3)
                 ON CONFLICT (snapshot_date)
                 DO UPDATE SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
                 RETURNING snapshot_date, value, updated_at",
            )
            .await?;
        let row = client.query_one(&stmt, &[&date, &value, &Utc::now()]).await?;
        snapshot_from_row(&row)
    }

    async fn list_holdings(&self) -> Result<Vec<Holding>> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {} FROM portfolio_holdings ORDER BY created_at DESC",
            HOLDING_COLUMNS
        );
        let stmt = client.prepare_cached(&query).await?;
        let rows = client.query(&stmt, &[]).await?;
        rows.iter().map(holding_from_row).collect()
    }

    async fn upsert_holdings(&self, holdings: Vec<HoldingInput>) -> Result<Vec<Holding>> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;
        let query = format!(
            "INSERT INTO portfolio_holdings (id, ticker, label, quantity, purchase_price, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (ticker) DO UPDATE SET
                 label = COALESCE(EXCLUDED.label, portfolio_holdings.label),
                 quantity = COALESCE(EXCLUDED.quantity, portfolio_holdings.quantity),
                 purchase_price = COALESCE(EXCLUDED.purchase_price, portfolio_holdings.purchase_price)
             RETURNING {}",
            HOLDING_COLUMNS
        );
        let stmt = tx.prepare_cached(&query).await?;

        let mut saved = Vec::with_capacity(holdings.len());
        for holding in &holdings {
            let id = Uuid::new_v4().to_string();
            let row = tx
                .query_one(
                    &stmt,
                    &[
                        &id,
                        &holding.ticker,
                        &holding.label,
                        &holding.quantity,
                        &holding.purchase_price,
                        &Utc::now(),
                    ],
                )
                .await?;
            saved.push(holding_from_row(&row)?);
        }
        tx.commit().await?;
        Ok(saved)
    }

    async fn update_holding(&self, id: &str, update: HoldingUpdate) -> Result<Option<Holding>> {
        let client = self.pool.get().await?;
        let query = format!(
            "UPDATE portfolio_holdings SET label = $1, quantity = $2, purchase_price = $3
             WHERE id = $4 RETURNING {}",
            HOLDING_COLUMNS
        );
        let stmt = client.prepare_cached(&query).await?;
        client
            .query_opt(
                &stmt,
                &[&update.label, &update.quantity, &update.purchase_price, &id],
            )
            .await?
            .map(|row| holding_from_row(&row))
            .transpose()
    }

    async fn delete_holding(&self, id: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("DELETE FROM portfolio_holdings WHERE id = $1")
            .await?;
        Ok(client.execute(&stmt, &[&id]).await? > 0)
    }

    async fn get_settings(&self) -> Result<SiteSettings> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached("SELECT data FROM site_settings WHERE id = $1")
            .await?;
        let Some(row) = client.query_opt(&stmt, &[&SETTINGS_ID]).await? else {
            return Ok(SiteSettings::default());
        };
        let data: serde_json::Value = row.try_get("data")?;
        Ok(serde_json::from_value(data).unwrap_or_else(|e| {
            tracing::warn!("Stored site settings are unreadable, using defaults: {}", e);
            SiteSettings::default()
        }))
    }

    async fn update_settings(&self, settings: SiteSettings) -> Result<SiteSettings> {
        let client = self.pool.get().await?;
        let stmt = client
            .prepare_cached(
                "INSERT INTO site_settings (id, data, updated_at) VALUES ($1, $2, $3)
                 ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, updated_at = EXCLUDED.updated_at",
            )
            .await?;
        client
            .execute(&stmt, &[&SETTINGS_ID, &Json(&settings), &Utc::now()])
            .await?;
        Ok(settings)
    }
}
