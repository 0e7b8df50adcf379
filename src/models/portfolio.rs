use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A dated portfolio value. One per calendar date.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    pub value: f64,
    pub updated_at: DateTime<Utc>,
}

/// A tracked ticker with optional position metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    pub id: String,
    pub ticker: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_price: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// A validated holding to insert or upsert by ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct HoldingInput {
    pub ticker: String,
    pub label: Option<String>,
    pub quantity: Option<f64>,
    pub purchase_price: Option<f64>,
}

/// A validated change to an existing holding. `None` clears the field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoldingUpdate {
    pub label: Option<String>,
    pub quantity: Option<f64>,
    pub purchase_price: Option<f64>,
}

/// Public profile settings shown on the landing page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteSettings {
    pub headline: String,
    pub summary: String,
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

impl Default for SiteSettings {
    fn default() -> Self {
        Self {
            headline: "Investing Garden".to_string(),
            summary: "A clean, industrial workspace for tracking portfolio moves, market context, and research notes in one place.".to_string(),
            focus_areas: Vec::new(),
        }
    }
}
