use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::error::AppError;
use crate::models::portfolio::{HoldingInput, HoldingUpdate, SiteSettings};
use crate::validation::entry::{normalize_ticker, optional_text, required_text};

pub const MAX_LABEL_LENGTH: usize = 60;
pub const MAX_BULK_HOLDINGS: usize = 50;
pub const MAX_SETTINGS_HEADLINE: usize = 80;
pub const MAX_SETTINGS_SUMMARY: usize = 280;
pub const MAX_FOCUS_AREAS: usize = 6;
pub const MAX_FOCUS_AREA_LENGTH: usize = 24;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortfolioError {
    #[error("Date and numeric value are required")]
    InvalidSnapshot,
    #[error("Snapshot value cannot be negative.")]
    NegativeSnapshot,
    #[error("Ticker must be 1-10 characters (letters, numbers, . or -)")]
    InvalidTicker,
    #[error("Quantity must be a non-negative number.")]
    InvalidQuantity,
    #[error("Purchase price must be a non-negative number.")]
    InvalidPurchasePrice,
    #[error("Provide at least one holding to import.")]
    EmptyImport,
    #[error("Holdings imports are limited to 50 rows.")]
    TooManyRows,
    #[error("Holdings import contains invalid rows.")]
    InvalidRows(Vec<RowError>),
    #[error("Headline and summary are required.")]
    MissingHeadline,
    #[error("Cannot exceed 6 focus areas.")]
    TooManyFocusAreas,
    #[error("Focus areas must be 24 characters or fewer.")]
    FocusAreaTooLong,
}

impl From<PortfolioError> for AppError {
    fn from(err: PortfolioError) -> Self {
        let message = err.to_string();
        match err {
            PortfolioError::InvalidRows(rows) => AppError::ValidationDetails {
                message,
                details: serde_json::to_value(&rows).unwrap_or_default(),
            },
            _ => AppError::Validation(message),
        }
    }
}

/// A rejected row of a bulk holdings import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub index: usize,
    pub message: &'static str,
}

/// Accepts `YYYY-MM-DD` strings that name a real calendar date.
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    let bytes = value.as_bytes();
    let shaped = bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit());
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

/// Reads a JSON number or a numeric string as a finite `f64`.
fn finite_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

/// Absent or `null` amounts are `None`; anything else must be finite and ≥ 0.
fn optional_amount(value: Option<&Value>, err: PortfolioError) -> Result<Option<f64>, PortfolioError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match finite_number(value) {
            Some(n) if n >= 0.0 => Ok(Some(n)),
            _ => Err(err),
        },
    }
}

pub fn normalize_label(value: Option<&Value>) -> Option<String> {
    optional_text(value, MAX_LABEL_LENGTH)
}

pub fn normalize_snapshot(payload: &Map<String, Value>) -> Result<(NaiveDate, f64), PortfolioError> {
    let date = payload
        .get("date")
        .and_then(Value::as_str)
        .and_then(|d| parse_iso_date(d.trim()))
        .ok_or(PortfolioError::InvalidSnapshot)?;
    let value = payload
        .get("value")
        .and_then(finite_number)
        .ok_or(PortfolioError::InvalidSnapshot)?;
    if value < 0.0 {
        return Err(PortfolioError::NegativeSnapshot);
    }
    Ok((date, value))
}

pub fn normalize_holding(payload: &Map<String, Value>) -> Result<HoldingInput, PortfolioError> {
    let ticker = normalize_ticker(payload.get("ticker")).ok_or(PortfolioError::InvalidTicker)?;
    Ok(HoldingInput {
        ticker,
        label: normalize_label(payload.get("label")),
        quantity: optional_amount(payload.get("quantity"), PortfolioError::InvalidQuantity)?,
        purchase_price: optional_amount(
            payload.get("purchasePrice"),
            PortfolioError::InvalidPurchasePrice,
        )?,
    })
}

pub fn normalize_holding_update(payload: &Map<String, Value>) -> Result<HoldingUpdate, PortfolioError> {
    Ok(HoldingUpdate {
        label: normalize_label(payload.get("label")),
        quantity: optional_amount(payload.get("quantity"), PortfolioError::InvalidQuantity)?,
        purchase_price: optional_amount(
            payload.get("purchasePrice"),
            PortfolioError::InvalidPurchasePrice,
        )?,
    })
}

/// Holdings accepted from a bulk request, first occurrence of each ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkHoldings {
    pub holdings: Vec<HoldingInput>,
    pub skipped: usize,
}

pub fn normalize_bulk_holdings(rows: &[Value]) -> Result<BulkHoldings, PortfolioError> {
    if rows.is_empty() {
        return Err(PortfolioError::EmptyImport);
    }
    if rows.len() > MAX_BULK_HOLDINGS {
        return Err(PortfolioError::TooManyRows);
    }

    let mut holdings: Vec<HoldingInput> = Vec::new();
    let mut errors = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        let Value::Object(record) = row else {
            errors.push(RowError {
                index,
                message: "Invalid row format.",
            });
            continue;
        };
        match normalize_holding(record) {
            Ok(holding) => {
                if !holdings.iter().any(|h| h.ticker == holding.ticker) {
                    holdings.push(holding);
                }
            }
            Err(PortfolioError::InvalidTicker) => errors.push(RowError {
                index,
                message: "Ticker must be 1-10 characters (letters, numbers, . or -).",
            }),
            Err(err) => errors.push(RowError {
                index,
                message: match err {
                    PortfolioError::InvalidQuantity => "Quantity must be a non-negative number.",
                    _ => "Purchase price must be a non-negative number.",
                },
            }),
        }
    }

    if !errors.is_empty() {
        return Err(PortfolioError::InvalidRows(errors));
    }
    let skipped = rows.len() - holdings.len();
    Ok(BulkHoldings { holdings, skipped })
}

pub fn normalize_settings(payload: &Map<String, Value>) -> Result<SiteSettings, PortfolioError> {
    let headline = required_text(payload.get("headline"), MAX_SETTINGS_HEADLINE);
    let summary = required_text(payload.get("summary"), MAX_SETTINGS_SUMMARY);
    let (Some(headline), Some(summary)) = (headline, summary) else {
        return Err(PortfolioError::MissingHeadline);
    };

    let mut focus_areas = Vec::new();
    if let Some(Value::Array(areas)) = payload.get("focusAreas") {
        for area in areas {
            if focus_areas.len() >= MAX_FOCUS_AREAS {
                return Err(PortfolioError::TooManyFocusAreas);
            }
            let Some(area) = area.as_str().map(str::trim).filter(|a| !a.is_empty()) else {
                continue;
            };
            if area.chars().count() > MAX_FOCUS_AREA_LENGTH {
                return Err(PortfolioError::FocusAreaTooLong);
            }
            focus_areas.push(area.to_string());
        }
    }

    Ok(SiteSettings {
        headline,
        summary,
        focus_areas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn iso_dates_must_be_real_calendar_days() {
        assert!(parse_iso_date("2025-02-28").is_some());
        assert!(parse_iso_date("2024-02-29").is_some());
        assert!(parse_iso_date("2025-02-30").is_none());
        assert!(parse_iso_date("2025-2-03").is_none());
        assert!(parse_iso_date("2025-02-03T00:00:00Z").is_none());
        assert!(parse_iso_date("+025-02-03").is_none());
    }

    #[test]
    fn snapshot_accepts_numeric_strings() {
        let (date, value) =
            normalize_snapshot(&object(json!({"date": "2025-01-01", "value": "1250.5"}))).unwrap();
        assert_eq!(date, NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(value, 1250.5);
    }

    #[test]
    fn snapshot_errors() {
        assert_eq!(
            normalize_snapshot(&object(json!({"date": "2025-01-01"}))),
            Err(PortfolioError::InvalidSnapshot)
        );
        assert_eq!(
            normalize_snapshot(&object(json!({"date": "soon", "value": 3}))),
            Err(PortfolioError::InvalidSnapshot)
        );
        assert_eq!(
            normalize_snapshot(&object(json!({"date": "2025-01-01", "value": -1}))),
            Err(PortfolioError::NegativeSnapshot)
        );
    }

    #[test]
    fn holding_amounts_must_be_non_negative() {
        let holding = normalize_holding(&object(json!({
            "ticker": "vti",
            "label": "  Total market  ",
            "quantity": 12,
            "purchasePrice": null,
        })))
        .unwrap();
        assert_eq!(holding.ticker, "VTI");
        assert_eq!(holding.label.as_deref(), Some("Total market"));
        assert_eq!(holding.quantity, Some(12.0));
        assert_eq!(holding.purchase_price, None);

        assert_eq!(
            normalize_holding(&object(json!({"ticker": "VTI", "quantity": -2}))),
            Err(PortfolioError::InvalidQuantity)
        );
        assert_eq!(
            normalize_holding(&object(json!({"ticker": "VTI", "purchasePrice": "abc"}))),
            Err(PortfolioError::InvalidPurchasePrice)
        );
        assert_eq!(
            normalize_holding(&object(json!({"ticker": "way-too-long-ticker"}))),
            Err(PortfolioError::InvalidTicker)
        );
    }

    #[test]
    fn label_is_truncated() {
        let label = normalize_label(Some(&json!("l".repeat(80)))).unwrap();
        assert_eq!(label.len(), MAX_LABEL_LENGTH);
    }

    #[test]
    fn bulk_skips_duplicates_and_reports_bad_rows() {
        let rows = vec![json!({"ticker": "aapl"}), json!({"ticker": "AAPL"}), json!({"ticker": "msft"})];
        let bulk = normalize_bulk_holdings(&rows).unwrap();
        assert_eq!(bulk.holdings.len(), 2);
        assert_eq!(bulk.skipped, 1);

        let rows = vec![json!({"ticker": "aapl"}), json!("oops"), json!({"ticker": "!!"})];
        let Err(PortfolioError::InvalidRows(errors)) = normalize_bulk_holdings(&rows) else {
            panic!("expected row errors");
        };
        assert_eq!(errors.iter().map(|e| e.index).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(errors[0].message, "Invalid row format.");
    }

    #[test]
    fn bulk_limits() {
        assert_eq!(normalize_bulk_holdings(&[]), Err(PortfolioError::EmptyImport));
        let rows: Vec<Value> = (0..51).map(|i| json!({"ticker": format!("T{i}")})).collect();
        assert_eq!(normalize_bulk_holdings(&rows), Err(PortfolioError::TooManyRows));
    }

    #[test]
    fn settings_validation() {
        let settings = normalize_settings(&object(json!({
            "headline": " Garden ",
            "summary": "Notes",
            "focusAreas": ["Value", "", 3, "Macro"],
        })))
        .unwrap();
        assert_eq!(settings.headline, "Garden");
        assert_eq!(settings.focus_areas, vec!["Value", "Macro"]);

        assert_eq!(
            normalize_settings(&object(json!({"headline": "", "summary": "Notes"}))),
            Err(PortfolioError::MissingHeadline)
        );
        assert_eq!(
            normalize_settings(&object(json!({
                "headline": "H",
                "summary": "S",
                "focusAreas": ["a", "b", "c", "d", "e", "f", "g"],
            }))),
            Err(PortfolioError::TooManyFocusAreas)
        );
        assert_eq!(
            normalize_settings(&object(json!({
                "headline": "H",
                "summary": "S",
                "focusAreas": ["x".repeat(25)],
            }))),
            Err(PortfolioError::FocusAreaTooLong)
        );
    }
}
