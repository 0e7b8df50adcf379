use serde::Serialize;

use crate::models::portfolio::HoldingInput;
use crate::validation::entry::{normalize_ticker_str, truncate_chars};
use crate::validation::portfolio::{MAX_BULK_HOLDINGS, MAX_LABEL_LENGTH};

/// A problem on one line of an uploaded holdings CSV (1-based).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CsvImport {
    #[serde(skip)]
    pub holdings: Vec<HoldingInput>,
    pub errors: Vec<LineError>,
    pub skipped: usize,
}

fn looks_like_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    lower.contains("ticker") || lower.contains("symbol")
}

/// Parses `ticker[,label]` lines.
///
/// The first non-blank line is dropped when it looks like a header. Parsing
/// stops at the first ticker past `max_holdings`.
pub fn parse_holdings_csv(input: &str, max_holdings: usize) -> CsvImport {
    let mut result = CsvImport::default();
    let mut header_checked = false;

    for (index, raw) in input.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if !header_checked {
            header_checked = true;
            if looks_like_header(line) {
                continue;
            }
        }

        let (ticker_raw, label_raw) = line.split_once(',').unwrap_or((line, ""));
        let Some(ticker) = normalize_ticker_str(ticker_raw) else {
            result.errors.push(LineError {
                line: index + 1,
                message: "Invalid ticker".to_string(),
            });
            continue;
        };
        if result.holdings.iter().any(|h| h.ticker == ticker) {
            result.skipped += 1;
            continue;
        }
        if result.holdings.len() >= max_holdings {
            result.errors.push(LineError {
                line: index + 1,
                message: format!("Cannot import more than {} holdings at once.", max_holdings),
            });
            break;
        }

        let label = label_raw.trim();
        result.holdings.push(HoldingInput {
            ticker,
            label: (!label.is_empty()).then(|| truncate_chars(label, MAX_LABEL_LENGTH)),
            quantity: None,
            purchase_price: None,
        });
    }

    result
}

pub fn parse_default(input: &str) -> CsvImport {
    parse_holdings_csv(input, MAX_BULK_HOLDINGS)
}
