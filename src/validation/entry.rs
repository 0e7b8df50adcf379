//! Normalization of journal, learning and resource payloads.
//!
//! Field policy:
//!
//! | Field | Limit | When invalid |
//! |---|---|---|
//! | `title` | 1..=120 chars after trim | reject |
//! | `content` | 1..=5000 chars after trim | reject |
//! | `url` (resources) | http/https, ≤ 2048 chars | reject |
//! | `outcome`, `emotion`, `goal`, `nextStep`, `sourceType` | 200 chars | truncate |
//! | `tags` | 12 unique, 24 chars each | truncate / drop extras |
//! | `ticker` | `[A-Z0-9.-]{1,10}` after uppercasing | drop |
//!
//! Keys outside a kind's schema are ignored.

use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::error::AppError;
use crate::models::entry::{
    EntryInput, EntryKind, JournalFields, LearningFields, ResourceFields,
};

pub const MAX_TITLE_LENGTH: usize = 120;
pub const MAX_CONTENT_LENGTH: usize = 5000;
pub const MAX_TEXT_LENGTH: usize = 200;
pub const MAX_URL_LENGTH: usize = 2048;
pub const MAX_TAGS: usize = 12;
pub const MAX_TAG_LENGTH: usize = 24;
pub const MAX_TICKER_LENGTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("Title and content are required")]
    MissingFields,
    #[error("Title, content, and URL are required")]
    MissingResourceFields,
    #[error("URL must start with http:// or https://")]
    InvalidUrl,
}

impl From<EntryError> for AppError {
    fn from(err: EntryError) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Trims `value` and keeps it only if it is non-empty and within `max` chars.
pub fn required_text(value: Option<&Value>, max: usize) -> Option<String> {
    let trimmed = value?.as_str()?.trim();
    if trimmed.is_empty() || trimmed.chars().count() > max {
        return None;
    }
    Some(trimmed.to_string())
}

/// Trims `value` and truncates it to `max` chars. Empty input becomes `None`.
pub fn optional_text(value: Option<&Value>, max: usize) -> Option<String> {
    let trimmed = value?.as_str()?.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(truncate_chars(trimmed, max))
}

pub fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((end, _)) => value[..end].to_string(),
        None => value.to_string(),
    }
}

/// Accepts an array of strings or a comma separated string.
///
/// Tags are trimmed, truncated, deduplicated in first-seen order and capped.
pub fn normalize_tags(value: Option<&Value>) -> Option<Vec<String>> {
    let raw: Vec<&str> = match value? {
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        Value::String(text) => text.split(',').collect(),
        _ => return None,
    };

    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        if tags.len() >= MAX_TAGS {
            break;
        }
        let trimmed = tag.trim();
        if trimmed.is_empty() {
            continue;
        }
        let tag = truncate_chars(trimmed, MAX_TAG_LENGTH);
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    if tags.is_empty() { None } else { Some(tags) }
}

/// Uppercases a ticker and keeps it only if it matches `[A-Z0-9.-]{1,10}`.
pub fn normalize_ticker(value: Option<&Value>) -> Option<String> {
    normalize_ticker_str(value?.as_str()?)
}

pub fn normalize_ticker_str(value: &str) -> Option<String> {
    let ticker = value.trim().to_uppercase();
    let valid = !ticker.is_empty()
        && ticker.len() <= MAX_TICKER_LENGTH
        && ticker
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '.' || c == '-');
    valid.then_some(ticker)
}

/// Parses an absolute http(s) URL and returns its serialized form.
pub fn normalize_url(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_URL_LENGTH {
        return None;
    }
    let parsed = Url::parse(trimmed).ok()?;
    match parsed.scheme() {
        "http" | "https" => Some(parsed.to_string()),
        _ => None,
    }
}

/// Validates `payload` for `kind`, producing the kind's field set.
pub fn normalize_entry_input(
    kind: EntryKind,
    payload: &Map<String, Value>,
) -> Result<EntryInput, EntryError> {
    let missing = match kind {
        EntryKind::Resources => EntryError::MissingResourceFields,
        _ => EntryError::MissingFields,
    };
    let title = required_text(payload.get("title"), MAX_TITLE_LENGTH).ok_or(missing.clone())?;
    let content =
        required_text(payload.get("content"), MAX_CONTENT_LENGTH).ok_or(missing.clone())?;

    let input = match kind {
        EntryKind::Journal => EntryInput::Journal(JournalFields {
            title,
            content,
            outcome: optional_text(payload.get("outcome"), MAX_TEXT_LENGTH),
            emotion: optional_text(payload.get("emotion"), MAX_TEXT_LENGTH),
            tags: normalize_tags(payload.get("tags")),
            ticker: normalize_ticker(payload.get("ticker")),
        }),
        EntryKind::Learning => EntryInput::Learning(LearningFields {
            title,
            content,
            goal: optional_text(payload.get("goal"), MAX_TEXT_LENGTH),
            next_step: optional_text(payload.get("nextStep"), MAX_TEXT_LENGTH),
        }),
        EntryKind::Resources => {
            let raw_url = payload
                .get("url")
                .and_then(Value::as_str)
                .map(str::trim)
                .unwrap_or_default();
            if raw_url.is_empty() {
                return Err(missing);
            }
            let url = normalize_url(raw_url).ok_or(EntryError::InvalidUrl)?;
            EntryInput::Resource(ResourceFields {
                title,
                content,
                url,
                source_type: optional_text(payload.get("sourceType"), MAX_TEXT_LENGTH),
                tags: normalize_tags(payload.get("tags")),
            })
        }
    };

    Ok(input)
}
