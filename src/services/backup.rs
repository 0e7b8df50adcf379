//! Backup export and restore.
//!
//! A backup is `{journal: [], learning: [], resources: []}`, either as one
//! JSON document or as a ZIP archive with one JSON array per collection.
//! Restores are validated completely before anything is written.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use thiserror::Error;
use zip::{write::SimpleFileOptions, CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{AppError, Result};
use crate::models::entry::{Entry, EntryKind, EntrySet};
use crate::validation::entry::normalize_entry_input;

/// Largest accepted backup file.
pub const MAX_BACKUP_FILE_BYTES: usize = 5 * 1024 * 1024;
/// Largest accepted request body, checked against `Content-Length`.
pub const MAX_BACKUP_BODY_BYTES: u64 = 6 * 1024 * 1024;
pub const MAX_BACKUP_ENTRIES: usize = 5000;
pub const MAX_ID_LENGTH: usize = 128;

pub const JSON_FILENAME: &str = "investing-garden-backup.json";
pub const ZIP_FILENAME: &str = "investing-garden-backup.zip";

/// The archive member holding each collection.
pub fn member_name(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Journal => "journal.json",
        EntryKind::Learning => "learning.json",
        EntryKind::Resources => "resources.json",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackupError {
    #[error("Missing file")]
    MissingFile,
    #[error("Backup file is too large.")]
    FileTooLarge,
    #[error("Backup must include journal, learning, and resources keys.")]
    MissingCollections,
    #[error("Backup file is not valid JSON.")]
    InvalidJson,
    #[error("Backup archive could not be read.")]
    InvalidArchive,
    #[error("Backup contains {0} invalid entries.")]
    InvalidEntries(usize),
    #[error("Backup entries must include an id.")]
    MissingId,
    #[error("Backup contains duplicate entry IDs.")]
    DuplicateIds,
    #[error("Backup exceeds the limit of 5000 entries.")]
    TooManyEntries,
}

impl From<BackupError> for AppError {
    fn from(err: BackupError) -> Self {
        match err {
            BackupError::FileTooLarge | BackupError::TooManyEntries => {
                AppError::PayloadTooLarge(err.to_string())
            }
            other => AppError::Validation(other.to_string()),
        }
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let text = value?.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Re-validates one backed-up entry. The id may be empty here; callers
/// reject empty ids for the whole batch.
pub fn normalize_backup_entry(kind: EntryKind, value: &Value, now: DateTime<Utc>) -> Option<Entry> {
    let record = value.as_object()?;
    let fields = normalize_entry_input(kind, record).ok()?;

    let id = record
        .get("id")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if id.chars().count() > MAX_ID_LENGTH {
        return None;
    }

    let created_at = parse_timestamp(record.get("createdAt")).unwrap_or(now);
    let updated_at = parse_timestamp(record.get("updatedAt")).unwrap_or(created_at);
    Some(Entry {
        id: id.to_string(),
        fields,
        created_at,
        updated_at,
    })
}

fn normalize_collection(kind: EntryKind, items: &[Value], now: DateTime<Utc>) -> std::result::Result<Vec<Entry>, BackupError> {
    let entries: Vec<Entry> = items
        .iter()
        .filter_map(|item| normalize_backup_entry(kind, item, now))
        .collect();

    let invalid = items.len() - entries.len();
    if invalid > 0 {
        return Err(BackupError::InvalidEntries(invalid));
    }

    let mut seen = HashSet::with_capacity(entries.len());
    for entry in &entries {
        if entry.id.is_empty() {
            return Err(BackupError::MissingId);
        }
        if !seen.insert(entry.id.as_str()) {
            return Err(BackupError::DuplicateIds);
        }
    }

    Ok(entries)
}

/// Validates the three collections of a decoded backup.
pub fn parse_backup_collections(
    collections: [Option<&Vec<Value>>; 3],
    now: DateTime<Utc>,
) -> std::result::Result<EntrySet, BackupError> {
    let [Some(journal), Some(learning), Some(resources)] = collections else {
        return Err(BackupError::MissingCollections);
    };
    if journal.len() + learning.len() + resources.len() > MAX_BACKUP_ENTRIES {
        return Err(BackupError::TooManyEntries);
    }

    Ok(EntrySet {
        journal: normalize_collection(EntryKind::Journal, journal, now)?,
        learning: normalize_collection(EntryKind::Learning, learning, now)?,
        resources: normalize_collection(EntryKind::Resources, resources, now)?,
    })
}

/// Validates a backup given as a JSON object.
pub fn parse_backup_value(value: &Value, now: DateTime<Utc>) -> std::result::Result<EntrySet, BackupError> {
    let object: &Map<String, Value> = value.as_object().ok_or(BackupError::MissingCollections)?;
    let collection = |kind: EntryKind| object.get(kind.as_str()).and_then(Value::as_array);
    parse_backup_collections(
        [
            collection(EntryKind::Journal),
            collection(EntryKind::Learning),
            collection(EntryKind::Resources),
        ],
        now,
    )
}

pub fn parse_backup_json(bytes: &[u8], now: DateTime<Utc>) -> std::result::Result<EntrySet, BackupError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|_| BackupError::InvalidJson)?;
    parse_backup_value(&value, now)
}

fn read_member(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> std::result::Result<Option<Vec<Value>>, BackupError> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(_) => return Err(BackupError::InvalidArchive),
    };

    let mut contents = Vec::new();
    file.take(MAX_BACKUP_FILE_BYTES as u64 + 1)
        .read_to_end(&mut contents)
        .map_err(|_| BackupError::InvalidArchive)?;
    if contents.len() > MAX_BACKUP_FILE_BYTES {
        return Err(BackupError::FileTooLarge);
    }

    let value: Value = serde_json::from_slice(&contents).map_err(|_| BackupError::InvalidJson)?;
    match value {
        Value::Array(items) => Ok(Some(items)),
        _ => Ok(None),
    }
}

/// Validates a ZIP backup with one member per collection.
pub fn parse_backup_zip(bytes: &[u8], now: DateTime<Utc>) -> std::result::Result<EntrySet, BackupError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|_| BackupError::InvalidArchive)?;
    let journal = read_member(&mut archive, member_name(EntryKind::Journal))?;
    let learning = read_member(&mut archive, member_name(EntryKind::Learning))?;
    let resources = read_member(&mut archive, member_name(EntryKind::Resources))?;
    parse_backup_collections([journal.as_ref(), learning.as_ref(), resources.as_ref()], now)
}

/// True for uploads that should be read as ZIP archives.
pub fn looks_like_zip(filename: Option<&str>, content_type: Option<&str>, bytes: &[u8]) -> bool {
    filename.is_some_and(|name| name.to_lowercase().ends_with(".zip"))
        || content_type.is_some_and(|ct| ct.starts_with("application/zip"))
        || infer::archive::is_zip(bytes)
}

/// Decodes an uploaded backup file.
pub fn parse_backup_file(
    filename: Option<&str>,
    content_type: Option<&str>,
    bytes: &[u8],
    now: DateTime<Utc>,
) -> std::result::Result<EntrySet, BackupError> {
    if bytes.len() > MAX_BACKUP_FILE_BYTES {
        return Err(BackupError::FileTooLarge);
    }
    if looks_like_zip(filename, content_type, bytes) {
        parse_backup_zip(bytes, now)
    } else {
        parse_backup_json(bytes, now)
    }
}

/// Pretty-printed JSON export.
pub fn encode_json(entries: &EntrySet) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(entries)
        .map_err(|e| AppError::Internal(format!("Backup serialization failed: {}", e)))
}

/// ZIP export with `journal.json`, `learning.json` and `resources.json`.
pub fn encode_zip(entries: &EntrySet) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for kind in EntryKind::ALL {
        let json = serde_json::to_vec_pretty(entries.get(kind))
            .map_err(|e| AppError::Internal(format!("Backup serialization failed: {}", e)))?;
        writer
            .start_file(member_name(kind), options)
            .map_err(|e| AppError::Internal(format!("Backup archive failed: {}", e)))?;
        writer
            .write_all(&json)
            .map_err(|e| AppError::Internal(format!("Backup archive failed: {}", e)))?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| AppError::Internal(format!("Backup archive failed: {}", e)))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn journal(id: &str) -> Value {
        json!({"id": id, "title": "Trade", "content": "Bought", "createdAt": "2025-01-02T03:04:05.000Z"})
    }

    #[test]
    fn valid_backup_keeps_ids_and_timestamps() {
        let payload = json!({
            "journal": [journal("a"), journal("b")],
            "learning": [],
            "resources": [{"id": "r", "title": "Docs", "content": "Read", "url": "https://example.com"}],
        });
        let set = parse_backup_value(&payload, now()).unwrap();
        assert_eq!(set.counts().journal, 2);
        assert_eq!(set.journal[0].id, "a");
        assert_eq!(
            set.journal[0].created_at,
            Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()
        );
        assert_eq!(set.journal[0].updated_at, set.journal[0].created_at);
        assert_eq!(set.resources[0].created_at, now());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let payload = json!({"journal": [journal("a"), journal("a")], "learning": [], "resources": []});
        let err = parse_backup_value(&payload, now()).unwrap_err();
        assert_eq!(err, BackupError::DuplicateIds);
        assert_eq!(err.to_string(), "Backup contains duplicate entry IDs.");
    }

    #[test]
    fn same_id_in_different_collections_is_allowed() {
        let payload = json!({
            "journal": [journal("x")],
            "learning": [{"id": "x", "title": "T", "content": "C"}],
            "resources": [],
        });
        assert!(parse_backup_value(&payload, now()).is_ok());
    }

    #[test]
    fn missing_or_blank_ids_are_rejected() {
        let payload = json!({"journal": [{"title": "T", "content": "C"}], "learning": [], "resources": []});
        assert_eq!(parse_backup_value(&payload, now()), Err(BackupError::MissingId));

        let payload = json!({"journal": [journal("   ")], "learning": [], "resources": []});
        assert_eq!(parse_backup_value(&payload, now()), Err(BackupError::MissingId));
    }

    #[test]
    fn invalid_entries_are_counted() {
        let payload = json!({
            "journal": [],
            "learning": [],
            "resources": [
                {"id": "1", "title": "T", "content": "C", "url": "ftp://nope"},
                {"id": "2", "title": "T", "content": "C"},
                "not an object",
                {"id": "4", "title": "T", "content": "C", "url": "https://ok.example"},
            ],
        });
        let err = parse_backup_value(&payload, now()).unwrap_err();
        assert_eq!(err.to_string(), "Backup contains 3 invalid entries.");
    }

    #[test]
    fn overlong_ids_make_entries_invalid() {
        let payload = json!({"journal": [journal(&"i".repeat(129))], "learning": [], "resources": []});
        assert_eq!(parse_backup_value(&payload, now()), Err(BackupError::InvalidEntries(1)));
    }

    #[test]
    fn shape_errors() {
        assert_eq!(parse_backup_value(&json!([]), now()), Err(BackupError::MissingCollections));
        assert_eq!(
            parse_backup_value(&json!({"journal": [], "learning": []}), now()),
            Err(BackupError::MissingCollections)
        );
        assert_eq!(
            parse_backup_value(&json!({"journal": {}, "learning": [], "resources": []}), now()),
            Err(BackupError::MissingCollections)
        );
        assert_eq!(parse_backup_json(b"{not json", now()), Err(BackupError::InvalidJson));
    }

    #[test]
    fn entry_ceiling_is_enforced() {
        let many: Vec<Value> = (0..=MAX_BACKUP_ENTRIES).map(|i| journal(&i.to_string())).collect();
        let payload = json!({"journal": many, "learning": [], "resources": []});
        let err = parse_backup_value(&payload, now()).unwrap_err();
        assert_eq!(err, BackupError::TooManyEntries);
        assert!(matches!(AppError::from(err), AppError::PayloadTooLarge(_)));
    }

    #[test]
    fn zip_export_round_trips_through_restore() {
        let payload = json!({"journal": [journal("a")], "learning": [], "resources": []});
        let set = parse_backup_value(&payload, now()).unwrap();

        let bytes = encode_zip(&set).unwrap();
        assert!(looks_like_zip(None, None, &bytes));
        let restored = parse_backup_file(Some("upload.bin"), None, &bytes, now()).unwrap();
        assert_eq!(restored, set);
    }

    #[test]
    fn zip_without_a_member_is_a_format_error() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer.start_file("journal.json", SimpleFileOptions::default()).unwrap();
        writer.write_all(b"[]").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        assert_eq!(
            parse_backup_zip(&bytes, now()),
            Err(BackupError::MissingCollections)
        );
    }

    #[test]
    fn json_export_is_pretty_and_keyed() {
        let bytes = encode_json(&EntrySet::default()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains('\n'));
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value, json!({"journal": [], "learning": [], "resources": []}));
    }

    #[test]
    fn oversized_files_are_rejected_before_parsing() {
        let bytes = vec![b' '; MAX_BACKUP_FILE_BYTES + 1];
        assert_eq!(
            parse_backup_file(Some("backup.json"), None, &bytes, now()),
            Err(BackupError::FileTooLarge)
        );
    }
}
