use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three notebook collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Journal,
    Learning,
    Resources,
}

impl EntryKind {
    pub const ALL: [EntryKind; 3] = [EntryKind::Journal, EntryKind::Learning, EntryKind::Resources];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Journal => "journal",
            EntryKind::Learning => "learning",
            EntryKind::Resources => "resources",
        }
    }

    /// Name of the backing SQL table.
    pub fn table(&self) -> &'static str {
        match self {
            EntryKind::Journal => "journal_entries",
            EntryKind::Learning => "learning_entries",
            EntryKind::Resources => "resource_entries",
        }
    }

    /// Name used for audit events, e.g. `journal_entry_created`.
    pub fn audit_noun(&self) -> &'static str {
        match self {
            EntryKind::Journal => "journal_entry",
            EntryKind::Learning => "learning_entry",
            EntryKind::Resources => "resource_entry",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "journal" => Ok(EntryKind::Journal),
            "learning" => Ok(EntryKind::Learning),
            "resources" => Ok(EntryKind::Resources),
            _ => Err(()),
        }
    }
}

/// Trade journal fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalFields {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticker: Option<String>,
}

/// Study goal fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningFields {
    pub title: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
}

/// External resource fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFields {
    pub title: String,
    pub content: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

/// Validated, kind-specific entry content without identity or timestamps.
///
/// Each variant carries exactly the fields of its kind, so a normalized
/// entry can never carry keys that belong to another collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntryInput {
    Journal(JournalFields),
    Learning(LearningFields),
    Resource(ResourceFields),
}

impl EntryInput {
    pub fn kind(&self) -> EntryKind {
        match self {
            EntryInput::Journal(_) => EntryKind::Journal,
            EntryInput::Learning(_) => EntryKind::Learning,
            EntryInput::Resource(_) => EntryKind::Resources,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            EntryInput::Journal(f) => &f.title,
            EntryInput::Learning(f) => &f.title,
            EntryInput::Resource(f) => &f.title,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            EntryInput::Journal(f) => &f.content,
            EntryInput::Learning(f) => &f.content,
            EntryInput::Resource(f) => &f.content,
        }
    }

    pub fn tags(&self) -> &[String] {
        match self {
            EntryInput::Journal(f) => f.tags.as_deref().unwrap_or_default(),
            EntryInput::Resource(f) => f.tags.as_deref().unwrap_or_default(),
            EntryInput::Learning(_) => &[],
        }
    }
}

/// A stored journal, learning or resource record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: String,
    #[serde(flatten)]
    pub fields: EntryInput,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    pub fn kind(&self) -> EntryKind {
        self.fields.kind()
    }
}

/// All three collections, as exported and restored by backups.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntrySet {
    pub journal: Vec<Entry>,
    pub learning: Vec<Entry>,
    pub resources: Vec<Entry>,
}

impl EntrySet {
    pub fn get(&self, kind: EntryKind) -> &Vec<Entry> {
        match kind {
            EntryKind::Journal => &self.journal,
            EntryKind::Learning => &self.learning,
            EntryKind::Resources => &self.resources,
        }
    }

    pub fn get_mut(&mut self, kind: EntryKind) -> &mut Vec<Entry> {
        match kind {
            EntryKind::Journal => &mut self.journal,
            EntryKind::Learning => &mut self.learning,
            EntryKind::Resources => &mut self.resources,
        }
    }

    pub fn total(&self) -> usize {
        self.journal.len() + self.learning.len() + self.resources.len()
    }

    pub fn counts(&self) -> EntryCounts {
        EntryCounts {
            journal: self.journal.len(),
            learning: self.learning.len(),
            resources: self.resources.len(),
        }
    }
}

/// Per-collection entry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntryCounts {
    pub journal: usize,
    pub learning: usize,
    pub resources: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn entry_serializes_flat_camel_case() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let entry = Entry {
            id: "abc".to_string(),
            fields: EntryInput::Learning(LearningFields {
                title: "Options".to_string(),
                content: "Read about greeks".to_string(),
                goal: None,
                next_step: Some("Delta hedging".to_string()),
            }),
            created_at: at,
            updated_at: at,
        };

        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["id"], "abc");
        assert_eq!(value["title"], "Options");
        assert_eq!(value["nextStep"], "Delta hedging");
        assert!(value.get("goal").is_none());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("fields").is_none());
    }

    #[test]
    fn kind_parses_route_segments() {
        assert_eq!("resources".parse::<EntryKind>(), Ok(EntryKind::Resources));
        assert!("stats".parse::<EntryKind>().is_err());
    }
}
