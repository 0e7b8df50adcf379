use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::models::entry::{Entry, EntryCounts, EntryInput, EntrySet};

const TOP_TAGS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeCounts {
    pub win: usize,
    pub loss: usize,
    pub flat: usize,
    pub open: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookStats {
    pub totals: EntryCounts,
    pub outcomes: OutcomeCounts,
    pub daily_journal: Vec<DailyCount>,
    pub activity: Vec<DailyCount>,
    pub top_tags: Vec<TagCount>,
}

fn daily_counts<'a>(entries: impl Iterator<Item = &'a Entry>) -> Vec<DailyCount> {
    let mut by_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
    for entry in entries {
        *by_day.entry(entry.created_at.date_naive()).or_default() += 1;
    }
    by_day
        .into_iter()
        .map(|(date, count)| DailyCount { date, count })
        .collect()
}

fn bucket_outcome(outcomes: &mut OutcomeCounts, outcome: Option<&str>) {
    let outcome = outcome.unwrap_or("open").to_lowercase();
    if outcome.contains("win") {
        outcomes.win += 1;
    } else if outcome.contains("loss") {
        outcomes.loss += 1;
    } else if outcome.contains("flat") {
        outcomes.flat += 1;
    } else {
        outcomes.open += 1;
    }
}

/// Summarizes all entries for the analytics panel.
pub fn compute_stats(entries: &EntrySet) -> NotebookStats {
    let mut outcomes = OutcomeCounts::default();
    for entry in &entries.journal {
        if let EntryInput::Journal(fields) = &entry.fields {
            bucket_outcome(&mut outcomes, fields.outcome.as_deref());
        }
    }

    let mut tag_counts: HashMap<&str, usize> = HashMap::new();
    for entry in entries.journal.iter().chain(&entries.resources) {
        for tag in entry.fields.tags() {
            *tag_counts.entry(tag.as_str()).or_default() += 1;
        }
    }
    let mut top_tags: Vec<TagCount> = tag_counts
        .into_iter()
        .map(|(tag, count)| TagCount {
            tag: tag.to_string(),
            count,
        })
        .collect();
    top_tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    top_tags.truncate(TOP_TAGS);

    NotebookStats {
        totals: entries.counts(),
        outcomes,
        daily_journal: daily_counts(entries.journal.iter()),
        activity: daily_counts(
            entries
                .journal
                .iter()
                .chain(&entries.learning)
                .chain(&entries.resources),
        ),
        top_tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entry::{JournalFields, LearningFields};
    use chrono::{TimeZone, Utc};

    fn journal(day: u32, outcome: Option<&str>, tags: &[&str]) -> Entry {
        let at = Utc.with_ymd_and_hms(2025, 1, day, 12, 0, 0).unwrap();
        Entry {
            id: format!("j{day}-{}", outcome.unwrap_or("none")),
            fields: EntryInput::Journal(JournalFields {
                title: "t".to_string(),
                content: "c".to_string(),
                outcome: outcome.map(str::to_string),
                emotion: None,
                tags: (!tags.is_empty()).then(|| tags.iter().map(|t| t.to_string()).collect()),
                ticker: None,
            }),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn buckets_outcomes_by_substring() {
        let entries = EntrySet {
            journal: vec![
                journal(1, Some("Big WIN"), &[]),
                journal(1, Some("small loss"), &[]),
                journal(2, Some("flat-ish"), &[]),
                journal(2, Some("pending"), &[]),
                journal(3, None, &[]),
            ],
            ..Default::default()
        };
        let stats = compute_stats(&entries);
        assert_eq!(
            stats.outcomes,
            OutcomeCounts { win: 1, loss: 1, flat: 1, open: 2 }
        );
        assert_eq!(stats.daily_journal.len(), 3);
        assert_eq!(stats.daily_journal[0].count, 2);
    }

    #[test]
    fn activity_spans_all_kinds_and_top_tags_break_ties_alphabetically() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 8, 0, 0).unwrap();
        let learning = Entry {
            id: "l1".to_string(),
            fields: EntryInput::Learning(LearningFields {
                title: "t".to_string(),
                content: "c".to_string(),
                goal: None,
                next_step: None,
            }),
            created_at: at,
            updated_at: at,
        };
        let entries = EntrySet {
            journal: vec![journal(1, None, &["macro", "value"]), journal(2, None, &["value"])],
            learning: vec![learning],
            resources: vec![],
        };
        let stats = compute_stats(&entries);

        assert_eq!(stats.activity[0].count, 2);
        assert_eq!(stats.totals.learning, 1);
        let tags: Vec<(&str, usize)> = stats
            .top_tags
            .iter()
            .map(|t| (t.tag.as_str(), t.count))
            .collect();
        assert_eq!(tags, vec![("value", 2), ("macro", 1)]);
    }

    #[test]
    fn top_tags_are_capped() {
        let tags: Vec<String> = (0..12).map(|i| format!("t{i:02}")).collect();
        let refs: Vec<&str> = tags.iter().map(String::as_str).collect();
        let entries = EntrySet {
            journal: vec![journal(1, None, &refs)],
            ..Default::default()
        };
        let stats = compute_stats(&entries);
        assert_eq!(stats.top_tags.len(), TOP_TAGS);
        assert_eq!(stats.top_tags[0].tag, "t00");
    }
}
