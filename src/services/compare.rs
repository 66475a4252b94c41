//! Section-level diff between two SOP revisions.
//!
//! DESIGN
//! ======
//! A document is split on numbered headings (`1`, `2.3`, `4.1.2.`), keyed by
//! section number. Each number present in either revision is classified as
//! added, removed, modified or unchanged by comparing normalized heading +
//! body text. Text before the first heading is the preamble, keyed `""`.
//!
//! Numbered list items inside a section look exactly like headings; they
//! are treated as headings. The heuristic trades precision for simplicity.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use super::text::{count_words, normalize};

fn heading_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*(\d+(?:\.\d+)*)\.?\s+(\S.*?)\s*$").expect("heading regex is valid"))
}

// =============================================================================
// TYPES
// =============================================================================

/// One numbered section of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    /// Dotted section number; empty for the preamble.
    pub number: String,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionChange {
    pub number: String,
    /// Title from the revised document when present, else the original.
    pub title: String,
    pub kind: ChangeKind,
    pub original_words: usize,
    pub revised_words: usize,
    /// Signed word-count change from original to revised.
    pub word_delta: i64,
}

impl SectionChange {
    fn new(number: String, title: String, kind: ChangeKind, original_words: usize, revised_words: usize) -> Self {
        let word_delta = i64::try_from(revised_words).unwrap_or(i64::MAX) - i64::try_from(original_words).unwrap_or(i64::MAX);
        Self { number, title, kind, original_words, revised_words, word_delta }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
    pub unchanged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SectionDiff {
    pub changes: Vec<SectionChange>,
    pub summary: DiffSummary,
}

// =============================================================================
// SPLITTING
// =============================================================================

/// Split a document into sections on numbered headings.
///
/// The preamble is emitted only when it contains non-whitespace text. A
/// repeated section number is folded into the first occurrence.
#[must_use]
pub fn split_sections(text: &str) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    let mut current = Section { number: String::new(), title: String::new(), body: String::new() };

    for line in text.lines() {
        if let Some(caps) = heading_regex().captures(line) {
            push_section(&mut sections, current);
            current = Section { number: caps[1].to_string(), title: caps[2].to_string(), body: String::new() };
        } else {
            if !current.body.is_empty() {
                current.body.push('\n');
            }
            current.body.push_str(line);
        }
    }
    push_section(&mut sections, current);
    sections
}

fn push_section(sections: &mut Vec<Section>, section: Section) {
    if section.number.is_empty() && section.body.trim().is_empty() {
        return;
    }
    if let Some(existing) = sections.iter_mut().find(|s| s.number == section.number) {
        if !existing.body.is_empty() && !section.body.is_empty() {
            existing.body.push('\n');
        }
        existing.body.push_str(&section.body);
        return;
    }
    sections.push(section);
}

/// Numeric ordering key: preamble first, then `1 < 1.2 < 2 < 10`.
fn order_key(number: &str) -> Vec<u64> {
    if number.is_empty() {
        return Vec::new();
    }
    number
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(u64::MAX))
        .collect()
}

// =============================================================================
// DIFF
// =============================================================================

/// Sections pair up by their literal number (`1.01` and `1.1` are distinct);
/// the numeric key only orders them.
type SectionPairs = BTreeMap<(Vec<u64>, String), (Option<Section>, Option<Section>)>;

/// Compare two documents section by section.
#[must_use]
pub fn diff_sections(original: &str, revised: &str) -> SectionDiff {
    let mut by_number = SectionPairs::new();
    for section in split_sections(original) {
        let key = (order_key(&section.number), section.number.clone());
        by_number.entry(key).or_default().0 = Some(section);
    }
    for section in split_sections(revised) {
        let key = (order_key(&section.number), section.number.clone());
        by_number.entry(key).or_default().1 = Some(section);
    }

    let mut summary = DiffSummary::default();
    let changes = by_number
        .into_values()
        .filter_map(|pair| {
            let change = match pair {
                (Some(old), Some(new)) => {
                    let same = normalize(&old.title) == normalize(&new.title)
                        && normalize(&old.body) == normalize(&new.body);
                    let kind = if same { ChangeKind::Unchanged } else { ChangeKind::Modified };
                    let (before, after) = (count_words(&old.body), count_words(&new.body));
                    SectionChange::new(new.number, new.title, kind, before, after)
                }
                (Some(old), None) => {
                    let words = count_words(&old.body);
                    SectionChange::new(old.number, old.title, ChangeKind::Removed, words, 0)
                }
                (None, Some(new)) => {
                    let words = count_words(&new.body);
                    SectionChange::new(new.number, new.title, ChangeKind::Added, 0, words)
                }
                (None, None) => return None,
            };
            match change.kind {
                ChangeKind::Added => summary.added += 1,
                ChangeKind::Removed => summary.removed += 1,
                ChangeKind::Modified => summary.modified += 1,
                ChangeKind::Unchanged => summary.unchanged += 1,
            }
            Some(change)
        })
        .collect();

    SectionDiff { changes, summary }
}

#[cfg(test)]
#[path = "compare_test.rs"]
mod tests;
