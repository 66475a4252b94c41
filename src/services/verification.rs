//! Verification heuristic for generated course content.
//!
//! Compares the word count of the generated course against the source
//! document, checks that the course title appears in the output, and lists
//! numbered source sections whose headings never show up.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::compare::split_sections;
use super::text::{count_words, normalize};

/// Coverage below this ratio fails verification.
pub const FAIL_RATIO: f64 = 0.5;
/// Coverage below this ratio (and at or above [`FAIL_RATIO`]) warns.
pub const WARN_RATIO: f64 = 0.8;
/// Sources shorter than this fail outright.
pub const MIN_SOURCE_WORDS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Pass,
    Warning,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    pub source_word_count: usize,
    pub generated_word_count: usize,
    /// `generated_word_count / source_word_count`; 0 for an empty source.
    pub coverage_ratio: f64,
    pub title_present: bool,
    /// Numbered source headings (`"2.1 Exceptions"`) absent from the output.
    pub missing_sections: Vec<String>,
    pub issues: Vec<String>,
}

/// Flatten every string value of a JSON document, depth first, separated by
/// newlines. Object keys are not included.
#[must_use]
pub fn generated_text(value: &Value) -> String {
    fn walk(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::String(s) => out.push(s.clone()),
            Value::Array(items) => items.iter().for_each(|v| walk(v, out)),
            Value::Object(map) => map.values().for_each(|v| walk(v, out)),
            Value::Null | Value::Bool(_) | Value::Number(_) => {}
        }
    }
    let mut parts = Vec::new();
    walk(value, &mut parts);
    parts.join("\n")
}

/// Classify a coverage ratio against the fixed thresholds.
#[must_use]
pub fn status_for_ratio(ratio: f64) -> VerificationStatus {
    if ratio < FAIL_RATIO {
        VerificationStatus::Fail
    } else if ratio < WARN_RATIO {
        VerificationStatus::Warning
    } else {
        VerificationStatus::Pass
    }
}

/// Verify generated course content against its source document.
#[must_use]
pub fn verify(title: &str, source_text: &str, generated: &Value) -> VerificationReport {
    let generated_plain = generated_text(generated);
    let generated_norm = normalize(&generated_plain);
    let source_word_count = count_words(source_text);
    let generated_word_count = count_words(&generated_plain);
    let mut issues = Vec::new();

    let coverage_ratio = if source_word_count == 0 {
        0.0
    } else {
        generated_word_count as f64 / source_word_count as f64
    };

    let mut status = if source_word_count < MIN_SOURCE_WORDS {
        issues.push("source document is empty".to_string());
        VerificationStatus::Fail
    } else {
        let status = status_for_ratio(coverage_ratio);
        if status != VerificationStatus::Pass {
            issues.push(format!(
                "generated content covers {:.0}% of the source word count (expected at least {:.0}%)",
                coverage_ratio * 100.0,
                WARN_RATIO * 100.0
            ));
        }
        status
    };

    let title_norm = normalize(title);
    let title_present = !title_norm.is_empty() && generated_norm.contains(&title_norm);
    if !title_present {
        issues.push("course title does not appear in the generated content".to_string());
        if status == VerificationStatus::Pass {
            status = VerificationStatus::Warning;
        }
    }

    let missing_sections: Vec<String> = split_sections(source_text)
        .into_iter()
        .filter(|s| !s.number.is_empty())
        .filter(|s| {
            let heading = normalize(&s.title);
            !heading.is_empty() && !generated_norm.contains(&heading)
        })
        .map(|s| format!("{} {}", s.number, s.title))
        .collect();
    if !missing_sections.is_empty() {
        issues.push(format!("{} source section(s) not referenced in the generated content", missing_sections.len()));
    }

    VerificationReport {
        status,
        source_word_count,
        generated_word_count,
        coverage_ratio,
        title_present,
        missing_sections,
        issues,
    }
}

#[cfg(test)]
#[path = "verification_test.rs"]
mod tests;
