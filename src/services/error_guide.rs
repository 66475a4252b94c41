//! Map raw error messages to user-facing guidance.
//!
//! Matching is a case-insensitive whole-word search over a fixed phrase list,
//! checked in category order. The first category with a matching phrase wins.
//! Phrases never match inside a longer token, so ids embedded in a message
//! (`course not found: 5f3e4010-...`) cannot trigger a category.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    MissingApiKey,
    ParseFailure,
    ConnectionFailure,
    EmptyDocument,
    Unknown,
}

/// Canned title/message/suggestion for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorGuide {
    pub category: ErrorCategory,
    pub title: &'static str,
    pub message: &'static str,
    pub suggestion: &'static str,
}

const RULES: &[(ErrorCategory, &str)] = &[
    (ErrorCategory::MissingApiKey, r"api[ _]key|not configured|unauthorized|401"),
    (ErrorCategory::ParseFailure, r"parse|parsing|json|unexpected token|malformed"),
    (ErrorCategory::ConnectionFailure, r"network|connection|timed out|timeout|fetch|econn\w*|etimedout"),
    (ErrorCategory::EmptyDocument, r"empty|no content|no text"),
];

fn rules() -> &'static [(ErrorCategory, Regex)] {
    static COMPILED: OnceLock<Vec<(ErrorCategory, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|(category, phrases)| {
                let re = Regex::new(&format!(r"(?i)\b(?:{phrases})\b")).expect("error guide phrase table is valid");
                (*category, re)
            })
            .collect()
    })
}

/// Categorize an error message.
#[must_use]
pub fn categorize(message: &str) -> ErrorGuide {
    let category = rules()
        .iter()
        .find(|(_, re)| re.is_match(message))
        .map_or(ErrorCategory::Unknown, |(category, _)| *category);
    guide_for(category)
}

#[must_use]
pub fn guide_for(category: ErrorCategory) -> ErrorGuide {
    let (title, message, suggestion) = match category {
        ErrorCategory::MissingApiKey => (
            "AI service not configured",
            "The AI provider rejected the request or no API key is configured.",
            "Ask an administrator to set the AI provider API key and try again.",
        ),
        ErrorCategory::ParseFailure => (
            "Could not read the AI response",
            "The AI service returned content that could not be interpreted.",
            "Try the operation again. Shorter or simpler source documents parse more reliably.",
        ),
        ErrorCategory::ConnectionFailure => (
            "Connection problem",
            "The AI service could not be reached.",
            "Check your network connection and retry in a moment.",
        ),
        ErrorCategory::EmptyDocument => (
            "Document is empty",
            "No readable text was found in the document.",
            "Upload a document that contains text, or paste the extracted text directly.",
        ),
        ErrorCategory::Unknown => (
            "Something went wrong",
            "An unexpected error occurred.",
            "Try again. If the problem persists, contact support.",
        ),
    };
    ErrorGuide { category, title, message, suggestion }
}

#[cfg(test)]
#[path = "error_guide_test.rs"]
mod tests;
