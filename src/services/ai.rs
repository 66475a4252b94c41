//! AI service — operation dispatch, prompt building, JSON extraction.
//!
//! DESIGN
//! ======
//! `/api/ai` accepts a JSON body tagged by `operation`. Each operation builds
//! a system prompt plus one user message, sends it through the shared
//! `LlmChat` handle (already wrapped in retry), and parses the model's text
//! as JSON. `chat` is the one operation whose reply is returned as text.
//!
//! Source text is wrapped in `<document>` tags so the model can tell
//! instructions apart from user-provided content.

use std::fmt::Write;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::compare::{SectionDiff, diff_sections};
use super::course::{self, Course, CourseError};
use super::verification;
use crate::error::ErrorCode;
use crate::llm::LlmChat;
use crate::llm::types::{LlmError, Message};

pub const DEFAULT_QUESTION_COUNT: u32 = 10;
pub const MAX_QUESTION_COUNT: u32 = 50;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("AI API key not configured")]
    LlmNotConfigured,
    #[error("document is empty: no text to process")]
    EmptyDocument,
    #[error("invalid AI request: {0}")]
    InvalidRequest(String),
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
    #[error("failed to parse AI response: {0}")]
    MalformedOutput(String),
}

impl ErrorCode for AiError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::LlmNotConfigured => "E_LLM_NOT_CONFIGURED",
            Self::EmptyDocument => "E_EMPTY_DOCUMENT",
            Self::InvalidRequest(_) => "E_INVALID_REQUEST",
            Self::Llm(_) => "E_LLM_ERROR",
            Self::MalformedOutput(_) => "E_MALFORMED_OUTPUT",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Llm(e) if e.retryable()) || matches!(self, Self::MalformedOutput(_))
    }
}

/// One prior turn of a chat conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Request body for `/api/ai`, tagged by `operation`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum AiRequest {
    ExtractFacts {
        content: String,
    },
    GenerateQuestions {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        facts: Option<Vec<Value>>,
        #[serde(default)]
        count: Option<u32>,
    },
    GenerateModules {
        content: String,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        config: Option<Value>,
    },
    Search {
        query: String,
        content: String,
    },
    Chat {
        messages: Vec<ChatTurn>,
        #[serde(default)]
        context: Option<String>,
    },
    CompareSops {
        original: String,
        revised: String,
    },
}

impl AiRequest {
    /// Parse a raw request body. Unknown operations and missing fields are
    /// reported as [`AiError::InvalidRequest`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` if the body does not describe a known operation.
    pub fn from_value(body: Value) -> Result<Self, AiError> {
        serde_json::from_value(body).map_err(|e| AiError::InvalidRequest(e.to_string()))
    }

    #[must_use]
    pub fn operation(&self) -> &'static str {
        match self {
            Self::ExtractFacts { .. } => "extract-facts",
            Self::GenerateQuestions { .. } => "generate-questions",
            Self::GenerateModules { .. } => "generate-modules",
            Self::Search { .. } => "search",
            Self::Chat { .. } => "chat",
            Self::CompareSops { .. } => "compare-sops",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Response envelope for `/api/ai`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiResponse {
    pub operation: &'static str,
    pub result: Value,
    pub model: String,
    pub usage: Usage,
}

/// A fully built prompt, ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Prompt {
    pub system: String,
    pub messages: Vec<Message>,
    /// Reply is parsed as JSON when true, returned as `{reply}` otherwise.
    pub expects_json: bool,
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Run one AI operation.
///
/// # Errors
///
/// Returns a validation error before any model call, an LLM error after
/// retries are exhausted, or `MalformedOutput` when the reply holds no JSON.
pub async fn run(llm: Option<&Arc<dyn LlmChat>>, max_tokens: u32, request: &AiRequest) -> Result<AiResponse, AiError> {
    let llm = llm.ok_or(AiError::LlmNotConfigured)?;
    let operation = request.operation();
    let prompt = build_prompt(request)?;
    info!(operation, "ai: request received");

    let response = llm.chat(max_tokens, &prompt.system, &prompt.messages).await?;
    let text = response.text();
    let usage = Usage { input_tokens: response.input_tokens, output_tokens: response.output_tokens };

    let result = if prompt.expects_json {
        let parsed = extract_json(&text).inspect_err(|e| warn!(operation, error = %e, "ai: unparseable reply"))?;
        shape_result(request, parsed)
    } else {
        json!({ "reply": text.trim() })
    };

    info!(
        operation,
        model = %response.model,
        input_tokens = usage.input_tokens,
        output_tokens = usage.output_tokens,
        "ai: request complete"
    );
    Ok(AiResponse { operation, result, model: response.model, usage })
}

// =============================================================================
// COURSE-BOUND GENERATION
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Course(#[from] CourseError),
    #[error(transparent)]
    Ai(#[from] AiError),
}

impl ErrorCode for GenerateError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Course(e) => e.error_code(),
            Self::Ai(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Course(e) => e.retryable(),
            Self::Ai(e) => e.retryable(),
        }
    }
}

/// Generate modules from a stored course's source text, verify them, and
/// store both. The course ends up `generated`.
///
/// # Errors
///
/// Fails if the course cannot be generated (missing, cleared, no source), or
/// if the model call or its parsing fails. Nothing is stored on failure.
pub async fn generate_course(
    pool: &PgPool,
    llm: Option<&Arc<dyn LlmChat>>,
    max_tokens: u32,
    course_id: Uuid,
) -> Result<Course, GenerateError> {
    if llm.is_none() {
        return Err(AiError::LlmNotConfigured.into());
    }
    let course = course::get_course(pool, course_id).await?;
    let source = course.usable_source()?;

    let request = AiRequest::GenerateModules {
        content: source.to_string(),
        title: Some(course.title.clone()),
        config: Some(course.config.clone()),
    };
    let response = run(llm, max_tokens, &request).await?;
    let report = verification::verify(&course.title, source, &response.result);
    info!(course_id = %course_id, status = ?report.status, "ai: course generated");

    Ok(course::store_generation(pool, course_id, &response.result, &report).await?)
}

// =============================================================================
// PROMPTS
// =============================================================================

const EXTRACT_FACTS_PROMPT: &str = "\
You extract training facts from standard operating procedures.
Return ONLY a JSON object of the form
{\"facts\": [{\"fact\": string, \"category\": string, \"source_section\": string}]}.
Each fact is one self-contained statement a trainee must know. `category` is one of
\"procedure\", \"safety\", \"compliance\", \"definition\", \"responsibility\".
`source_section` is the section number or heading the fact came from, or \"\" if unknown.
Do not invent facts that are not in the document.";

const GENERATE_QUESTIONS_PROMPT: &str = "\
You write multiple-choice assessment questions for workplace training.
Return ONLY a JSON object of the form
{\"questions\": [{\"question\": string, \"options\": [string], \"correct_index\": number, \"explanation\": string}]}.
Every question has exactly four options and one correct answer; `correct_index` is zero-based.
Questions must be answerable from the provided material alone.";

const GENERATE_MODULES_PROMPT: &str = "\
You turn standard operating procedures into structured training courses.
Return ONLY a JSON object of the form
{\"title\": string, \"modules\": [{\"title\": string, \"objectives\": [string], \"content\": string, \"key_points\": [string]}]}.
Cover every section of the document. Keep the wording faithful to the source; do not
drop steps, warnings or responsibilities. Include the course title verbatim in `title`.";

const SEARCH_PROMPT: &str = "\
You search standard operating procedures for passages relevant to a query.
Return ONLY a JSON object of the form
{\"results\": [{\"excerpt\": string, \"relevance\": number, \"section\": string}]}.
`excerpt` is quoted verbatim from the document, `relevance` is between 0 and 1,
results are ordered by relevance. Return an empty list when nothing matches.";

const CHAT_PROMPT: &str = "\
You are a training assistant answering questions about standard operating procedures.
Answer concisely and only from the provided context. If the context does not contain
the answer, say so.";

const COMPARE_SOPS_PROMPT: &str = "\
You review revisions of standard operating procedures.
You receive the original document, the revised document and a section-level diff.
Return ONLY a JSON object of the form
{\"summary\": string, \"significant_changes\": [{\"section\": string, \"change\": string, \"impact\": string}],
\"training_impact\": string, \"retraining_required\": boolean}.";

fn document(content: &str) -> String {
    format!("<document>\n{}\n</document>", content.trim())
}

fn require_text(content: &str) -> Result<&str, AiError> {
    if content.trim().is_empty() { Err(AiError::EmptyDocument) } else { Ok(content) }
}

/// Clamp a requested question count into `1..=MAX_QUESTION_COUNT`.
#[must_use]
pub fn question_count(requested: Option<u32>) -> u32 {
    requested.unwrap_or(DEFAULT_QUESTION_COUNT).clamp(1, MAX_QUESTION_COUNT)
}

/// Validate a request and build its prompt. No model call is made.
pub(crate) fn build_prompt(request: &AiRequest) -> Result<Prompt, AiError> {
    let prompt = match request {
        AiRequest::ExtractFacts { content } => Prompt {
            system: EXTRACT_FACTS_PROMPT.to_string(),
            messages: vec![Message::user(document(require_text(content)?))],
            expects_json: true,
        },
        AiRequest::GenerateQuestions { content, facts, count } => {
            let count = question_count(*count);
            let material = match (facts.as_deref(), content.as_deref()) {
                (Some(facts), _) if !facts.is_empty() => {
                    let facts = serde_json::to_string_pretty(facts).map_err(|e| AiError::InvalidRequest(e.to_string()))?;
                    format!("<facts>\n{facts}\n</facts>")
                }
                (_, Some(content)) => document(require_text(content)?),
                (Some(_), None) => return Err(AiError::EmptyDocument),
                (None, None) => {
                    return Err(AiError::InvalidRequest("generate-questions needs `content` or `facts`".into()));
                }
            };
            Prompt {
                system: GENERATE_QUESTIONS_PROMPT.to_string(),
                messages: vec![Message::user(format!("Write exactly {count} questions.\n\n{material}"))],
                expects_json: true,
            }
        }
        AiRequest::GenerateModules { content, title, config } => {
            let mut user = String::new();
            if let Some(title) = title.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                let _ = writeln!(user, "Course title: {title}");
            }
            if let Some(config) = config.as_ref().filter(|c| c.as_object().is_some_and(|m| !m.is_empty())) {
                let _ = writeln!(user, "Course configuration: {config}");
            }
            if !user.is_empty() {
                user.push('\n');
            }
            user.push_str(&document(require_text(content)?));
            Prompt { system: GENERATE_MODULES_PROMPT.to_string(), messages: vec![Message::user(user)], expects_json: true }
        }
        AiRequest::Search { query, content } => {
            let query = query.trim();
            if query.is_empty() {
                return Err(AiError::InvalidRequest("search query must not be empty".into()));
            }
            let content = document(require_text(content)?);
            Prompt {
                system: SEARCH_PROMPT.to_string(),
                messages: vec![Message::user(format!("Query: {query}\n\n{content}"))],
                expects_json: true,
            }
        }
        AiRequest::Chat { messages, context } => build_chat(messages, context.as_deref())?,
        AiRequest::CompareSops { original, revised } => {
            let diff = diff_sections(require_text(original)?, require_text(revised)?);
            Prompt {
                system: COMPARE_SOPS_PROMPT.to_string(),
                messages: vec![Message::user(compare_message(original, revised, &diff)?)],
                expects_json: true,
            }
        }
    };
    Ok(prompt)
}

fn build_chat(turns: &[ChatTurn], context: Option<&str>) -> Result<Prompt, AiError> {
    if turns.is_empty() {
        return Err(AiError::InvalidRequest("chat needs at least one message".into()));
    }
    let mut messages = Vec::with_capacity(turns.len());
    for turn in turns {
        let message = match turn.role.as_str() {
            "user" => Message::user(turn.content.clone()),
            "assistant" => Message::assistant(turn.content.clone()),
            other => return Err(AiError::InvalidRequest(format!("unsupported chat role '{other}'"))),
        };
        messages.push(message);
    }
    if messages.last().is_some_and(|m| m.role != "user") {
        return Err(AiError::InvalidRequest("last chat message must come from the user".into()));
    }

    let mut system = CHAT_PROMPT.to_string();
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        system.push_str("\n\n");
        system.push_str(&document(context));
    }
    Ok(Prompt { system, messages, expects_json: false })
}

fn compare_message(original: &str, revised: &str, diff: &SectionDiff) -> Result<String, AiError> {
    let diff = serde_json::to_string_pretty(diff).map_err(|e| AiError::InvalidRequest(e.to_string()))?;
    Ok(format!(
        "<original>\n{}\n</original>\n\n<revised>\n{}\n</revised>\n\n<section_diff>\n{diff}\n</section_diff>",
        original.trim(),
        revised.trim()
    ))
}

/// Normalize a parsed reply into the documented result shape. Bare arrays
/// are wrapped under the operation's list key; `compare-sops` gains the
/// locally computed section diff.
fn shape_result(request: &AiRequest, parsed: Value) -> Value {
    let list_key = match request {
        AiRequest::ExtractFacts { .. } => Some("facts"),
        AiRequest::GenerateQuestions { .. } => Some("questions"),
        AiRequest::GenerateModules { .. } => Some("modules"),
        AiRequest::Search { .. } => Some("results"),
        AiRequest::Chat { .. } | AiRequest::CompareSops { .. } => None,
    };
    match (request, list_key, parsed) {
        (AiRequest::CompareSops { original, revised }, _, analysis) => {
            json!({ "diff": diff_sections(original, revised), "analysis": analysis })
        }
        (_, Some(key), Value::Array(items)) => {
            let mut wrapped = serde_json::Map::new();
            wrapped.insert(key.to_string(), Value::Array(items));
            Value::Object(wrapped)
        }
        (_, _, other) => other,
    }
}

// =============================================================================
// JSON EXTRACTION
// =============================================================================

/// Candidate start positions tried before giving up.
const MAX_JSON_CANDIDATES: usize = 16;

/// Pull the largest JSON object or array out of a model reply.
///
/// Accepts bare JSON, JSON inside a Markdown code fence, and JSON preceded or
/// followed by prose. Prose often carries small bracketed fragments such as
/// `[1]`, so the longest parsed value wins rather than the first.
///
/// # Errors
///
/// Returns `MalformedOutput` if no object or array can be parsed.
pub fn extract_json(text: &str) -> Result<Value, AiError> {
    let body = strip_code_fence(text).unwrap_or(text).trim();
    if body.is_empty() {
        return Err(AiError::MalformedOutput("empty reply".into()));
    }

    let mut best: Option<(usize, Value)> = None;
    let mut covered_until = 0;
    let mut tried = 0;
    for (start, _) in body.match_indices(['{', '[']) {
        // Starts inside an already parsed value are nested fragments of it.
        if start < covered_until {
            continue;
        }
        if tried == MAX_JSON_CANDIDATES {
            break;
        }
        tried += 1;

        let mut stream = serde_json::Deserializer::from_str(&body[start..]).into_iter::<Value>();
        if let Some(Ok(value)) = stream.next()
            && (value.is_object() || value.is_array())
        {
            let len = stream.byte_offset();
            covered_until = start + len;
            if best.as_ref().is_none_or(|(best_len, _)| len > *best_len) {
                best = Some((len, value));
            }
        }
    }
    best.map(|(_, value)| value)
        .ok_or_else(|| AiError::MalformedOutput("reply contains no JSON object".into()))
}

/// Contents of the first fenced block (```` ``` ```` or ```` ```json ````).
fn strip_code_fence(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_open = &text[open + 3..];
    let body_start = after_open.find('\n')? + 1;
    let body = &after_open[body_start..];
    let close = body.find("```")?;
    Some(&body[..close])
}

#[cfg(test)]
#[path = "ai_test.rs"]
mod tests;
