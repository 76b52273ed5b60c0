use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// Answer used when a request is rejected before any work is done.
pub const EMPTY_QUERY_APOLOGY: &str = "Sorry, I could not process an empty question.";

/// Answer used when generation fails in a way the provider could not report in-band.
pub const GENERATION_FAILURE_APOLOGY: &str =
    "Sorry, an error occurred while generating the response.";

#[derive(Deserialize, Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HistoryMessage {
    pub role: MessageRole,
    pub content: String,
}

impl HistoryMessage {
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub history: Vec<HistoryMessage>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: session_id.into(),
            history: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_history(mut self, history: Vec<HistoryMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn has_query(&self) -> bool {
        !self.query.trim().is_empty()
    }
}

#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub struct SourceDocument {
    pub filename: String,
    pub page_number: u32,
    pub snippet: String,
    pub score: f32,
}

/// One element of a chat response stream.
///
/// Intermediate chunks carry a fragment of generated text. The terminal chunk
/// (`is_final == true`) carries the retrieval sources and the total processing time.
#[derive(Deserialize, Debug, Clone, Serialize, PartialEq)]
pub struct ChatResponseChunk {
    pub answer: String,
    pub source_documents: Vec<SourceDocument>,
    pub processing_time_ms: f64,
    pub is_final: bool,
}

impl ChatResponseChunk {
    pub fn fragment(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            source_documents: Vec::new(),
            processing_time_ms: 0.0,
            is_final: false,
        }
    }

    pub fn terminal(source_documents: Vec<SourceDocument>, elapsed: Duration) -> Self {
        Self {
            answer: String::new(),
            source_documents,
            processing_time_ms: elapsed.as_secs_f64() * 1000.0,
            is_final: true,
        }
    }

    /// Terminal chunk for a short-circuited request; carries no sources or timing.
    pub fn apology(message: impl Into<String>) -> Self {
        Self {
            answer: message.into(),
            source_documents: Vec::new(),
            processing_time_ms: 0.0,
            is_final: true,
        }
    }
}
