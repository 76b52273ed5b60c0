//! Prompt assembly shared by every generation backend.

use common::types::HistoryMessage;

use crate::GenerationRequest;

pub const SYSTEM_PROMPT: &str = "You are a helpful and precise AI assistant. \
Your task is to answer the user's question based ONLY on the provided context. \
If the answer is not present in the context, state that you do not have enough information. \
Do not fabricate information or use outside knowledge unless explicitly asked.";

pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub fn format_context(context_docs: &[String]) -> String {
    context_docs.join(CONTEXT_SEPARATOR)
}

pub fn build_user_prompt(query: &str, context_docs: &[String]) -> String {
    format!(
        "Please answer the question based on the following context:\n\nCONTEXT:\n{}\n\nQUESTION: {query}",
        format_context(context_docs)
    )
}

/// Backend-neutral conversation: history first, then the grounded user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt<'a> {
    pub system: &'static str,
    pub history: &'a [HistoryMessage],
    pub user: String,
}

impl<'a> Prompt<'a> {
    pub fn from_request(request: &'a GenerationRequest) -> Self {
        Self {
            system: SYSTEM_PROMPT,
            history: &request.history,
            user: build_user_prompt(&request.query, &request.context_docs),
        }
    }
}
