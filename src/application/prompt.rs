use std::fs;
use std::path::Path;

use crate::domain::conversation::ChatMessage;
use crate::domain::document::RetrievedChunk;
use crate::error::{CounselError, CounselResult};

/// Built-in system instruction.
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("system_prompt.md");

const CONTEXT_HEADER: &str = "Context information from the admissions data is below.";
const NO_CONTEXT: &str = "No matching context was found for this question.";

const CONDENSE_PROMPT: &str = "Given the conversation so far and a follow-up message from the student, \
rewrite the follow-up as a standalone question that keeps every detail needed to answer it. \
Reply with the question only.";

/// Loads the system instruction from `path`, or the built-in one.
pub fn load_system_prompt(path: Option<&Path>) -> CounselResult<String> {
    let Some(path) = path else {
        return Ok(DEFAULT_SYSTEM_PROMPT.to_string());
    };
    let prompt = fs::read_to_string(path).map_err(|e| {
        CounselError::Configuration(format!("failed to read system prompt {}: {}", path.display(), e))
    })?;
    if prompt.trim().is_empty() {
        return Err(CounselError::Configuration(format!("system prompt {} is empty", path.display())));
    }
    log::info!("Using system prompt from {}", path.display());
    Ok(prompt)
}

fn chunk_label(chunk: &RetrievedChunk) -> String {
    let mut label = format!("source: {}", chunk.source);
    if let Some(page) = chunk.page {
        label.push_str(&format!(", page {}", page));
    }
    if let Some(section) = &chunk.section {
        label.push_str(&format!(", section {}", section));
    }
    label
}

pub fn context_block(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return format!("{}\n---------------------\n{}\n---------------------", CONTEXT_HEADER, NO_CONTEXT);
    }
    let body = chunks
        .iter()
        .map(|chunk| format!("[{}]\n{}", chunk_label(chunk), chunk.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{}\n---------------------\n{}\n---------------------", CONTEXT_HEADER, body)
}

/// Messages for one answering call: instruction plus context, memory, then
/// the student's query.
pub fn build_messages(
    system_prompt: &str,
    chunks: &[RetrievedChunk],
    memory: Vec<ChatMessage>,
    query: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(memory.len() + 2);
    messages.push(ChatMessage::system(format!(
        "{}\n\n{}",
        system_prompt.trim_end(),
        context_block(chunks)
    )));
    messages.extend(memory);
    messages.push(ChatMessage::user(query));
    messages
}

/// Messages asking the model to turn a follow-up into a standalone question.
pub fn condense_messages(history: &str, query: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(CONDENSE_PROMPT),
        ChatMessage::user(format!(
            "Conversation so far:\n{}\n\nFollow-up message: {}\n\nStandalone question:",
            history, query
        )),
    ]
}
