use super::tokens::{estimate_token_count, tail_within_tokens, truncate_to_tokens};
use crate::domain::document::{Document, DocumentChunk};

/// Configuration for document chunking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum chunk size in estimated tokens
    pub chunk_size: usize,
    /// Tokens carried over from the end of one chunk into the next
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 20,
        }
    }
}

/// Splits documents into token-bounded chunks, in document order.
///
/// Paragraphs are packed greedily; a paragraph too large for one chunk is
/// split on word boundaries. Every chunk after the first of a document starts
/// with the tail of its predecessor.
pub fn chunk_documents(documents: &[Document], config: &ChunkingConfig) -> Vec<DocumentChunk> {
    documents
        .iter()
        .flat_map(|document| chunk_document(document, config))
        .collect()
}

pub fn chunk_document(document: &Document, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let overlap = config.chunk_overlap.min(config.chunk_size.saturating_sub(1));
    let unit_budget = config.chunk_size - overlap;

    let units = split_units(&document.text, unit_budget);
    let mut texts: Vec<String> = Vec::new();
    let mut current = String::new();

    for unit in units {
        let candidate = if current.is_empty() {
            unit.clone()
        } else {
            format!("{}\n\n{}", current, unit)
        };
        if estimate_token_count(&candidate) <= config.chunk_size {
            current = candidate;
            continue;
        }

        let carried = tail_within_tokens(&current, overlap);
        texts.push(std::mem::take(&mut current));
        let with_overlap = format!("{}\n\n{}", carried, unit);
        current = if carried.is_empty() || estimate_token_count(&with_overlap) > config.chunk_size {
            unit
        } else {
            with_overlap
        };
    }
    if !current.trim().is_empty() {
        texts.push(current);
    }

    texts
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| DocumentChunk {
            text,
            source: document.source.clone(),
            page: document.page,
            section: document.section.clone(),
            chunk_index,
        })
        .collect()
}

/// Paragraphs of `text`, with any paragraph over `budget` tokens split into
/// word windows that fit.
fn split_units(text: &str, budget: usize) -> Vec<String> {
    let mut units = Vec::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if estimate_token_count(paragraph) <= budget {
            units.push(paragraph.to_string());
            continue;
        }
        let mut rest: Vec<&str> = paragraph.split_whitespace().collect();
        while !rest.is_empty() {
            let window = truncate_to_tokens(&rest.join(" "), budget);
            // A single word can exceed the budget on its own; keep it whole.
            let taken = window.split_whitespace().count().max(1);
            units.push(rest[..taken].join(" "));
            rest.drain(..taken);
        }
    }
    units
}
