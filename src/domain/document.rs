use serde::{Deserialize, Serialize};

/// A unit of knowledge-base text produced by a parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    /// File the text came from (file name, not full path).
    pub source: String,
    /// 1-based page (or sheet) number when the parser reports pages.
    pub page: Option<usize>,
    pub section: Option<String>,
}

impl Document {
    pub fn new(text: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: source.into(),
            page: None,
            section: None,
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
}

/// A token-bounded slice of a [`Document`], ready to be embedded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    pub source: String,
    pub page: Option<usize>,
    pub section: Option<String>,
    pub chunk_index: usize,
}

/// A chunk paired with its embedding, as handed to the vector store.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedChunk {
    pub chunk: DocumentChunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub source: String,
    pub page: Option<usize>,
    pub section: Option<String>,
    pub score: f32,
}
