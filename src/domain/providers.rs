//! Capability traits for the external collaborators: parsing service,
//! embedding model, hosted language model and speech recognition.

use async_trait::async_trait;
use std::path::Path;

use crate::domain::conversation::ChatMessage;
use crate::domain::document::Document;
use crate::error::CounselResult;

/// Turns a knowledge source file into documents.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, path: &Path) -> CounselResult<Vec<Document>>;
}

/// Produces fixed-dimension embeddings for arbitrary text.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    fn dimension(&self) -> usize;

    async fn embed(&self, texts: Vec<String>) -> CounselResult<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> CounselResult<Vec<f32>> {
        self.embed(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| crate::error::CounselError::Upstream("embedding model returned no vector".to_string()))
    }
}

/// A hosted chat-completion model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> CounselResult<String>;
}

/// An uploaded audio clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: Option<String>,
}

/// Converts speech to text. Stateless.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    async fn transcribe(&self, clip: AudioClip) -> CounselResult<String>;
}
