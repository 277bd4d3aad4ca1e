use log::info;
use std::path::Path;
use std::sync::Arc;

use super::chunking::{chunk_documents, ChunkingConfig};
use crate::config::IngestMode;
use crate::domain::document::EmbeddedChunk;
use crate::domain::providers::{DocumentParser, TextEmbedder};
use crate::domain::vector_repository::VectorRepository;
use crate::error::{CounselError, CounselResult};

/// Outcome of one ingestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestionReport {
    pub documents: usize,
    pub chunks: usize,
    /// True when the collection was already populated and left as is.
    pub skipped: bool,
}

/// Parses the knowledge source, chunks and embeds it, and loads the vectors
/// into the store.
pub struct IngestionService {
    parser: Arc<dyn DocumentParser>,
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorRepository>,
    chunking: ChunkingConfig,
    batch_size: usize,
}

impl IngestionService {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        embedder: Arc<dyn TextEmbedder>,
        store: Arc<dyn VectorRepository>,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Self {
        Self {
            parser,
            embedder,
            store,
            chunking,
            batch_size: batch_size.max(1),
        }
    }

    pub async fn ingest(&self, source: &Path, mode: IngestMode) -> CounselResult<IngestionReport> {
        if !source.exists() {
            return Err(CounselError::Configuration(format!("data file not found at {}", source.display())));
        }

        self.store.ensure_collection().await?;
        if mode == IngestMode::Reuse {
            let existing = self.store.count().await?;
            if existing > 0 {
                info!("Collection already holds {} points, skipping ingestion.", existing);
                return Ok(IngestionReport { skipped: true, ..Default::default() });
            }
        }

        info!("Parsing knowledge source {}...", source.display());
        let documents = self.parser.parse(source).await?;
        if documents.is_empty() {
            return Err(CounselError::Data("No data could be extracted from the file.".to_string()));
        }

        let chunks = chunk_documents(&documents, &self.chunking);
        if chunks.is_empty() {
            return Err(CounselError::Data("No data could be extracted from the file.".to_string()));
        }
        info!("Split {} documents into {} chunks.", documents.len(), chunks.len());

        // Embed and store batch by batch
        for (i, batch) in chunks.chunks(self.batch_size).enumerate() {
            let texts = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed(texts).await?;
            if vectors.len() != batch.len() {
                return Err(CounselError::Upstream(format!(
                    "embedding model returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }
            let embedded: Vec<EmbeddedChunk> = batch
                .iter()
                .cloned()
                .zip(vectors)
                .map(|(chunk, vector)| EmbeddedChunk { chunk, vector })
                .collect();
            self.store.upsert(&embedded).await?;
            log::debug!("Upserted batch {} ({} chunks)", i + 1, embedded.len());
        }

        info!("Ingestion complete: {} documents, {} chunks.", documents.len(), chunks.len());
        Ok(IngestionReport {
            documents: documents.len(),
            chunks: chunks.len(),
            skipped: false,
        })
    }
}
