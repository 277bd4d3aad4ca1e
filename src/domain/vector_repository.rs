use async_trait::async_trait;

use crate::domain::document::{EmbeddedChunk, RetrievedChunk};
use crate::error::CounselResult;

#[async_trait]
pub trait VectorRepository: Send + Sync {
    /// Creates the backing collection if it does not exist yet. No-op otherwise.
    async fn ensure_collection(&self) -> CounselResult<()>;

    /// Adds chunk/vector pairs. Chunks with the same content replace each other.
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> CounselResult<()>;

    /// Returns the `k` nearest chunks by the collection's similarity metric.
    async fn query(&self, vector: Vec<f32>, k: usize) -> CounselResult<Vec<RetrievedChunk>>;

    /// Exact number of stored points.
    async fn count(&self) -> CounselResult<u64>;
}
