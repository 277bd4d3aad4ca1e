use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::providers::TextEmbedder;
use crate::error::{CounselError, CounselResult};

/// Local text embedding backed by a fastembed ONNX model.
pub struct EmbeddingGenerator {
    model: Arc<TextEmbedding>,
    dimension: usize,
    batch_size: usize,
}

impl EmbeddingGenerator {
    /// Initializes the model named by its Hugging Face code
    /// (e.g. `BAAI/bge-small-en-v1.5`), downloading it into `cache_dir`
    /// on first use.
    ///
    /// This blocks while the model loads; call it from `spawn_blocking`.
    pub fn new(model_code: &str, cache_dir: Option<PathBuf>, batch_size: usize) -> CounselResult<Self> {
        let (model_name, dimension) = resolve_model(model_code)?;

        let mut opts = InitOptions::new(model_name);
        if let Some(dir) = cache_dir {
            opts = opts.with_cache_dir(dir);
        }
        let model = TextEmbedding::try_new(opts).map_err(|e| {
            CounselError::Configuration(format!("failed to initialize embedding model {}: {}", model_code, e))
        })?;
        log::info!("Embedding model {} ready ({} dimensions).", model_code, dimension);

        Ok(Self {
            model: Arc::new(model),
            dimension,
            batch_size,
        })
    }
}

/// Looks up a supported fastembed model and its output dimension.
pub fn resolve_model(model_code: &str) -> CounselResult<(EmbeddingModel, usize)> {
    TextEmbedding::list_supported_models()
        .into_iter()
        .find(|info| info.model_code.eq_ignore_ascii_case(model_code))
        .map(|info| (info.model, info.dim))
        .ok_or_else(|| CounselError::Configuration(format!("unsupported embedding model: {}", model_code)))
}

#[async_trait]
impl TextEmbedder for EmbeddingGenerator {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: Vec<String>) -> CounselResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = Arc::clone(&self.model);
        let batch_size = self.batch_size;
        let count = texts.len();
        log::debug!("Embedding {} texts.", count);

        let embeddings = tokio::task::spawn_blocking(move || model.embed(texts, Some(batch_size)))
            .await
            .map_err(|e| CounselError::Upstream(format!("embedding task failed: {}", e)))?
            .map_err(|e| {
                log::error!("Embedding model error: {}", e);
                CounselError::Upstream("embedding model failed".to_string())
            })?;

        if embeddings.len() != count {
            return Err(CounselError::Upstream(format!(
                "embedding model returned {} vectors for {} inputs",
                embeddings.len(),
                count
            )));
        }
        Ok(embeddings)
    }
}
