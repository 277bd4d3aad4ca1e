use crate::application::answering_service::AnsweringServiceImpl;
use crate::application::chunking::ChunkingConfig;
use crate::application::ingestion_service::{IngestionReport, IngestionService};
use crate::application::prompt::load_system_prompt;
use crate::application::sessions::SessionStore;
use crate::config::{validate_config, CounselConfig, IngestMode, ParserKind};
use crate::domain::answering::AnsweringService;
use crate::domain::providers::{DocumentParser, SpeechTranscriber, TextEmbedder};
use crate::domain::vector_repository::VectorRepository;
use crate::error::CounselError;
use crate::infrastructure::{
    EmbeddingGenerator, GroqChatModel, LlamaParseClient, LocalDocumentParser, VectorDb, WhisperTranscriber,
};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Everything a request handler needs, built once at startup.
pub struct AppContext {
    pub config: Arc<CounselConfig>,
    pub answering: Arc<dyn AnsweringService>,
    pub transcriber: Arc<dyn SpeechTranscriber>,
}

fn required<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| CounselError::Configuration(format!("{} is not set", what)).into())
}

/// Loads the embedding model off the async runtime.
pub async fn build_embedder(config: &CounselConfig) -> Result<Arc<EmbeddingGenerator>> {
    let model = config.embedding.model.clone();
    let cache_dir = config.embedding.cache_dir.clone();
    let batch_size = config.embedding.batch_size;
    log::info!("Loading embedding model {}...", model);

    let embedder = tokio::task::spawn_blocking(move || EmbeddingGenerator::new(&model, cache_dir, batch_size))
        .await
        .context("embedding model loading task panicked")??;

    if embedder.dimension() as u64 != config.store.dimension {
        return Err(CounselError::Configuration(format!(
            "embedding model {} produces {} dimensions but store.dimension is {}",
            config.embedding.model,
            embedder.dimension(),
            config.store.dimension
        ))
        .into());
    }
    Ok(Arc::new(embedder))
}

pub fn build_store(config: &CounselConfig) -> Result<Arc<VectorDb>> {
    let url = required(&config.store.url, "QDRANT_URL (store.url)")?;
    let store = VectorDb::connect(
        url,
        config.store.api_key.clone(),
        Duration::from_secs(config.store.timeout_secs),
        config.store.collection.clone(),
        config.store.dimension,
    )
    .with_context(|| format!("failed to set up Qdrant client for {}", url))?;
    Ok(Arc::new(store))
}

pub fn build_parser(config: &CounselConfig) -> Result<Arc<dyn DocumentParser>> {
    match config.parser.kind {
        ParserKind::LlamaParse => {
            let api_key = required(&config.parser.api_key, "LLAMA_CLOUD_API_KEY (parser.api_key)")?;
            let client = LlamaParseClient::new(
                api_key.to_string(),
                config.parser.base_url.clone(),
                Duration::from_millis(config.parser.poll_interval_ms),
                Duration::from_secs(config.parser.max_wait_secs),
            )?;
            Ok(Arc::new(client))
        }
        ParserKind::Local => Ok(Arc::new(LocalDocumentParser::new())),
    }
}

pub fn build_language_model(config: &CounselConfig) -> Result<Arc<GroqChatModel>> {
    let api_key = required(&config.llm.api_key, "GROQ_API_KEY (llm.api_key)")?;
    let model = GroqChatModel::new(
        api_key.to_string(),
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.temperature,
        Duration::from_secs(config.llm.timeout_secs),
    )?;
    Ok(Arc::new(model))
}

pub fn build_transcriber(config: &CounselConfig) -> Result<Arc<WhisperTranscriber>> {
    let api_key = config
        .speech_api_key()
        .ok_or_else(|| CounselError::Configuration("speech.api_key is not set".to_string()))?;
    let transcriber = WhisperTranscriber::new(
        api_key.to_string(),
        config.speech_base_url().to_string(),
        config.speech.model.clone(),
        config.speech.language.clone(),
        Duration::from_secs(config.speech.timeout_secs),
    )?;
    Ok(Arc::new(transcriber))
}

/// Loads the configured knowledge source into the vector store.
pub async fn ingest_knowledge(
    config: &CounselConfig,
    embedder: Arc<dyn TextEmbedder>,
    store: Arc<dyn VectorRepository>,
    mode: IngestMode,
) -> Result<IngestionReport> {
    let source = config
        .knowledge
        .source_path
        .as_deref()
        .ok_or_else(|| CounselError::Configuration("KNOWLEDGE_SOURCE_PATH (knowledge.source_path) is not set".to_string()))?;
    let parser = build_parser(config)?;
    let chunking = ChunkingConfig {
        chunk_size: config.knowledge.chunk_size,
        chunk_overlap: config.knowledge.chunk_overlap,
    };
    let service = IngestionService::new(parser, embedder, store, chunking, config.embedding.batch_size);
    let report = service
        .ingest(source, mode)
        .await
        .with_context(|| format!("failed to ingest {}", source.display()))?;
    Ok(report)
}

/// Validates configuration, builds every adapter, loads the knowledge base
/// and assembles the shared application context.
pub async fn initialize(config: CounselConfig) -> Result<AppContext> {
    validate_config(&config).context("invalid configuration")?;
    let config = Arc::new(config);

    // --- Adapters ---
    let embedder = build_embedder(&config).await?;
    let store = build_store(&config)?;
    let llm = build_language_model(&config)?;
    let transcriber = build_transcriber(&config)?;
    let system_prompt = load_system_prompt(config.prompt.system_prompt_path.as_deref())?;

    // --- Knowledge base ---
    log::info!("Preparing collection '{}'...", store.collection_name());
    let report = ingest_knowledge(&config, embedder.clone(), store.clone(), config.knowledge.ingest_mode).await?;
    if report.skipped {
        log::info!("Reusing existing collection '{}'.", store.collection_name());
    } else {
        log::info!(
            "Indexed {} chunks from {} documents into '{}'.",
            report.chunks,
            report.documents,
            store.collection_name()
        );
    }

    // --- Answering ---
    let sessions = Arc::new(SessionStore::new(
        config.memory.token_limit,
        Duration::from_secs(config.memory.session_ttl_secs),
        config.memory.max_sessions,
    ));
    let answering = AnsweringServiceImpl::new(
        embedder,
        store,
        llm,
        sessions,
        system_prompt,
        config.store.top_k,
    );
    log::info!("Answering service ready (model {}, top_k {}).", config.llm.model, config.store.top_k);

    Ok(AppContext {
        config,
        answering: Arc::new(answering),
        transcriber,
    })
}
