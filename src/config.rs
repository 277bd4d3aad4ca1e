use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{CounselError, CounselResult};

const DEFAULT_CONFIG_FILE: &str = "counsel.toml";
const CONFIG_PATH_ENV: &str = "COUNSEL_CONFIG_PATH";

/// Provider-conventional variables and the config key each one feeds.
const PROVIDER_ENV: &[(&str, &str)] = &[
    ("GROQ_API_KEY", "llm.api_key"),
    ("LLAMA_CLOUD_API_KEY", "parser.api_key"),
    ("QDRANT_URL", "store.url"),
    ("QDRANT_API_KEY", "store.api_key"),
    ("KNOWLEDGE_SOURCE_PATH", "knowledge.source_path"),
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on the handling time of a single request.
    pub request_timeout_secs: u64,
    /// Largest accepted request body, audio uploads included.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            request_timeout_secs: 120,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LlmConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-70b-8192".to_string(),
            temperature: 0.1,
            timeout_secs: 60,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SpeechConfig {
    /// Defaults to the LLM key when unset.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Defaults to the LLM base URL when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    pub model: String,
    #[serde(default)]
    pub language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "whisper-large-v3".to_string(),
            language: Some("en".to_string()),
            timeout_secs: 60,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct EmbeddingConfig {
    pub model: String,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        let cache_dir = ProjectDirs::from("edu", "counsel", "counsel-chat")
            .map(|dirs| dirs.cache_dir().join("models"));
        Self {
            model: "BAAI/bge-small-en-v1.5".to_string(),
            cache_dir,
            batch_size: 32,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StoreConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    pub collection: String,
    pub dimension: u64,
    /// Number of chunks retrieved per query.
    pub top_k: usize,
    pub timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            collection: "krishna".to_string(),
            dimension: 384,
            top_k: 2,
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserKind {
    #[serde(rename = "llama_parse")]
    LlamaParse,
    #[serde(rename = "local")]
    Local,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ParserConfig {
    pub kind: ParserKind,
    #[serde(default)]
    pub api_key: Option<String>,
    pub base_url: String,
    pub poll_interval_ms: u64,
    pub max_wait_secs: u64,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            kind: ParserKind::LlamaParse,
            api_key: None,
            base_url: "https://api.cloud.llamaindex.ai".to_string(),
            poll_interval_ms: 1000,
            max_wait_secs: 300,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestMode {
    /// Skip ingestion when the collection already holds points.
    #[serde(rename = "reuse")]
    Reuse,
    /// Always re-parse and upsert the source.
    #[serde(rename = "refresh")]
    Refresh,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub source_path: Option<PathBuf>,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub ingest_mode: IngestMode,
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            source_path: None,
            chunk_size: 1024,
            chunk_overlap: 20,
            ingest_mode: IngestMode::Reuse,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MemoryConfig {
    pub token_limit: usize,
    pub session_ttl_secs: u64,
    /// Upper bound on the number of live sessions.
    pub max_sessions: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            token_limit: 1024,
            session_ttl_secs: 3600,
            max_sessions: 10_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PromptConfig {
    /// Replaces the built-in system instruction when set.
    #[serde(default)]
    pub system_prompt_path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct CounselConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub prompt: PromptConfig,
}

impl CounselConfig {
    pub fn speech_api_key(&self) -> Option<&str> {
        self.speech.api_key.as_deref().or(self.llm.api_key.as_deref())
    }

    pub fn speech_base_url(&self) -> &str {
        self.speech.base_url.as_deref().unwrap_or(&self.llm.base_url)
    }
}

/// Loads configuration from defaults, the TOML file and the environment.
///
/// The TOML file is `counsel.toml` in the working directory unless
/// `COUNSEL_CONFIG_PATH` names another one, in which case it must exist.
/// `COUNSEL_`-prefixed variables override the file (`__` separates nesting
/// levels), and the provider variables (`GROQ_API_KEY`, `QDRANT_URL`, ...)
/// override everything.
pub fn load_config() -> CounselResult<CounselConfig> {
    let config_path_env = std::env::var(CONFIG_PATH_ENV).ok();
    let config_path = config_path_env
        .clone()
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

    if let Some(ref env_path) = config_path_env {
        if !std::path::Path::new(env_path).exists() {
            return Err(CounselError::Configuration(format!(
                "config file not found at {}: {}",
                CONFIG_PATH_ENV, env_path
            )));
        }
        log::info!("{} is set: {}", CONFIG_PATH_ENV, env_path);
    } else {
        log::info!("{} not set, falling back to default: {}", CONFIG_PATH_ENV, config_path);
    }

    let figment = Figment::new()
        .merge(Serialized::defaults(CounselConfig::default()))
        .merge(Toml::file(&config_path))
        .merge(Env::prefixed("COUNSEL_").split("__"))
        .merge(
            Env::raw()
                .only(&PROVIDER_ENV.iter().map(|(env, _)| *env).collect::<Vec<_>>())
                .map(|key| provider_key(key.as_str()).into()),
        );

    let config: CounselConfig = figment
        .extract()
        .map_err(|e| CounselError::Configuration(format!("failed to extract configuration: {}", e)))?;
    validate_config(&config)?;
    Ok(config)
}

fn provider_key(env_key: &str) -> &'static str {
    PROVIDER_ENV
        .iter()
        .find(|(env, _)| env.eq_ignore_ascii_case(env_key))
        .map(|(_, key)| *key)
        .unwrap_or("unused")
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

pub fn validate_config(config: &CounselConfig) -> CounselResult<()> {
    let missing = |what: &str| CounselError::Configuration(format!("{} is not set", what));

    if is_blank(&config.llm.api_key) {
        return Err(missing("GROQ_API_KEY (llm.api_key)"));
    }
    if is_blank(&config.store.url) {
        return Err(missing("QDRANT_URL (store.url)"));
    }
    if config.parser.kind == ParserKind::LlamaParse && is_blank(&config.parser.api_key) {
        return Err(missing("LLAMA_CLOUD_API_KEY (parser.api_key)"));
    }
    match &config.knowledge.source_path {
        None => return Err(missing("KNOWLEDGE_SOURCE_PATH (knowledge.source_path)")),
        Some(path) if !path.exists() => {
            return Err(CounselError::Configuration(format!(
                "data file not found at {}",
                path.display()
            )));
        }
        Some(_) => {}
    }
    if config.store.top_k == 0 {
        return Err(CounselError::Configuration("store.top_k must be greater than zero".to_string()));
    }
    if config.store.dimension == 0 {
        return Err(CounselError::Configuration("store.dimension must be greater than zero".to_string()));
    }
    if config.memory.token_limit == 0 {
        return Err(CounselError::Configuration("memory.token_limit must be greater than zero".to_string()));
    }
    if config.memory.max_sessions == 0 {
        return Err(CounselError::Configuration("memory.max_sessions must be greater than zero".to_string()));
    }
    if config.knowledge.chunk_overlap >= config.knowledge.chunk_size {
        return Err(CounselError::Configuration(format!(
            "knowledge.chunk_overlap ({}) must be smaller than knowledge.chunk_size ({})",
            config.knowledge.chunk_overlap, config.knowledge.chunk_size
        )));
    }
    if config.embedding.batch_size == 0 {
        return Err(CounselError::Configuration("embedding.batch_size must be greater than zero".to_string()));
    }
    Ok(())
}
