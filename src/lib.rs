pub mod application;
pub mod config;
/// Declare modules and make them public
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod initialization;
pub mod server;

/// Re-export necessary items for the binaries and tests
pub use application::answering_service::AnsweringServiceImpl;
pub use application::ingestion_service::{IngestionReport, IngestionService};
pub use config::{load_config, CounselConfig};
pub use domain::answering::AnsweringService;
pub use domain::providers::{AudioClip, DocumentParser, LanguageModel, SpeechTranscriber, TextEmbedder};
pub use domain::vector_repository::VectorRepository;
pub use error::{CounselError, CounselResult};
pub use infrastructure::vector_db::qdrant_client;
pub use initialization::{initialize, AppContext};
