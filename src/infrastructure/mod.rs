pub mod embedding;
pub mod file_system;
pub mod groq;
pub mod llama_parse;
pub mod markdown;
pub mod speech;
pub mod vector_db;

// Re-export key types for easier access from the startup code
pub use embedding::EmbeddingGenerator;
pub use file_system::LocalDocumentParser;
pub use groq::GroqChatModel;
pub use llama_parse::LlamaParseClient;
pub use speech::WhisperTranscriber;
pub use vector_db::VectorDb;
