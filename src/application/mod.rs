pub mod answering_service;
pub mod chunking;
pub mod ingestion_service;
pub mod memory;
pub mod prompt;
pub mod sessions;
pub mod tokens;
