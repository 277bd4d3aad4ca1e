use thiserror::Error;

/// Error taxonomy shared by every layer of the service.
///
/// `Configuration` and `Data` only ever occur at startup and abort the
/// process. The remaining variants are request-time failures that the HTTP
/// layer renders as `{"error", "code"}` bodies.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CounselError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("knowledge data error: {0}")]
    Data(String),
    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("upstream service error: {0}")]
    Upstream(String),
    #[error("{0}")]
    Validation(String),
    #[error("speech recognition failed: {0}")]
    Recognition(String),
}

impl CounselError {
    /// Stable, machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CounselError::Configuration(_) => "configuration_error",
            CounselError::Data(_) => "data_error",
            CounselError::StoreUnavailable(_) => "store_unavailable",
            CounselError::Upstream(_) => "upstream_error",
            CounselError::Validation(_) => "validation_error",
            CounselError::Recognition(_) => "recognition_error",
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, CounselError::Validation(_))
    }
}

pub type CounselResult<T> = std::result::Result<T, CounselError>;
