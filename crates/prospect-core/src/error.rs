use thiserror::Error;

/// Top-level error type for the prospect roleplay service.
///
/// Subsystem crates define their own error types and convert into
/// `ProspectError` where they cross the binary boundary, so `?` works from
/// storage up through the composition root.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProspectError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid difficulty {0}: must be between 1 and 5")]
    InvalidDifficulty(u8),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ProspectError {
    fn from(err: toml::de::Error) -> Self {
        ProspectError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ProspectError {
    fn from(err: toml::ser::Error) -> Self {
        ProspectError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ProspectError {
    fn from(err: serde_json::Error) -> Self {
        ProspectError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for prospect operations.
pub type Result<T> = std::result::Result<T, ProspectError>;
