//! Error types for the prospect engine.

use prospect_core::error::ProspectError;

/// Errors from the engine, its providers, and the state manager.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("call {call_id} belongs to another user")]
    CallOwnership { call_id: String },
    #[error("LLM error: {0}")]
    LlmError(String),
    #[error("LLM returned an empty reply")]
    EmptyReply,
    #[error("voice error: {0}")]
    VoiceError(String),
    #[error("storage error: {0}")]
    StorageError(String),
}

impl From<ProspectError> for EngineError {
    fn from(err: ProspectError) -> Self {
        EngineError::StorageError(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::LlmError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_display() {
        assert_eq!(EngineError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            EngineError::CallOwnership {
                call_id: "call-9".to_string()
            }
            .to_string(),
            "call call-9 belongs to another user"
        );
        assert_eq!(
            EngineError::LlmError("timeout".to_string()).to_string(),
            "LLM error: timeout"
        );
        assert_eq!(
            EngineError::VoiceError("quota".to_string()).to_string(),
            "voice error: quota"
        );
    }

    #[test]
    fn test_from_prospect_error() {
        let err: EngineError = ProspectError::Storage("disk full".to_string()).into();
        assert!(matches!(err, EngineError::StorageError(_)));
        assert!(err.to_string().contains("disk full"));
    }
}
