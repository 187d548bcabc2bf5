//! The AI prospect.
//!
//! Prompt compilation and reply linting, the LLM and TTS provider seams,
//! the per-call `ProspectEngine`, and the `ConversationStateManager` that
//! keeps engines in memory and writes them through to a `StateStore`.

pub mod engine;
pub mod error;
pub mod llm;
pub mod manager;
pub mod prompt;
pub mod voice;

pub use engine::{ConversationState, ProspectEngine};
pub use error::EngineError;
pub use llm::{LlmClient, LlmMessage, LlmRole, MockLlm, OpenAiClient};
pub use manager::{Clock, ConversationStateManager, EngineHandle};
pub use prompt::{PromptCompiler, PromptContext, ReplyCheck, ReplyIssue};
pub use voice::{AudioClip, ElevenLabsTts, GoogleTts, MockTts, TtsProvider};
