//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use prospect_core::config::ProspectConfig;
use prospect_engine::{ConversationStateManager, LlmClient, PromptCompiler, TtsProvider};

/// Shared application state.
///
/// All fields use `Arc` for cheap cloning across handler tasks.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ProspectConfig>,
    pub manager: Arc<ConversationStateManager>,
    pub compiler: Arc<PromptCompiler>,
    pub llm: Arc<dyn LlmClient>,
    /// `None` when voice output is disabled.
    pub tts: Option<Arc<dyn TtsProvider>>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: ProspectConfig,
        manager: Arc<ConversationStateManager>,
        llm: Arc<dyn LlmClient>,
        tts: Option<Arc<dyn TtsProvider>>,
    ) -> Self {
        let compiler = PromptCompiler::new(&config.prompt);
        Self {
            config: Arc::new(config),
            manager,
            compiler: Arc::new(compiler),
            llm,
            tts,
            start_time: Instant::now(),
        }
    }
}
