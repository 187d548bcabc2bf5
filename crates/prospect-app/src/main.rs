//! Prospect application binary - composition root.
//!
//! 1. Parse CLI args and load configuration from TOML
//! 2. Initialize tracing
//! 3. Open the SQLite call store
//! 4. Build the LLM client and optional voice provider from config + env keys
//! 5. Start the idle-call cleanup loop and the axum API server
//! 6. On Ctrl-C, stop serving and flush in-memory calls to the store

mod cli;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use prospect_core::config::{LlmConfig, ProspectConfig, VoiceConfig};
use prospect_core::error::ProspectError;
use prospect_engine::{
    ConversationStateManager, ElevenLabsTts, GoogleTts, LlmClient, MockLlm, MockTts,
    OpenAiClient, TtsProvider,
};
use prospect_storage::{Database, SqliteStateStore, StateStore};

use prospect_api::{start_server, AppState};

use cli::CliArgs;

fn build_llm(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, ProspectError> {
    match config.provider.as_str() {
        "mock" => {
            tracing::warn!("Using the mock LLM; replies are canned");
            Ok(Arc::new(MockLlm::new()))
        }
        _ => {
            let key = std::env::var(&config.api_key_env).map_err(|_| {
                ProspectError::Config(format!(
                    "LLM API key not found: set {} or use provider \"mock\"",
                    config.api_key_env
                ))
            })?;
            let client = OpenAiClient::new(config, key)
                .map_err(|e| ProspectError::Llm(e.to_string()))?;
            tracing::info!(model = %config.model, base_url = %config.base_url, "LLM client ready");
            Ok(Arc::new(client))
        }
    }
}

/// Voice is optional: any misconfiguration disables it with a warning.
fn build_tts(config: &VoiceConfig) -> Option<Arc<dyn TtsProvider>> {
    let provider = config.provider.as_str();
    if provider == "none" {
        return None;
    }
    if provider == "mock" {
        return Some(Arc::new(MockTts::new()));
    }

    let Ok(key) = std::env::var(&config.api_key_env) else {
        tracing::warn!(
            provider,
            env = %config.api_key_env,
            "Voice API key not set; voice output disabled"
        );
        return None;
    };

    let built: Result<Arc<dyn TtsProvider>, _> = match provider {
        "google" => GoogleTts::new(config, key).map(|t| Arc::new(t) as Arc<dyn TtsProvider>),
        _ => ElevenLabsTts::new(config, key).map(|t| Arc::new(t) as Arc<dyn TtsProvider>),
    };
    match built {
        Ok(tts) => {
            tracing::info!(provider, enabled_by_default = config.enabled, "Voice provider ready");
            Some(tts)
        }
        Err(e) => {
            tracing::warn!(provider, error = %e, "Voice provider unavailable");
            None
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config. A missing file means defaults; an invalid one is fatal.
    let config_file = args.resolve_config_path();
    if args.init_config {
        ProspectConfig::default().save(&config_file)?;
        println!("Wrote default configuration to {}", config_file.display());
        return Ok(());
    }
    let config = if config_file.exists() {
        ProspectConfig::load(&config_file)?
    } else {
        ProspectConfig::default()
    };

    // Tracing: --log-level > RUST_LOG > config.
    let filter = match args.log_level {
        Some(ref level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Starting prospect v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), exists = config_file.exists(), "Configuration resolved");

    // Storage.
    let data_dir = args.resolve_data_dir(&config.server.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("prospect.db");
    let db = Arc::new(Database::open(&db_path)?);
    let store: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(db));
    tracing::info!(path = %db_path.display(), stored_calls = store.count()?, "Call store opened");

    // Providers.
    let llm = build_llm(&config.llm)?;
    let tts = build_tts(&config.voice);

    // Conversation state + background cleanup.
    let manager = Arc::new(ConversationStateManager::new(
        store,
        config.session.clone(),
    ));
    let cleanup = Arc::clone(&manager).spawn_cleanup();

    // === API server ===
    let host = args.resolve_host(&config.server.host);
    let port = args.resolve_port(config.server.port);
    let state = AppState::new(config, Arc::clone(&manager), llm, tts);

    let served = start_server(&host, port, state, shutdown_signal()).await;

    cleanup.abort();
    let flushed = manager.flush_all().await;
    tracing::info!(flushed, "In-memory calls flushed");

    served?;
    Ok(())
}
