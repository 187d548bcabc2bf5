//! Route handlers.
//!
//! The turn endpoint validates the request up front, then hands the work to
//! a spawned task that feeds an mpsc channel backing the SSE body.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

use prospect_core::types::{ConversationRecord, Difficulty, EmotionalState, ScenarioConfig, Turn};
use prospect_engine::{EngineHandle, PromptContext, ReplyCheck};

use crate::error::ApiError;
use crate::sse::{word_chunks, StreamEvent};
use crate::state::AppState;

/// Frames buffered between the turn task and the HTTP body.
const STREAM_BUFFER: usize = 32;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct TurnRequest {
    pub user_id: String,
    pub message: String,
    pub scenario: ScenarioConfig,
    /// Seeds a call the server has never seen; ignored otherwise.
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
    /// Overrides `voice.enabled` for this turn.
    #[serde(default)]
    pub voice: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct CompileRequest {
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub conversation_history: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompileResponse {
    pub prompt: String,
    pub emotional_state: EmotionalState,
}

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub reply: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub active_calls: usize,
    pub llm_provider: String,
    pub voice_provider: Option<String>,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        active_calls: state.manager.active_calls(),
        llm_provider: state.llm.name().to_string(),
        voice_provider: state.tts.as_ref().map(|t| t.name().to_string()),
    })
}

/// POST /api/calls/{call_id}/turns - stream the prospect's reply.
pub async fn post_turn(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    payload: Result<Json<TurnRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Json(req) = payload?;

    let message = req.message.trim().to_string();
    if message.is_empty() {
        return Err(ApiError::BadRequest("message cannot be empty".to_string()));
    }
    if req.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }

    let engine = state.manager.get_or_create_engine(
        &call_id,
        &req.user_id,
        req.scenario,
        req.conversation_history,
    )?;

    let voice = req.voice.unwrap_or(state.config.voice.enabled) && state.tts.is_some();
    let keep_alive = Duration::from_secs(state.config.stream.keep_alive_secs);

    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(run_turn(state, call_id, engine, message, voice, tx));

    let stream = ReceiverStream::new(rx).map(|frame: StreamEvent| Ok(frame.to_event()));
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(keep_alive)))
}

/// Generate the reply, record it, then stream text, audio and completion.
/// Returns early once the client has gone away.
async fn run_turn(
    state: AppState,
    call_id: String,
    engine: EngineHandle,
    message: String,
    voice: bool,
    tx: mpsc::Sender<StreamEvent>,
) {
    let (reply, conversation) = {
        let mut engine = engine.lock().await;
        let result = engine
            .generate_response(
                &message,
                state.llm.as_ref(),
                &state.compiler,
                state.config.llm.max_reply_retries,
            )
            .await;
        match result {
            Ok(reply) => {
                state.manager.update_engine_state(&call_id, &engine);
                (reply, engine.conversation_state())
            }
            Err(e) => {
                tracing::warn!(call_id = %call_id, error = %e, "Turn failed");
                let _ = tx
                    .send(StreamEvent::error("Failed to generate prospect response"))
                    .await;
                return;
            }
        }
    };

    let delay = Duration::from_millis(state.config.stream.chunk_delay_ms);
    for (index, chunk) in word_chunks(&reply).into_iter().enumerate() {
        let frame = StreamEvent::TextChunk {
            content: chunk.to_string(),
            index,
        };
        if tx.send(frame).await.is_err() {
            tracing::debug!(call_id = %call_id, "Client disconnected mid-stream");
            return;
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    if voice {
        if let Some(tts) = &state.tts {
            let frame = match tts.synthesize(&reply).await {
                Ok(clip) => StreamEvent::audio(&clip),
                Err(e) => {
                    tracing::warn!(call_id = %call_id, provider = tts.name(), error = %e, "Voice synthesis failed");
                    StreamEvent::voice_error(e.to_string(), reply.clone())
                }
            };
            if tx.send(frame).await.is_err() {
                return;
            }
        }
    }

    let _ = tx
        .send(StreamEvent::Completion {
            full_response: reply,
            phase: conversation.phase,
            emotional_state: conversation.emotional_state,
            turn_count: conversation.turn_count,
        })
        .await;
}

/// GET /api/calls/{call_id}
pub async fn get_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<Json<ConversationRecord>, ApiError> {
    state
        .manager
        .get_record(&call_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("call {} not found", call_id)))
}

/// DELETE /api/calls/{call_id}
pub async fn end_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.manager.end_call(&call_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("call {} not found", call_id)))
    }
}

/// POST /api/prompt/compile
pub async fn compile_prompt(
    State(state): State<AppState>,
    payload: Result<Json<CompileRequest>, JsonRejection>,
) -> Result<Json<CompileResponse>, ApiError> {
    let Json(req) = payload?;
    let ctx = PromptContext::from_scenario(&req.scenario, &req.conversation_history);
    let emotional_state = ctx.emotional_state.unwrap_or_else(|| {
        state
            .compiler
            .emotional_drift(&req.conversation_history, req.scenario.difficulty)
    });
    Ok(Json(CompileResponse {
        prompt: state.compiler.compile(&ctx),
        emotional_state,
    }))
}

/// POST /api/prompt/validate
pub async fn validate_reply(
    State(state): State<AppState>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ReplyCheck>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(state.compiler.validate_reply(&req.reply, req.difficulty)))
}
