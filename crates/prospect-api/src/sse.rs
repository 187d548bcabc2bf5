//! Frames of the turn stream.
//!
//! Each frame is one SSE event with no event name and a JSON `data` payload
//! tagged by `type`.

use axum::response::sse::Event;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Serialize;

use prospect_core::types::{CallPhase, EmotionalState};
use prospect_engine::AudioClip;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    TextChunk {
        content: String,
        index: usize,
    },
    AudioChunk {
        /// Base64 of the provider's audio bytes.
        audio: String,
        mime_type: String,
    },
    VoiceError {
        error: String,
        #[serde(rename = "useSpeechSynthesis")]
        use_speech_synthesis: bool,
        /// Text for the client to speak itself.
        text: String,
    },
    Completion {
        #[serde(rename = "fullResponse")]
        full_response: String,
        phase: CallPhase,
        #[serde(rename = "emotionalState")]
        emotional_state: EmotionalState,
        #[serde(rename = "turnCount")]
        turn_count: usize,
    },
    Error {
        error: String,
        #[serde(rename = "useSpeechSynthesis")]
        use_speech_synthesis: bool,
    },
}

impl StreamEvent {
    pub fn audio(clip: &AudioClip) -> Self {
        StreamEvent::AudioChunk {
            audio: BASE64.encode(&clip.bytes),
            mime_type: clip.mime_type.clone(),
        }
    }

    pub fn voice_error(error: impl Into<String>, text: impl Into<String>) -> Self {
        StreamEvent::VoiceError {
            error: error.into(),
            use_speech_synthesis: true,
            text: text.into(),
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        StreamEvent::Error {
            error: error.into(),
            use_speech_synthesis: true,
        }
    }

    pub fn to_event(&self) -> Event {
        let data = serde_json::to_string(self).unwrap_or_default();
        Event::default().data(data)
    }
}

/// Split a reply into word-sized chunks whose concatenation is the reply.
///
/// Whitespace stays attached to the end of the preceding word.
pub fn word_chunks(text: &str) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut in_space = false;

    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            in_space = true;
        } else if in_space {
            if !text[start..i].trim().is_empty() {
                chunks.push(&text[start..i]);
                start = i;
            }
            in_space = false;
        }
    }
    if start < text.len() {
        chunks.push(&text[start..]);
    }
    chunks
}
