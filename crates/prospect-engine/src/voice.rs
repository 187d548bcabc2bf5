//! Text-to-speech providers for the prospect's voice.
//!
//! Audio is treated as opaque bytes plus a MIME type; nothing here decodes
//! or transcodes it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use prospect_core::config::VoiceConfig;

use crate::error::EngineError;

const ELEVENLABS_BASE_URL: &str = "https://api.elevenlabs.io";
const GOOGLE_TTS_BASE_URL: &str = "https://texttospeech.googleapis.com";

/// Synthesized speech.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A provider that turns prospect text into speech.
#[async_trait]
pub trait TtsProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, text: &str) -> Result<AudioClip, EngineError>;
}

fn http_client(timeout_secs: u64) -> Result<Client, EngineError> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| EngineError::VoiceError(e.to_string()))
}

// =============================================================================
// ElevenLabs
// =============================================================================

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: ElevenLabsVoiceSettings,
}

#[derive(Serialize)]
struct ElevenLabsVoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

/// ElevenLabs `/v1/text-to-speech/{voice_id}`; responds with MP3 bytes.
pub struct ElevenLabsTts {
    client: Client,
    api_key: String,
    base_url: String,
    voice_id: String,
    model_id: String,
}

impl ElevenLabsTts {
    pub fn new(config: &VoiceConfig, api_key: impl Into<String>) -> Result<Self, EngineError> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            api_key: api_key.into(),
            base_url: ELEVENLABS_BASE_URL.to_string(),
            voice_id: config.voice_id.clone(),
            model_id: config.model_id.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/text-to-speech/{}", self.base_url, self.voice_id)
    }
}

impl fmt::Debug for ElevenLabsTts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsTts")
            .field("api_key", &"<redacted>")
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .finish()
    }
}

#[async_trait]
impl TtsProvider for ElevenLabsTts {
    fn name(&self) -> &str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip, EngineError> {
        let body = ElevenLabsRequest {
            text,
            model_id: &self.model_id,
            voice_settings: ElevenLabsVoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };

        let resp = self
            .client
            .post(self.endpoint())
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| EngineError::VoiceError(e.to_string()))?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| EngineError::VoiceError(e.to_string()))?;
        if bytes.is_empty() {
            return Err(EngineError::VoiceError("empty audio response".to_string()));
        }

        Ok(AudioClip {
            bytes: bytes.to_vec(),
            mime_type: "audio/mpeg".to_string(),
        })
    }
}

// =============================================================================
// Google Cloud TTS
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSynthesizeRequest<'a> {
    input: GoogleInput<'a>,
    voice: GoogleVoice<'a>,
    audio_config: GoogleAudioConfig,
}

#[derive(Serialize)]
struct GoogleInput<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleVoice<'a> {
    language_code: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAudioConfig {
    audio_encoding: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSynthesizeResponse {
    audio_content: String,
}

/// Google Cloud `/v1/text:synthesize`; responds with base64 MP3.
pub struct GoogleTts {
    client: Client,
    api_key: String,
    base_url: String,
    voice_name: String,
    language_code: String,
}

impl GoogleTts {
    pub fn new(config: &VoiceConfig, api_key: impl Into<String>) -> Result<Self, EngineError> {
        Ok(Self {
            client: http_client(config.request_timeout_secs)?,
            api_key: api_key.into(),
            base_url: GOOGLE_TTS_BASE_URL.to_string(),
            voice_name: config.google_voice.clone(),
            language_code: config.language_code.clone(),
        })
    }

    fn request<'a>(&'a self, text: &'a str) -> GoogleSynthesizeRequest<'a> {
        GoogleSynthesizeRequest {
            input: GoogleInput { text },
            voice: GoogleVoice {
                language_code: &self.language_code,
                name: &self.voice_name,
            },
            audio_config: GoogleAudioConfig {
                audio_encoding: "MP3",
            },
        }
    }
}

impl fmt::Debug for GoogleTts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleTts")
            .field("api_key", &"<redacted>")
            .field("voice_name", &self.voice_name)
            .field("language_code", &self.language_code)
            .finish()
    }
}

fn decode_google_audio(resp: GoogleSynthesizeResponse) -> Result<AudioClip, EngineError> {
    let bytes = BASE64
        .decode(resp.audio_content.as_bytes())
        .map_err(|e| EngineError::VoiceError(format!("invalid audioContent: {}", e)))?;
    if bytes.is_empty() {
        return Err(EngineError::VoiceError("empty audio response".to_string()));
    }
    Ok(AudioClip {
        bytes,
        mime_type: "audio/mpeg".to_string(),
    })
}

#[async_trait]
impl TtsProvider for GoogleTts {
    fn name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip, EngineError> {
        let body = self.request(text);
        let resp: GoogleSynthesizeResponse = self
            .client
            .post(format!("{}/v1/text:synthesize", self.base_url))
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| EngineError::VoiceError(e.to_string()))?
            .json()
            .await
            .map_err(|e| EngineError::VoiceError(e.to_string()))?;

        decode_google_audio(resp)
    }
}

// =============================================================================
// Mock
// =============================================================================

/// `TtsProvider` that returns the text bytes as "audio", or fails on demand.
#[derive(Debug, Default)]
pub struct MockTts {
    fail: AtomicBool,
}

impl MockTts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl TtsProvider for MockTts {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, text: &str) -> Result<AudioClip, EngineError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(EngineError::VoiceError("mock voice unavailable".to_string()));
        }
        Ok(AudioClip {
            bytes: text.as_bytes().to_vec(),
            mime_type: "audio/mpeg".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevenlabs_endpoint_uses_voice_id() {
        let config = VoiceConfig {
            voice_id: "voice-123".to_string(),
            ..VoiceConfig::default()
        };
        let tts = ElevenLabsTts::new(&config, "key").unwrap();
        assert_eq!(
            tts.endpoint(),
            "https://api.elevenlabs.io/v1/text-to-speech/voice-123"
        );
    }

    #[test]
    fn test_elevenlabs_request_body() {
        let body = ElevenLabsRequest {
            text: "Who is this?",
            model_id: "eleven_turbo_v2",
            voice_settings: ElevenLabsVoiceSettings {
                stability: 0.5,
                similarity_boost: 0.75,
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["text"], "Who is this?");
        assert_eq!(value["model_id"], "eleven_turbo_v2");
        assert!(value["voice_settings"]["stability"].is_number());
    }

    #[test]
    fn test_google_request_body_is_camel_case() {
        let body = GoogleSynthesizeRequest {
            input: GoogleInput { text: "hi" },
            voice: GoogleVoice {
                language_code: "en-US",
                name: "",
            },
            audio_config: GoogleAudioConfig {
                audio_encoding: "MP3",
            },
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["voice"]["languageCode"], "en-US");
        assert!(value["voice"].get("name").is_none());
        assert_eq!(value["audioConfig"]["audioEncoding"], "MP3");
    }

    #[test]
    fn test_google_default_config_omits_voice_name() {
        let tts = GoogleTts::new(&VoiceConfig::default(), "key").unwrap();
        let value = serde_json::to_value(tts.request("Who is this?")).unwrap();
        assert_eq!(value["voice"]["languageCode"], "en-US");
        assert!(value["voice"].get("name").is_none());

        let config = VoiceConfig {
            google_voice: "en-US-Neural2-D".to_string(),
            ..VoiceConfig::default()
        };
        let tts = GoogleTts::new(&config, "key").unwrap();
        let value = serde_json::to_value(tts.request("Who is this?")).unwrap();
        assert_eq!(value["voice"]["name"], "en-US-Neural2-D");
    }

    #[test]
    fn test_decode_google_audio() {
        let resp = GoogleSynthesizeResponse {
            audio_content: BASE64.encode(b"ID3fake"),
        };
        let clip = decode_google_audio(resp).unwrap();
        assert_eq!(clip.bytes, b"ID3fake");
        assert_eq!(clip.mime_type, "audio/mpeg");

        let bad = GoogleSynthesizeResponse {
            audio_content: "%%%".to_string(),
        };
        assert!(matches!(
            decode_google_audio(bad),
            Err(EngineError::VoiceError(_))
        ));
    }

    #[test]
    fn test_debug_redacts_keys() {
        let config = VoiceConfig::default();
        let eleven = ElevenLabsTts::new(&config, "xi-secret").unwrap();
        let google = GoogleTts::new(&config, "g-secret").unwrap();
        assert!(!format!("{:?}", eleven).contains("xi-secret"));
        assert!(!format!("{:?}", google).contains("g-secret"));
    }

    #[tokio::test]
    async fn test_mock_tts() {
        let clip = MockTts::new().synthesize("hello").await.unwrap();
        assert_eq!(clip.bytes, b"hello");
        assert!(MockTts::failing().synthesize("hello").await.is_err());
    }
}
