use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProspectError;

// =============================================================================
// Scenario enums
// =============================================================================

/// Seniority of the prospect the rep is calling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Seniority {
    IndividualContributor,
    Manager,
    Director,
    Vp,
    CSuite,
}

impl Seniority {
    /// Wire name, as it appears in JSON and TOML.
    pub fn as_str(&self) -> &'static str {
        match self {
            Seniority::IndividualContributor => "individual-contributor",
            Seniority::Manager => "manager",
            Seniority::Director => "director",
            Seniority::Vp => "vp",
            Seniority::CSuite => "c-suite",
        }
    }
}

/// The kind of sales call being rehearsed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallType {
    /// The rep cold-calls the prospect.
    DiscoveryOutbound,
    /// The prospect reached out first (demo request, inbound lead).
    DiscoveryInbound,
    /// Second call after a product demo.
    DemoFollowUp,
    /// Late-stage negotiation and commitment.
    Closing,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallType::DiscoveryOutbound => "discovery-outbound",
            CallType::DiscoveryInbound => "discovery-inbound",
            CallType::DemoFollowUp => "demo-follow-up",
            CallType::Closing => "closing",
        }
    }
}

/// How hard the prospect is to win over, from 1 (friendly) to 5 (hostile).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Difficulty(u8);

impl Difficulty {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    /// Build a difficulty, rejecting values outside 1..=5.
    pub fn new(level: u8) -> Result<Self, ProspectError> {
        if (Self::MIN..=Self::MAX).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ProspectError::InvalidDifficulty(level))
        }
    }

    pub fn level(&self) -> u8 {
        self.0
    }
}

impl Default for Difficulty {
    fn default() -> Self {
        Self(3)
    }
}

impl TryFrom<u8> for Difficulty {
    type Error = ProspectError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Difficulty::new(value)
    }
}

impl From<Difficulty> for u8 {
    fn from(d: Difficulty) -> Self {
        d.0
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Emotional posture of the prospect toward the rep.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionalState {
    Receptive,
    Neutral,
    Guarded,
    Warming,
    Engaged,
    Dismissive,
}

impl EmotionalState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionalState::Receptive => "receptive",
            EmotionalState::Neutral => "neutral",
            EmotionalState::Guarded => "guarded",
            EmotionalState::Warming => "warming",
            EmotionalState::Engaged => "engaged",
            EmotionalState::Dismissive => "dismissive",
        }
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Who spoke a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human sales rep.
    Rep,
    /// The AI prospect.
    Ai,
}

/// One message in a call transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn rep(content: impl Into<String>) -> Self {
        Self {
            role: Role::Rep,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Scenario settings chosen for a call.
///
/// The compiler reads the typed fields; anything else the client sends is
/// kept untouched in `extra`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub seniority: Seniority,
    pub call_type: CallType,
    /// Free-text description of the prospect's situation.
    pub scenario: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prospect_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Pins the prospect's mood instead of letting it drift.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<EmotionalState>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

// =============================================================================
// Engine state
// =============================================================================

/// Stage of the simulated call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    #[default]
    Opening,
    Discovery,
    Presentation,
    Objections,
    Closing,
}

impl CallPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::Opening => "opening",
            CallPhase::Discovery => "discovery",
            CallPhase::Presentation => "presentation",
            CallPhase::Objections => "objections",
            CallPhase::Closing => "closing",
        }
    }
}

/// What the prospect remembers about the call so far.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProspectMemory {
    /// -5 (hostile) ..= 5 (bought in).
    pub rapport: i8,
    pub objections_raised: Vec<String>,
    pub topics_mentioned: Vec<String>,
    pub rep_questions_asked: u32,
}

/// Serializable engine state beyond the transcript itself.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub phase: CallPhase,
    pub memory: ProspectMemory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotional_state: Option<EmotionalState>,
}

/// Durable record of one call, keyed by `call_id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub call_id: String,
    pub user_id: String,
    pub last_activity: DateTime<Utc>,
    pub conversation_history: Vec<Turn>,
    pub scenario_config: ScenarioConfig,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub engine_state: EngineSnapshot,
}
