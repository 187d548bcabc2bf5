//! The AI prospect for one call.
//!
//! A `ProspectEngine` owns the transcript plus the small amount of state a
//! real buyer would carry through a call: the phase the call has reached,
//! the current mood, and what the prospect remembers (rapport, objections,
//! topics, how many questions the rep asked).

use chrono::{DateTime, Utc};
use serde::Serialize;

use prospect_core::types::{
    CallPhase, ConversationRecord, EmotionalState, EngineSnapshot, ProspectMemory, Role,
    ScenarioConfig, Turn,
};

use crate::error::EngineError;
use crate::llm::{LlmClient, LlmMessage};
use crate::prompt::{self, PromptCompiler, PromptContext};

const RAPPORT_MIN: i8 = -5;
const RAPPORT_MAX: i8 = 5;

const OBJECTION_KEYWORDS: &[&str] = &["pricing", "price", "budget", "cost", "expensive"];
const CLOSING_KEYWORDS: &[&str] = &[
    "next step",
    "schedule",
    "follow up",
    "follow-up",
    "calendar",
    "contract",
    "sign off",
];
const PRESENTATION_KEYWORDS: &[&str] = &["product", "feature", "demo", "platform", "show you"];

/// Prospect-side phrasing mapped to the objection it represents.
const OBJECTION_MARKERS: &[(&str, &str)] = &[
    ("too expensive", "price"),
    ("cost", "price"),
    ("price", "price"),
    ("budget", "budget"),
    ("already have", "incumbent"),
    ("already use", "incumbent"),
    ("current vendor", "incumbent"),
    ("not a priority", "priority"),
    ("other priorities", "priority"),
    ("bad time", "timing"),
    ("next quarter", "timing"),
    ("no time", "timing"),
    ("security", "security"),
    ("sign-off", "authority"),
    ("approval", "authority"),
];

/// Business topics worth remembering when the rep raises them.
const TOPIC_KEYWORDS: &[&str] = &[
    "pricing",
    "integration",
    "security",
    "onboarding",
    "roi",
    "timeline",
    "support",
    "reporting",
    "migration",
    "headcount",
    "pipeline",
    "forecast",
];

/// Read-only view of a call for callers outside the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub phase: CallPhase,
    /// Total turns in the transcript, rep and prospect.
    pub turn_count: usize,
    pub emotional_state: EmotionalState,
    pub conversation_history: Vec<Turn>,
}

/// Stateful AI prospect for a single call.
#[derive(Debug, Clone)]
pub struct ProspectEngine {
    call_id: String,
    config: ScenarioConfig,
    history: Vec<Turn>,
    phase: CallPhase,
    memory: ProspectMemory,
    mood: EmotionalState,
}

impl ProspectEngine {
    pub fn new(call_id: impl Into<String>, config: ScenarioConfig) -> Self {
        Self::with_history(call_id, config, Vec::new())
    }

    /// Engine seeded with a transcript supplied by the client.
    pub fn with_history(
        call_id: impl Into<String>,
        config: ScenarioConfig,
        history: Vec<Turn>,
    ) -> Self {
        let mood = config
            .emotional_state
            .unwrap_or_else(|| prompt::baseline_mood(config.difficulty));
        Self {
            call_id: call_id.into(),
            config,
            history,
            phase: CallPhase::default(),
            memory: ProspectMemory::default(),
            mood,
        }
    }

    /// Rebuild an engine from a stored record.
    pub fn from_record(record: ConversationRecord) -> Self {
        let ConversationRecord {
            call_id,
            conversation_history,
            scenario_config,
            engine_state,
            ..
        } = record;
        let mood = scenario_config
            .emotional_state
            .or(engine_state.emotional_state)
            .unwrap_or_else(|| prompt::baseline_mood(scenario_config.difficulty));
        Self {
            call_id,
            config: scenario_config,
            history: conversation_history,
            phase: engine_state.phase,
            memory: engine_state.memory,
            mood,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn scenario(&self) -> &ScenarioConfig {
        &self.config
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn emotional_state(&self) -> EmotionalState {
        self.mood
    }

    pub fn memory(&self) -> &ProspectMemory {
        &self.memory
    }

    pub fn conversation_state(&self) -> ConversationState {
        ConversationState {
            phase: self.phase,
            turn_count: self.history.len(),
            emotional_state: self.mood,
            conversation_history: self.history.clone(),
        }
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            phase: self.phase,
            memory: self.memory.clone(),
            emotional_state: Some(self.mood),
        }
    }

    pub fn to_record(
        &self,
        user_id: &str,
        created_at: DateTime<Utc>,
        last_activity: DateTime<Utc>,
    ) -> ConversationRecord {
        ConversationRecord {
            call_id: self.call_id.clone(),
            user_id: user_id.to_string(),
            last_activity,
            conversation_history: self.history.clone(),
            scenario_config: self.config.clone(),
            created_at,
            engine_state: self.snapshot(),
        }
    }

    /// Produce the prospect's reply to one rep message.
    ///
    /// The rep turn and the reply are appended to the transcript only when
    /// the LLM answers; on error the engine is left as it was.
    pub async fn generate_response(
        &mut self,
        rep_message: &str,
        llm: &dyn LlmClient,
        compiler: &PromptCompiler,
        max_retries: u32,
    ) -> Result<String, EngineError> {
        let rep_message = rep_message.trim();
        if rep_message.is_empty() {
            return Err(EngineError::EmptyMessage);
        }

        self.history.push(Turn::rep(rep_message));
        let reply = match self.ask(llm, compiler, max_retries).await {
            Ok(reply) => reply,
            Err(e) => {
                self.history.pop();
                return Err(e);
            }
        };
        self.history.push(Turn::ai(reply.clone()));

        self.advance_phase(rep_message);
        self.remember(rep_message, &reply);
        self.mood = self.config.emotional_state.unwrap_or_else(|| {
            compiler.emotional_drift(&self.history, self.config.difficulty)
        });

        tracing::debug!(
            call_id = %self.call_id,
            phase = self.phase.as_str(),
            mood = self.mood.as_str(),
            turns = self.history.len(),
            "Prospect replied"
        );
        Ok(reply)
    }

    fn build_messages(&self, compiler: &PromptCompiler) -> Vec<LlmMessage> {
        let ctx = PromptContext::from_scenario(&self.config, &self.history);
        let recent = prompt::tail(&self.history, compiler.history_window());

        let mut messages = Vec::with_capacity(recent.len() + 1);
        messages.push(LlmMessage::system(compiler.compile(&ctx)));
        messages.extend(recent.iter().map(|turn| match turn.role {
            Role::Rep => LlmMessage::user(turn.content.clone()),
            Role::Ai => LlmMessage::assistant(turn.content.clone()),
        }));
        messages
    }

    async fn ask(
        &self,
        llm: &dyn LlmClient,
        compiler: &PromptCompiler,
        max_retries: u32,
    ) -> Result<String, EngineError> {
        let difficulty = self.config.difficulty;
        let mut messages = self.build_messages(compiler);
        let mut reply = non_empty(llm.complete(&messages).await?)?;

        for attempt in 1..=max_retries {
            let check = compiler.validate_reply(&reply, difficulty);
            let Some(nudge) = check.nudge.filter(|_| !check.is_valid) else {
                return Ok(reply);
            };
            tracing::debug!(
                call_id = %self.call_id,
                attempt,
                issue = ?check.issue,
                "Reply failed lint, re-asking"
            );
            messages.push(LlmMessage::assistant(reply));
            messages.push(LlmMessage::system(nudge));
            reply = non_empty(llm.complete(&messages).await?)?;
        }

        let check = compiler.validate_reply(&reply, difficulty);
        if check.is_valid {
            return Ok(reply);
        }
        tracing::warn!(
            call_id = %self.call_id,
            issue = ?check.issue,
            "Reply still failed lint after retries, trimming"
        );
        Ok(truncate_reply(&reply, compiler.max_reply_chars()))
    }

    fn advance_phase(&mut self, rep_message: &str) {
        let text = prompt::normalize(rep_message);
        let has = |words: &[&str]| words.iter().any(|w| text.contains(w));

        let next = if has(OBJECTION_KEYWORDS) {
            Some(CallPhase::Objections)
        } else if has(CLOSING_KEYWORDS) {
            Some(CallPhase::Closing)
        } else if has(PRESENTATION_KEYWORDS) {
            Some(CallPhase::Presentation)
        } else if self.phase == CallPhase::Opening && text.contains('?') {
            Some(CallPhase::Discovery)
        } else {
            None
        };

        if let Some(phase) = next.filter(|p| *p != self.phase) {
            tracing::debug!(
                call_id = %self.call_id,
                from = self.phase.as_str(),
                to = phase.as_str(),
                "Call phase changed"
            );
            self.phase = phase;
        }
    }

    fn remember(&mut self, rep_message: &str, reply: &str) {
        let rep = prompt::normalize(rep_message);
        let prospect = prompt::normalize(reply);

        if rep.contains('?') {
            self.memory.rep_questions_asked += 1;
        }

        let delta = prompt::score_rep_turn(rep_message);
        self.memory.rapport = (self.memory.rapport as i32 + delta)
            .clamp(RAPPORT_MIN as i32, RAPPORT_MAX as i32) as i8;

        for (marker, label) in OBJECTION_MARKERS {
            if prospect.contains(marker) {
                push_unique(&mut self.memory.objections_raised, label);
            }
        }
        for topic in TOPIC_KEYWORDS {
            if contains_word(&rep, topic) {
                push_unique(&mut self.memory.topics_mentioned, topic);
            }
        }
    }
}

fn non_empty(reply: String) -> Result<String, EngineError> {
    let trimmed = reply.trim();
    if trimmed.is_empty() {
        Err(EngineError::EmptyReply)
    } else if trimmed.len() == reply.len() {
        Ok(reply)
    } else {
        Ok(trimmed.to_string())
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|existing| existing == item) {
        list.push(item.to_string());
    }
}

fn contains_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// Cut `text` to at most `max_chars`, backing up to the last sentence end or
/// word boundary when one is available.
fn truncate_reply(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    if let Some(end) = cut.rfind(['.', '?', '!']) {
        if end > 0 {
            return cut[..=end].to_string();
        }
    }
    match cut.rfind(char::is_whitespace) {
        Some(space) if space > 0 => cut[..space].trim_end().to_string(),
        _ => cut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmRole, MockLlm};
    use prospect_core::types::{CallType, Difficulty, Seniority};

    fn scenario(level: u8) -> ScenarioConfig {
        ScenarioConfig {
            seniority: Seniority::Director,
            call_type: CallType::DiscoveryOutbound,
            scenario: "team is missing forecast targets".to_string(),
            difficulty: Difficulty::new(level).unwrap(),
            prospect_name: Some("Dana".to_string()),
            company: None,
            emotional_state: None,
            extra: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_generate_appends_both_turns() {
        let llm = MockLlm::new().with_replies(["Who is this?"]);
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));

        let reply = engine
            .generate_response("Hi Dana, it's Sam from Acme.", &llm, &compiler, 1)
            .await
            .unwrap();

        assert_eq!(reply, "Who is this?");
        assert_eq!(engine.history().len(), 2);
        assert_eq!(engine.history()[0].role, Role::Rep);
        assert_eq!(engine.history()[1].content, "Who is this?");
    }

    #[tokio::test]
    async fn test_generate_sends_system_prompt_then_turns() {
        let llm = MockLlm::new().recording();
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));
        engine
            .generate_response("Is now a bad time?", &llm, &compiler, 0)
            .await
            .unwrap();

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        let sent = &requests[0];
        assert_eq!(sent[0].role, LlmRole::System);
        assert!(sent[0].content.contains("Your name is Dana."));
        assert_eq!(sent.last().unwrap().role, LlmRole::User);
        assert_eq!(sent.last().unwrap().content, "Is now a bad time?");
    }

    #[tokio::test]
    async fn test_generate_rejects_empty_message() {
        let llm = MockLlm::new().recording();
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));
        let err = engine
            .generate_response("   ", &llm, &compiler, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyMessage));
        assert!(llm.requests().is_empty());
    }

    #[tokio::test]
    async fn test_generate_llm_failure_leaves_history_untouched() {
        let llm = MockLlm::new().with_failure("upstream 500");
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));
        let err = engine
            .generate_response("Hello?", &llm, &compiler, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::LlmError(_)));
        assert!(engine.history().is_empty());
        assert_eq!(engine.phase(), CallPhase::Opening);
    }

    #[tokio::test]
    async fn test_generate_re_asks_with_nudge_after_role_swap() {
        let llm = MockLlm::new().recording().with_replies([
            "How can I help you today?",
            "I'm busy. What do you want?",
        ]);
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));
        let reply = engine
            .generate_response("Hi, it's Sam.", &llm, &compiler, 1)
            .await
            .unwrap();

        assert_eq!(reply, "I'm busy. What do you want?");
        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        let retry = &requests[1];
        let nudge = retry.last().unwrap();
        assert_eq!(nudge.role, LlmRole::System);
        assert!(nudge.content.contains("Stay in character"));
    }

    #[tokio::test]
    async fn test_generate_trims_when_retries_exhausted() {
        let long = format!("{} Anyway, no.", "We already looked at this. ".repeat(20));
        let llm = MockLlm::new().recording().with_replies([long.clone(), long]);
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(2));
        let reply = engine
            .generate_response("Can I ask about your process?", &llm, &compiler, 1)
            .await
            .unwrap();

        assert!(reply.chars().count() <= compiler.max_reply_chars());
        assert!(reply.ends_with('.'));
        assert_eq!(llm.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_generate_rejects_blank_reply() {
        let llm = MockLlm::new().with_replies(["   "]);
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));
        let err = engine
            .generate_response("Hello there, quick question?", &llm, &compiler, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyReply));
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let llm = MockLlm::new();
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));
        assert_eq!(engine.phase(), CallPhase::Opening);

        engine
            .generate_response("How is the team handling forecasting today?", &llm, &compiler, 0)
            .await
            .unwrap();
        assert_eq!(engine.phase(), CallPhase::Discovery);

        engine
            .generate_response("Our product automates the rollup for you.", &llm, &compiler, 0)
            .await
            .unwrap();
        assert_eq!(engine.phase(), CallPhase::Presentation);

        engine
            .generate_response("Let's talk about pricing for your team.", &llm, &compiler, 0)
            .await
            .unwrap();
        assert_eq!(engine.phase(), CallPhase::Objections);

        engine
            .generate_response("Could we schedule thirty minutes Thursday?", &llm, &compiler, 0)
            .await
            .unwrap();
        assert_eq!(engine.phase(), CallPhase::Closing);
    }

    #[tokio::test]
    async fn test_memory_tracks_rapport_questions_topics_objections() {
        let llm = MockLlm::new().with_replies([
            "Honestly it's not a priority and we already have a vendor.",
            "Fine.",
        ]);
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));

        engine
            .generate_response(
                "I understand onboarding is slow. What's the security review like?",
                &llm,
                &compiler,
                0,
            )
            .await
            .unwrap();
        let memory = engine.memory();
        assert_eq!(memory.rapport, 1);
        assert_eq!(memory.rep_questions_asked, 1);
        assert!(memory.topics_mentioned.contains(&"onboarding".to_string()));
        assert!(memory.topics_mentioned.contains(&"security".to_string()));
        assert!(memory.objections_raised.contains(&"priority".to_string()));
        assert!(memory.objections_raised.contains(&"incumbent".to_string()));

        engine
            .generate_response("Just wanted to touch base.", &llm, &compiler, 0)
            .await
            .unwrap();
        assert_eq!(engine.memory().rapport, 0);
    }

    #[tokio::test]
    async fn test_rapport_is_clamped() {
        let llm = MockLlm::new();
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-1", scenario(3));
        for _ in 0..8 {
            engine
                .generate_response("ok", &llm, &compiler, 0)
                .await
                .unwrap();
        }
        assert_eq!(engine.memory().rapport, RAPPORT_MIN);
    }

    #[tokio::test]
    async fn test_mood_drifts_unless_pinned() {
        let llm = MockLlm::new();
        let compiler = PromptCompiler::default();

        let mut drifting = ProspectEngine::new("call-1", scenario(3));
        assert_eq!(drifting.emotional_state(), EmotionalState::Neutral);
        drifting
            .generate_response("I understand that's a real challenge for you.", &llm, &compiler, 0)
            .await
            .unwrap();
        assert_eq!(drifting.emotional_state(), EmotionalState::Warming);

        let mut pinned_config = scenario(3);
        pinned_config.emotional_state = Some(EmotionalState::Guarded);
        let mut pinned = ProspectEngine::new("call-2", pinned_config);
        pinned
            .generate_response("I understand that's a real challenge for you.", &llm, &compiler, 0)
            .await
            .unwrap();
        assert_eq!(pinned.emotional_state(), EmotionalState::Guarded);
    }

    #[tokio::test]
    async fn test_record_round_trip_restores_engine() {
        let llm = MockLlm::new();
        let compiler = PromptCompiler::default();
        let mut engine = ProspectEngine::new("call-7", scenario(4));
        engine
            .generate_response("What does your budget cycle look like?", &llm, &compiler, 0)
            .await
            .unwrap();

        let created = Utc::now();
        let record = engine.to_record("user-1", created, Utc::now());
        assert_eq!(record.user_id, "user-1");
        assert_eq!(record.engine_state.phase, CallPhase::Objections);

        let restored = ProspectEngine::from_record(record);
        assert_eq!(restored.call_id(), "call-7");
        assert_eq!(restored.history(), engine.history());
        assert_eq!(restored.phase(), engine.phase());
        assert_eq!(restored.memory(), engine.memory());
        assert_eq!(restored.emotional_state(), engine.emotional_state());
    }

    #[test]
    fn test_conversation_state_serializes_camel_case() {
        let engine = ProspectEngine::with_history(
            "call-1",
            scenario(5),
            vec![Turn::rep("hello"), Turn::ai("Who is this?")],
        );
        let value = serde_json::to_value(engine.conversation_state()).unwrap();
        assert_eq!(value["turnCount"], 2);
        assert_eq!(value["phase"], "opening");
        assert_eq!(value["emotionalState"], "guarded");
        assert_eq!(value["conversationHistory"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_truncate_reply() {
        assert_eq!(truncate_reply("Short.", 300), "Short.");
        assert_eq!(truncate_reply("One. Two three four", 12), "One.");
        assert_eq!(truncate_reply("alpha beta gamma", 12), "alpha beta");
        assert_eq!(truncate_reply("abcdefghij", 4), "abcd");
    }

    #[test]
    fn test_contains_word_matches_whole_tokens() {
        assert!(contains_word("what's the roi here", "roi"));
        assert!(!contains_word("the heroic effort", "roi"));
    }
}
