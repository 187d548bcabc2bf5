//! Prompt compiler and reply linter.
//!
//! `PromptCompiler::compile` layers canned framing text for the prospect's
//! seniority, the call type, and the difficulty, adds a mood line derived
//! from the recent turns, the response-style rules, and a short transcript.
//! It is a pure function of its inputs.
//!
//! `PromptCompiler::validate_reply` lints what the LLM sends back: role
//! swaps, overlong replies, and pushover agreement at high difficulty.

use serde::{Deserialize, Serialize};

use prospect_core::config::PromptConfig;
use prospect_core::types::{
    CallType, Difficulty, EmotionalState, Role, ScenarioConfig, Seniority, Turn,
};

/// Phrases that mean the model slipped out of the buyer role. Matched on
/// word boundaries.
const ROLE_SWAP_PHRASES: &[&str] = &[
    "how can i help you",
    "how may i help you",
    "how can i assist",
    "what can i do for you",
    "as your sales rep",
    "let me tell you about our product",
    "our product can help you",
    "i'd be happy to show you",
    "as an ai",
    "i am an ai",
    "i'm an ai",
    "as a language model",
];

/// Stock agreement a hard prospect would never offer.
const AGREEABLE_PHRASES: &[&str] = &[
    "sounds great",
    "perfect solution",
    "that's exactly what we need",
    "sign me up",
    "i'm sold",
    "let's do it",
    "where do i sign",
];

/// Rep phrasing that shows curiosity or empathy.
const WARMING_KEYWORDS: &[&str] = &[
    "understand",
    "challenge",
    "tell me more",
    "curious",
    "walk me through",
    "what matters",
    "how are you handling",
    "priority",
    "impact",
];

/// Rep phrasing that sounds scripted or evasive.
const VAGUE_MARKERS: &[&str] = &[
    "basically",
    "kind of",
    "sort of",
    "just checking",
    "just wanted to",
    "touch base",
    "whatever",
    "stuff",
];

/// Rep turns with fewer words than this count as vague.
const SHORT_TURN_WORDS: usize = 4;

/// Difficulty at and above which agreeable phrases are rejected.
const SKEPTICAL_DIFFICULTY: u8 = 4;

pub fn seniority_framing(seniority: Seniority) -> &'static str {
    match seniority {
        Seniority::IndividualContributor => {
            "You are an individual contributor who would use a tool like this every day. \
             You care about whether it makes your own work easier, and you have no budget \
             authority; any purchase needs your manager's sign-off."
        }
        Seniority::Manager => {
            "You are a front-line manager responsible for a small team's results. You care \
             about team productivity, adoption effort, and hitting this quarter's targets, and \
             you can influence but not approve larger purchases."
        }
        Seniority::Director => {
            "You are a director who owns a department's operating plan. You weigh every \
             initiative against headcount and budget, you expect a clear business case, and \
             you delegate detailed evaluation to your managers."
        }
        Seniority::Vp => {
            "You are a VP-level executive. You think in terms of strategic outcomes, revenue \
             impact, and risk across several teams. Your time is scarce and you expect the rep \
             to get to the point quickly."
        }
        Seniority::CSuite => {
            "You are a C-level executive. You only engage with ideas that move company-level \
             metrics, you are used to gatekeepers screening your calls, and you will end the \
             call quickly if it sounds like a generic pitch."
        }
    }
}

pub fn call_type_framing(call_type: CallType) -> &'static str {
    match call_type {
        CallType::DiscoveryOutbound => {
            "This is an outbound discovery call. The sales rep reached out to you unprompted; \
             you did not ask for this conversation and you are in the middle of your workday."
        }
        CallType::DiscoveryInbound => {
            "This is an inbound discovery call. You requested information, so you have some \
             interest, but you are still comparing options and have not committed to anything."
        }
        CallType::DemoFollowUp => {
            "This is a follow-up call after you saw a product demo. You remember the demo in \
             broad strokes and you now have concrete questions about fit, effort, and cost."
        }
        CallType::Closing => {
            "This is a late-stage call about moving forward. You are seriously considering the \
             purchase, but you still need to be convinced on terms, timing, and risk before \
             you commit."
        }
    }
}

pub fn difficulty_behavior(difficulty: Difficulty) -> &'static str {
    match difficulty.level() {
        1 => {
            "Be friendly and open. Share information readily, answer questions fully, and \
             raise at most one mild concern."
        }
        2 => {
            "Be cooperative but busy. Answer questions honestly, ask a clarifying question now \
             and then, and raise an occasional practical concern."
        }
        3 => {
            "Be professionally neutral. Make the rep earn each piece of information, raise \
             realistic objections about priority and cost, and do not volunteer your pain \
             points."
        }
        4 => {
            "Be skeptical and pressed for time. Challenge vague claims, push back on price and \
             switching effort, and keep your answers short until the rep asks sharp questions."
        }
        _ => {
            "Be hostile to being sold to. Interrupt generic pitches, question the rep's \
             credibility, threaten to end the call, and concede nothing without specific, \
             relevant proof."
        }
    }
}

fn mood_description(state: EmotionalState) -> &'static str {
    match state {
        EmotionalState::Receptive => "You are open to the conversation and willing to share.",
        EmotionalState::Neutral => "You are polite but noncommittal.",
        EmotionalState::Guarded => "You are wary and give little away until trust is earned.",
        EmotionalState::Warming => {
            "The rep has shown real understanding; you are starting to open up."
        }
        EmotionalState::Engaged => {
            "The rep has earned your interest; you are actively exploring whether this could help."
        }
        EmotionalState::Dismissive => {
            "The rep sounds vague or scripted; you are losing patience and looking for a way to \
             end the call."
        }
    }
}

/// Mood the prospect starts from before any drift.
pub fn baseline_mood(difficulty: Difficulty) -> EmotionalState {
    match difficulty.level() {
        1 | 2 => EmotionalState::Receptive,
        3 => EmotionalState::Neutral,
        _ => EmotionalState::Guarded,
    }
}

/// Everything the compiler needs for one prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub seniority: Seniority,
    pub call_type: CallType,
    pub scenario: &'a str,
    pub difficulty: Difficulty,
    pub conversation_history: &'a [Turn],
    pub emotional_state: Option<EmotionalState>,
    pub prospect_name: Option<&'a str>,
    pub company: Option<&'a str>,
}

impl<'a> PromptContext<'a> {
    pub fn from_scenario(config: &'a ScenarioConfig, history: &'a [Turn]) -> Self {
        Self {
            seniority: config.seniority,
            call_type: config.call_type,
            scenario: &config.scenario,
            difficulty: config.difficulty,
            conversation_history: history,
            emotional_state: config.emotional_state,
            prospect_name: config.prospect_name.as_deref(),
            company: config.company.as_deref(),
        }
    }
}

/// Why a reply was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplyIssue {
    RoleSwap,
    TooLong,
    TooAgreeable,
}

/// Outcome of linting one LLM reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyCheck {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<ReplyIssue>,
    /// Corrective instruction to send with a retry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nudge: Option<String>,
}

impl ReplyCheck {
    fn ok() -> Self {
        Self {
            is_valid: true,
            issue: None,
            nudge: None,
        }
    }

    fn rejected(issue: ReplyIssue, nudge: String) -> Self {
        Self {
            is_valid: false,
            issue: Some(issue),
            nudge: Some(nudge),
        }
    }
}

/// Builds prospect prompts and lints replies.
#[derive(Debug, Clone)]
pub struct PromptCompiler {
    history_window: usize,
    drift_window: usize,
    max_reply_chars: usize,
}

impl Default for PromptCompiler {
    fn default() -> Self {
        Self::new(&PromptConfig::default())
    }
}

impl PromptCompiler {
    pub fn new(config: &PromptConfig) -> Self {
        Self {
            history_window: config.history_window,
            drift_window: config.drift_window,
            max_reply_chars: config.max_reply_chars,
        }
    }

    pub fn max_reply_chars(&self) -> usize {
        self.max_reply_chars
    }

    /// Number of trailing turns shown to the model.
    pub fn history_window(&self) -> usize {
        self.history_window
    }

    /// Compile the system prompt for the prospect.
    pub fn compile(&self, ctx: &PromptContext<'_>) -> String {
        let mut sections: Vec<String> = Vec::with_capacity(6);

        sections.push(seniority_framing(ctx.seniority).to_string());

        let mut call = String::from(call_type_framing(ctx.call_type));
        call.push_str("\nScenario: ");
        call.push_str(ctx.scenario.trim());
        if let Some(name) = ctx.prospect_name {
            call.push_str(&format!("\nYour name is {}.", name));
        }
        if let Some(company) = ctx.company {
            call.push_str(&format!("\nYou work at {}.", company));
        }
        sections.push(call);

        sections.push(difficulty_behavior(ctx.difficulty).to_string());

        let mood = ctx
            .emotional_state
            .unwrap_or_else(|| self.emotional_drift(ctx.conversation_history, ctx.difficulty));
        sections.push(format!(
            "Current mood: {}. {}",
            mood.as_str(),
            mood_description(mood)
        ));

        sections.push(format!(
            "Response rules: Stay in character as the prospect for the whole call; you are the \
             buyer, never the salesperson. Reply in one to three short spoken sentences, under \
             {} characters. Use natural conversational language with no lists, no stage \
             directions, and no narration. Never mention that you are an AI or that this is a \
             roleplay.",
            self.max_reply_chars
        ));

        let recent = tail(ctx.conversation_history, self.history_window);
        if !recent.is_empty() {
            let mut transcript = String::from("Recent conversation:");
            for turn in recent {
                let speaker = match turn.role {
                    Role::Rep => "Sales rep",
                    Role::Ai => "Prospect",
                };
                transcript.push_str(&format!("\n{}: {}", speaker, turn.content.trim()));
            }
            sections.push(transcript);
        }

        sections.join("\n\n")
    }

    /// Mood after scanning the rep's recent turns for warming or vague
    /// phrasing.
    pub fn emotional_drift(&self, history: &[Turn], difficulty: Difficulty) -> EmotionalState {
        let score: i32 = tail(history, self.drift_window)
            .iter()
            .filter(|t| t.role == Role::Rep)
            .map(|t| score_rep_turn(&t.content))
            .sum();

        match score {
            s if s >= 2 => EmotionalState::Engaged,
            1 => EmotionalState::Warming,
            0 => baseline_mood(difficulty),
            _ => EmotionalState::Dismissive,
        }
    }

    /// Lint a reply. Checks run in order and the first failure wins.
    pub fn validate_reply(&self, reply: &str, difficulty: Difficulty) -> ReplyCheck {
        let normalized = normalize(reply);

        if ROLE_SWAP_PHRASES
            .iter()
            .any(|p| contains_phrase(&normalized, p))
        {
            return ReplyCheck::rejected(
                ReplyIssue::RoleSwap,
                "Stay in character: you are the prospect being sold to, not the salesperson or \
                 an assistant. Reply as the buyer."
                    .to_string(),
            );
        }

        if reply.chars().count() > self.max_reply_chars {
            return ReplyCheck::rejected(
                ReplyIssue::TooLong,
                format!(
                    "Your last reply was too long. Answer again in under {} characters.",
                    self.max_reply_chars
                ),
            );
        }

        if difficulty.level() >= SKEPTICAL_DIFFICULTY
            && AGREEABLE_PHRASES
                .iter()
                .any(|p| contains_phrase(&normalized, p))
        {
            return ReplyCheck::rejected(
                ReplyIssue::TooAgreeable,
                "You are a skeptical prospect. Do not agree so easily; raise a concern or ask a \
                 pointed question instead."
                    .to_string(),
            );
        }

        ReplyCheck::ok()
    }
}

pub(crate) fn tail(turns: &[Turn], n: usize) -> &[Turn] {
    &turns[turns.len().saturating_sub(n)..]
}

/// Lowercase and fold typographic apostrophes so phrase lists match.
pub(crate) fn normalize(text: &str) -> String {
    text.to_lowercase().replace(['\u{2019}', '\u{2018}'], "'")
}

/// Whether `phrase` occurs in `text` with no letter or digit directly
/// before or after it.
pub(crate) fn contains_phrase(text: &str, phrase: &str) -> bool {
    text.match_indices(phrase).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + phrase.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// +1 for curiosity or empathy, -1 for a vague or clipped turn.
pub(crate) fn score_rep_turn(content: &str) -> i32 {
    let text = normalize(content);
    if WARMING_KEYWORDS.iter().any(|k| text.contains(k)) {
        1
    } else if text.split_whitespace().count() < SHORT_TURN_WORDS
        || VAGUE_MARKERS.iter().any(|m| text.contains(m))
    {
        -1
    } else {
        0
    }
}
