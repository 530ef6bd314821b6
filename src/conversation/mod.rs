//! Multi-turn exploration state machine.
//!
//! States run `exploring -> deepening -> ready -> resolved`. Each user turn
//! gathers profile and retrieved context concurrently, asks the completion
//! service for a reply plus a readiness score, and advances the state. The
//! turn-count floors apply regardless of what the model reports.
//!
//! The orchestrator is request-driven: it holds no per-session background work.
//! Dropping an [`Orchestrator::advance`] future abandons its outstanding calls.

pub mod session;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::{normalize_confidence, ClassificationResult, Classifier};
use crate::config::ConversationConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::llm::{
    parse_json_object, ChatMessage, CompletionRequest, CompletionService, CompletionTask,
};
use crate::memory::behavior::BehaviorTracker;
use crate::memory::profile::{ProfileBuilder, UserProfile};
use crate::memory::search::{RankedItem, Retriever};
use crate::memory::types::{ActionType, BehaviorEvent, ContentType, OwnerId, Speaker, Turn};

pub use session::SessionStore;

const CONTEXT_PREVIEW_CHARS: usize = 200;
/// Accumulated user words at which the fallback depth estimate reaches 1.0.
const FALLBACK_FULL_DEPTH_WORDS: usize = 80;
const FALLBACK_REPLY: &str = "Tell me more about that. What makes it matter to you right now?";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Exploring,
    Deepening,
    Ready,
    Resolved,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exploring => "exploring",
            Self::Deepening => "deepening",
            Self::Ready => "ready",
            Self::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    pub session_id: String,
    pub owner_id: OwnerId,
    pub turns: Vec<Turn>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationSession {
    pub fn new(owner_id: OwnerId) -> Self {
        let now = Utc::now();
        Self {
            session_id: uuid::Uuid::now_v7().to_string(),
            owner_id,
            turns: Vec::new(),
            state: SessionState::Exploring,
            created_at: now,
            updated_at: now,
        }
    }

    /// Number of user turns so far.
    pub fn user_turns(&self) -> usize {
        self.turns.iter().filter(|t| t.speaker == Speaker::User).count()
    }

    /// All user text, oldest first.
    pub fn user_text(&self) -> String {
        self.turns
            .iter()
            .filter(|t| t.speaker == Speaker::User)
            .map(|t| t.text.trim())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The organized result shown to the user once a session resolves.
#[derive(Debug, Clone, Serialize)]
pub struct StructuredPresentation {
    pub content_type: ContentType,
    pub confidence: f64,
    pub fields: BTreeMap<String, String>,
    pub rationale: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdvanceOutcome {
    pub reply: String,
    pub state: SessionState,
    pub readiness: f64,
    /// Set only when the session resolved on this turn.
    pub structured: Option<StructuredPresentation>,
    /// Set whenever classification was attempted on this turn.
    pub classification: Option<ClassificationResult>,
    pub context: Vec<RankedItem>,
}

#[derive(Debug, Deserialize)]
struct ModelReply {
    reply: String,
    #[serde(rename = "readinessScore", alias = "readiness_score", alias = "readiness")]
    readiness_score: serde_json::Number,
}

pub struct Orchestrator {
    retriever: Arc<Retriever>,
    profiles: Arc<ProfileBuilder>,
    classifier: Arc<Classifier>,
    llm: Arc<dyn CompletionService>,
    behavior: Arc<BehaviorTracker>,
    config: ConversationConfig,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        profiles: Arc<ProfileBuilder>,
        classifier: Arc<Classifier>,
        llm: Arc<dyn CompletionService>,
        behavior: Arc<BehaviorTracker>,
        config: ConversationConfig,
    ) -> Self {
        Self {
            retriever,
            profiles,
            classifier,
            llm,
            behavior,
            config,
        }
    }

    /// Apply one user turn to `session`.
    ///
    /// Errors only on caller mistakes (blank input, a resolved session) or an
    /// isolation violation. Dependency failures degrade the reply instead.
    pub async fn advance(
        &self,
        session: &mut ConversationSession,
        input: &str,
    ) -> MemoryResult<AdvanceOutcome> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MemoryError::InvalidInput("conversation input is empty".into()));
        }
        if session.state == SessionState::Resolved {
            return Err(MemoryError::InvalidInput(format!(
                "session {} is already resolved",
                session.session_id
            )));
        }

        session.turns.push(Turn::user(input));
        let turns = session.user_turns();

        let opts = self.retriever.context_options(self.config.context_top_k);
        let (profile, context) = tokio::join!(
            self.profiles.get_profile(&session.owner_id, false),
            self.retriever.retrieve(&session.owner_id, input, &opts),
        );
        let context = match context {
            Ok(context) => context,
            Err(e) => {
                session.turns.pop();
                return Err(e);
            }
        };

        let (mut reply, readiness) = self.generate_reply(session, &profile, &context).await;

        let previous = session.state;
        if session.state == SessionState::Exploring && turns >= self.config.deepening_min_turns {
            session.state = SessionState::Deepening;
        }
        if session.state == SessionState::Deepening
            && readiness > self.config.readiness_gate
            && turns >= self.config.ready_min_turns
        {
            session.state = SessionState::Ready;
        }

        let mut classification = None;
        let mut structured = None;
        if session.state == SessionState::Ready {
            let result = self.classifier.classify(&session.user_text(), &session.turns).await?;
            if result.needs_confirmation {
                session.state = SessionState::Deepening;
                reply = follow_up_question(&result);
            } else {
                session.state = SessionState::Resolved;
                let presentation = present(&result);
                reply = format!(
                    "This reads like a {}. {}",
                    presentation.content_type, presentation.rationale
                );
                let event = BehaviorEvent::new(
                    session.owner_id.clone(),
                    ActionType::ThoughtOrganized,
                    &session.session_id,
                )
                .with_payload(serde_json::json!({
                    "content_type": presentation.content_type,
                    "confidence": presentation.confidence,
                    "turns": turns,
                }));
                self.behavior.record_best_effort(event).await;
                structured = Some(presentation);
            }
            classification = Some(result);
        }

        session.turns.push(Turn::assistant(reply.clone()));
        session.updated_at = Utc::now();

        if session.state != previous {
            info!(session = %session.session_id, from = %previous, to = %session.state, turns, "conversation state changed");
        }
        let event = BehaviorEvent::new(
            session.owner_id.clone(),
            ActionType::ChatInteraction,
            &session.session_id,
        )
        .with_payload(serde_json::json!({
            "state": session.state,
            "readiness": readiness,
            "context_items": context.len(),
        }));
        self.behavior.record_best_effort(event).await;

        Ok(AdvanceOutcome {
            reply,
            state: session.state,
            readiness,
            structured,
            classification,
            context,
        })
    }

    async fn generate_reply(
        &self,
        session: &ConversationSession,
        profile: &UserProfile,
        context: &[RankedItem],
    ) -> (String, f64) {
        let request = self.reply_request(session, profile, context);
        let parsed = match self.llm.complete(&request).await {
            Ok(raw) => parse_json_object::<ModelReply>(&raw).and_then(|r| {
                let readiness = normalize_confidence(&r.readiness_score)?;
                Ok((r.reply.trim().to_string(), readiness))
            }),
            Err(e) => Err(e),
        };

        match parsed {
            Ok((reply, readiness)) if !reply.is_empty() => {
                debug!(session = %session.session_id, readiness, "reply generated");
                (reply, readiness)
            }
            Ok(_) => (FALLBACK_REPLY.to_string(), fallback_readiness(session)),
            Err(e) => {
                warn!(session = %session.session_id, error = %e, "reply degraded to generic follow-up");
                (FALLBACK_REPLY.to_string(), fallback_readiness(session))
            }
        }
    }

    fn reply_request(
        &self,
        session: &ConversationSession,
        profile: &UserProfile,
        context: &[RankedItem],
    ) -> CompletionRequest {
        let mut system = String::from(
            "You help a person explore a thought until it is clear enough to organize. \
             Ask one focused question at a time and reflect back what you hear.\n",
        );
        system.push_str(&format!("About this person: {}\n", profile.prompt_summary()));
        if !context.is_empty() {
            system.push_str("Related things they wrote before:\n");
            for item in context {
                let preview: String = item.preview.chars().take(CONTEXT_PREVIEW_CHARS).collect();
                let line = format!("- [{}] {}: {}\n", item.content_type, item.title, preview);
                system.push_str(&line);
            }
        }
        system.push_str(&format!(
            "Conversation stage: {}.\n\
             Respond with a JSON object: {{\"reply\": string, \"readinessScore\": 0.0-1.0}} where \
             readinessScore says how ready the thought is to be organized into a structure.",
            session.state
        ));

        let mut messages = vec![ChatMessage::system(system)];
        let start = session.turns.len().saturating_sub(self.config.recent_turns);
        for turn in &session.turns[start..] {
            messages.push(match turn.speaker {
                Speaker::User => ChatMessage::user(turn.text.clone()),
                Speaker::Assistant => ChatMessage::assistant(turn.text.clone()),
            });
        }
        CompletionRequest::new(CompletionTask::Reply, messages)
    }
}

/// Depth estimate from accumulated user words, in [0, 1].
pub fn fallback_readiness(session: &ConversationSession) -> f64 {
    let words = session.user_text().split_whitespace().count();
    (words as f64 / FALLBACK_FULL_DEPTH_WORDS as f64).min(1.0)
}

fn present(result: &ClassificationResult) -> StructuredPresentation {
    StructuredPresentation {
        content_type: result.content_type,
        confidence: result.confidence,
        fields: result.suggested_fields.clone(),
        rationale: result.reasoning.clone(),
    }
}

/// A targeted question for the most important missing field.
pub fn follow_up_question(result: &ClassificationResult) -> String {
    let question = match result.missing_information.first().map(|s| s.to_ascii_lowercase()) {
        Some(field) => match field.as_str() {
            "timeframe" | "timeline" => "When would you like this to happen? Is there a timeframe you have in mind?",
            "objectives" | "goals" => "What would you concretely like to achieve here?",
            "purpose" => "What deeper purpose or value does this connect to for you?",
            "heading" | "title" => "If you gave this a short title, what would it be?",
            "anchor" | "context" => "What was happening around you when this came up?",
            "pulse" | "emotion" => "How did it feel when you noticed this?",
            "summary" => "Can you sum it up in a sentence?",
            _ => "Can you tell me a bit more about that?",
        },
        None => "Can you tell me a bit more about that?",
    };

    let options: Vec<&str> = std::iter::once(result.content_type.as_str())
        .chain(result.alternatives.iter().map(|a| a.content_type.as_str()))
        .collect();
    format!("{question} (Possible structures: {}.)", options.join(", "))
}
