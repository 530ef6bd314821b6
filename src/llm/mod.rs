//! Chat completion seam.
//!
//! [`CompletionService`] returns raw model text. Every call site treats that
//! text as untrusted and goes through [`parse_json_object`] into its own typed
//! struct before validating it.

pub mod openai;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Dependency, MemoryError, MemoryResult};

/// Which component issued a completion, for logging and test doubles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionTask {
    /// Conversation reply plus readiness score.
    Reply,
    /// Thought classification.
    Classify,
    /// Interest and cognitive style extraction.
    Profile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A JSON-mode chat completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub task: CompletionTask,
    pub messages: Vec<ChatMessage>,
    /// Overrides the configured temperature when set.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(task: CompletionTask, messages: Vec<ChatMessage>) -> Self {
        Self {
            task,
            messages,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Return the assistant message content for `request`.
    async fn complete(&self, request: &CompletionRequest) -> MemoryResult<String>;
}

/// Parse the first JSON object found in model output.
///
/// Tolerates prose or code fences around the object. Anything that does not
/// deserialize into `T` is an `InvalidResponse`.
pub fn parse_json_object<T: DeserializeOwned>(raw: &str) -> MemoryResult<T> {
    let start = raw.find('{');
    let end = raw.rfind('}');
    let slice = match (start, end) {
        (Some(s), Some(e)) if e > s => &raw[s..=e],
        _ => {
            return Err(MemoryError::InvalidResponse(
                Dependency::Completion,
                "no JSON object in completion".into(),
            ))
        }
    };
    serde_json::from_str(slice)
        .map_err(|e| MemoryError::InvalidResponse(Dependency::Completion, e.to_string()))
}
