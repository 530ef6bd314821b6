//! OpenAI-compatible chat completions (`POST {base_url}/chat/completions`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, CompletionRequest, CompletionService};
use crate::config::{api_key_from_env, CompletionConfig};
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::retry::{with_retry, RetryPolicy};

const DEP: Dependency = Dependency::Completion;

pub struct OpenAiCompletionService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    policy: RetryPolicy,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenAiCompletionService {
    pub fn new(api_key: String, config: &CompletionConfig, policy: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            policy,
        }
    }

    pub fn from_config(config: &CompletionConfig, policy: RetryPolicy) -> anyhow::Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self::new(api_key, config, policy))
    }

    async fn send_once(&self, request: &CompletionRequest) -> MemoryResult<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature.unwrap_or(self.temperature),
            max_tokens: self.max_tokens,
            response_format: ResponseFormat { kind: "json_object" },
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| MemoryError::Unavailable(DEP, format!("request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MemoryError::Unavailable(DEP, format!("failed to read body: {e}")))?;

        if !status.is_success() {
            return Err(MemoryError::from_status(DEP, status.as_u16(), &text));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| MemoryError::InvalidResponse(DEP, e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| MemoryError::InvalidResponse(DEP, "empty completion".into()))
    }
}

#[async_trait]
impl CompletionService for OpenAiCompletionService {
    async fn complete(&self, request: &CompletionRequest) -> MemoryResult<String> {
        debug!(task = ?request.task, messages = request.messages.len(), model = %self.model, "requesting completion");
        with_retry(&self.policy, DEP, "complete", || self.send_once(request)).await
    }
}
