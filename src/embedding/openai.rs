//! OpenAI-compatible embeddings endpoint (`POST {base_url}/embeddings`).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::EmbeddingProvider;
use crate::config::{api_key_from_env, EmbeddingConfig};
use crate::error::{Dependency, MemoryError, MemoryResult};

pub struct OpenAiEmbeddingProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    total_tokens: u32,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String, base_url: String, model: String, dimensions: usize) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            dimensions,
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = api_key_from_env(&config.api_key_env)?;
        Ok(Self::new(
            api_key,
            config.base_url.clone(),
            config.model.clone(),
            config.dimensions,
        ))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: vec![text],
            dimensions: self.dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                MemoryError::Unavailable(Dependency::Embedding, format!("request failed: {e}"))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                MemoryError::Unavailable(Dependency::Embedding, format!("failed to read body: {e}"))
            })?;

        if !status.is_success() {
            return Err(MemoryError::from_status(Dependency::Embedding, status.as_u16(), &body));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| MemoryError::InvalidResponse(Dependency::Embedding, e.to_string()))?;

        if let Some(usage) = &parsed.usage {
            debug!(tokens = usage.total_tokens, model = %self.model, "embedding tokens used");
        }

        parsed
            .data
            .into_iter()
            .min_by_key(|d| d.index)
            .map(|d| d.embedding)
            .ok_or_else(|| {
                MemoryError::InvalidResponse(Dependency::Embedding, "no embedding returned".into())
            })
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(server: &mockito::Server) -> OpenAiEmbeddingProvider {
        OpenAiEmbeddingProvider::new(
            "test-key".into(),
            format!("{}/v1/", server.url()),
            "text-embedding-3-small".into(),
            3,
        )
    }

    #[tokio::test]
    async fn parses_embedding_response() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/embeddings")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_body(
                r#"{"data":[{"embedding":[0.1,0.2,0.3],"index":0}],"model":"m",
                    "usage":{"prompt_tokens":2,"total_tokens":2}}"#,
            )
            .create_async()
            .await;

        let vector = provider(&server).embed("hello").await.unwrap();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limit_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(429)
            .with_body(r#"{"error":{"message":"rate limited"}}"#)
            .create_async()
            .await;

        let err = provider(&server).embed("hello").await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn bad_request_is_permanent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(400)
            .with_body("bad")
            .create_async()
            .await;

        let err = provider(&server).embed("hello").await.unwrap_err();
        assert!(matches!(err, MemoryError::Failed(Dependency::Embedding, _)));
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/embeddings")
            .with_status(200)
            .with_body("not json")
            .create_async()
            .await;

        let err = provider(&server).embed("hello").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidResponse(Dependency::Embedding, _)));
    }
}
