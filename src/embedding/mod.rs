//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait (one network call, no policy) and the
//! [`EmbeddingClient`] that every component uses: it validates input, head-truncates
//! long texts, retries transient failures through [`crate::retry::with_retry`], and
//! checks the returned dimension. The provider is created via [`create_provider`].

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{EmbeddingConfig, RetryConfig};
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::retry::{with_retry, RetryPolicy};

/// Default dimension of `text-embedding-3-small`.
pub const EMBEDDING_DIM: usize = 1536;

/// Rough characters-per-token estimate used to size head-truncation.
const CHARS_PER_TOKEN: usize = 4;

/// A rented text-to-vector service.
///
/// Implementations perform exactly one call per `embed` and classify their own
/// failures (`Unavailable` for transient, `Failed` for permanent).
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Model identifier, recorded alongside stored vectors.
    fn model(&self) -> &str;
}

/// Create an embedding provider from config.
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => {
            let provider = openai::OpenAiEmbeddingProvider::from_config(config)?;
            Ok(Arc::new(provider))
        }
        other => anyhow::bail!("unknown embedding provider: {other}. Supported: openai"),
    }
}

/// Policy wrapper around an [`EmbeddingProvider`].
#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    max_input_chars: usize,
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        policy: RetryPolicy,
        max_input_tokens: usize,
    ) -> Self {
        Self {
            provider,
            policy,
            max_input_chars: max_input_tokens.saturating_mul(CHARS_PER_TOKEN).max(1),
        }
    }

    pub fn from_config(
        provider: Arc<dyn EmbeddingProvider>,
        embedding: &EmbeddingConfig,
        retry: &RetryConfig,
    ) -> Self {
        Self::new(provider, RetryPolicy::from(retry), embedding.max_input_tokens)
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Embed `text` into a vector of exactly [`Self::dimensions`] floats.
    ///
    /// Returns `InvalidInput` for blank text and `EmbeddingUnavailable` once the
    /// retry budget is spent on transient failures.
    pub async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(MemoryError::InvalidInput("cannot embed empty text".into()));
        }

        let input = truncate_head(trimmed, self.max_input_chars);
        if input.len() < trimmed.len() {
            tracing::debug!(
                original_chars = trimmed.chars().count(),
                limit = self.max_input_chars,
                "truncated embedding input"
            );
        }

        let provider = &self.provider;
        let result = with_retry(&self.policy, Dependency::Embedding, "embed", move || {
            provider.embed(input)
        })
        .await;

        let vector = match result {
            Ok(vector) => vector,
            Err(err) if err.is_transient() => {
                return Err(MemoryError::EmbeddingUnavailable(err.to_string()));
            }
            Err(err) => return Err(err),
        };

        let expected = self.provider.dimensions();
        if vector.len() != expected {
            return Err(MemoryError::InvalidResponse(
                Dependency::Embedding,
                format!("expected {expected} dimensions, got {}", vector.len()),
            ));
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(MemoryError::InvalidResponse(
                Dependency::Embedding,
                "embedding contains non-finite values".into(),
            ));
        }

        Ok(vector)
    }
}

/// Keep the first `max_chars` characters of `text`, cut on a char boundary.
pub fn truncate_head(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Convert an f32 vector to little-endian bytes for SQLite BLOB storage.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a little-endian f32 BLOB. Trailing partial floats are ignored.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyProvider {
        failures_before_success: u32,
        calls: AtomicU32,
        dims: usize,
        last_len: std::sync::Mutex<usize>,
    }

    impl FlakyProvider {
        fn new(failures_before_success: u32, dims: usize) -> Self {
            Self {
                failures_before_success,
                calls: AtomicU32::new(0),
                dims,
                last_len: std::sync::Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
            *self.last_len.lock().unwrap() = text.chars().count();
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                return Err(MemoryError::Unavailable(Dependency::Embedding, "HTTP 503".into()));
            }
            Ok(vec![0.5; 4])
        }

        fn dimensions(&self) -> usize {
            self.dims
        }

        fn model(&self) -> &str {
            "flaky"
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            call_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn rejects_blank_input() {
        let client = EmbeddingClient::new(Arc::new(FlakyProvider::new(0, 4)), fast_policy(), 10);
        let err = client.embed("   \n").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let provider = Arc::new(FlakyProvider::new(2, 4));
        let client = EmbeddingClient::new(provider.clone(), fast_policy(), 10);
        let vector = client.embed("hello").await.unwrap();
        assert_eq!(vector.len(), 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_is_embedding_unavailable() {
        let provider = Arc::new(FlakyProvider::new(10, 4));
        let client = EmbeddingClient::new(provider.clone(), fast_policy(), 10);
        let err = client.embed("hello").await.unwrap_err();
        assert!(matches!(err, MemoryError::EmbeddingUnavailable(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_invalid_response() {
        let client = EmbeddingClient::new(Arc::new(FlakyProvider::new(0, 8)), fast_policy(), 10);
        let err = client.embed("hello").await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidResponse(Dependency::Embedding, _)));
    }

    #[tokio::test]
    async fn long_input_is_head_truncated() {
        let provider = Arc::new(FlakyProvider::new(0, 4));
        // 2 tokens -> 8 chars
        let client = EmbeddingClient::new(provider.clone(), fast_policy(), 2);
        client.embed("abcdefghijklmnop").await.unwrap();
        assert_eq!(*provider.last_len.lock().unwrap(), 8);
    }

    #[test]
    fn truncate_head_respects_char_boundaries() {
        assert_eq!(truncate_head("héllo wörld", 4), "héll");
        assert_eq!(truncate_head("short", 100), "short");
        assert_eq!(truncate_head("", 3), "");
    }

    #[test]
    fn blob_encoding_is_little_endian_f32() {
        let v = vec![1.0f32, -2.5, 0.0];
        let bytes = embedding_to_bytes(&v);
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes_to_embedding(&bytes), v);
    }
}
