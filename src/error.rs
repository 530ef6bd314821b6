//! Error taxonomy shared by every memory component.
//!
//! Dependency failures are recovered at the component boundary (retrieval returns
//! nothing, profiles degrade, classification falls back to heuristics, indexing
//! no-ops). Only [`MemoryError::is_fatal`] errors are allowed to reach callers.

use thiserror::Error;

/// The external collaborators a component may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Embedding,
    VectorStore,
    Completion,
    ContentStore,
}

impl Dependency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Embedding => "embedding service",
            Self::VectorStore => "vector store",
            Self::Completion => "completion service",
            Self::ContentStore => "content store",
        }
    }
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors produced by the memory subsystem.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Dependency down, timed out, rate limited, or returned a 5xx. Retryable.
    #[error("{0} unavailable: {1}")]
    Unavailable(Dependency, String),

    /// Dependency rejected the request permanently (4xx, constraint violation).
    #[error("{0} request failed: {1}")]
    Failed(Dependency, String),

    /// The embedding client exhausted its retry budget.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Malformed JSON or schema mismatch from a dependency.
    #[error("invalid response from {0}: {1}")]
    InvalidResponse(Dependency, String),

    /// No data for the request. A normal outcome for most callers.
    #[error("not found: {0}")]
    NotFound(String),

    /// A namespace was asked to read or write another owner's data.
    #[error("cross-namespace access: namespace {namespace} cannot touch data owned by {owner}")]
    CrossNamespace { namespace: String, owner: String },

    /// The caller broke the input contract.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl MemoryError {
    /// Whether the retry utility should try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(..))
    }

    /// Errors that components propagate instead of degrading.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CrossNamespace { .. } | Self::InvalidInput(..))
    }

    /// Map an HTTP status to the matching error class.
    pub fn from_status(dependency: Dependency, status: u16, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        let reason = format!("HTTP {status}: {snippet}");
        if is_retryable_status(status) {
            Self::Unavailable(dependency, reason)
        } else {
            Self::Failed(dependency, reason)
        }
    }

    /// Map a local SQLite error. Busy/locked databases are transient.
    pub fn from_sqlite(dependency: Dependency, err: rusqlite::Error) -> Self {
        let busy = matches!(
            err.sqlite_error_code(),
            Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
        );
        if busy {
            Self::Unavailable(dependency, err.to_string())
        } else {
            Self::Failed(dependency, err.to_string())
        }
    }
}

/// Transient HTTP statuses: rate limiting and server-side failures.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504 | 529)
}

pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(429));
        assert!(is_retryable_status(500));
        assert!(is_retryable_status(503));
        assert!(!is_retryable_status(200));
        assert!(!is_retryable_status(400));
        assert!(!is_retryable_status(401));
    }

    #[test]
    fn status_mapping_splits_transient_and_permanent() {
        let rate_limited = MemoryError::from_status(Dependency::Embedding, 429, "slow down");
        assert!(rate_limited.is_transient());

        let bad_request = MemoryError::from_status(Dependency::Embedding, 400, "bad input");
        assert!(!bad_request.is_transient());
        assert!(!bad_request.is_fatal());
    }

    #[test]
    fn only_contract_errors_are_fatal() {
        let cross = MemoryError::CrossNamespace {
            namespace: "owner:a".into(),
            owner: "b".into(),
        };
        assert!(cross.is_fatal());
        assert!(MemoryError::InvalidInput("empty".into()).is_fatal());
        assert!(!MemoryError::EmbeddingUnavailable("down".into()).is_fatal());
        assert!(!MemoryError::NotFound("profile".into()).is_fatal());
    }

    #[test]
    fn long_bodies_are_truncated_in_reason() {
        let body = "x".repeat(1000);
        let err = MemoryError::from_status(Dependency::Completion, 500, &body);
        assert!(err.to_string().len() < 300);
    }
}
