//! Namespaced nearest-neighbor store.
//!
//! Every call is scoped by a [`Namespace`], and a namespace can only be derived
//! from an [`OwnerId`], so there is no way to spell a cross-owner query. Stores
//! return matches in descending score order and never apply a threshold; callers
//! filter.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryResult;
use crate::memory::types::{ContentType, OwnerId};

/// Per-owner partition of the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    key: String,
    owner: OwnerId,
}

impl Namespace {
    pub fn for_owner(owner: &OwnerId) -> Self {
        Self {
            key: format!("owner:{}", owner.as_str()),
            owner: owner.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn owns(&self, owner: &OwnerId) -> bool {
        &self.owner == owner
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Metadata stored beside each vector, used for post-hoc filtering and auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub owner_id: OwnerId,
    pub content_type: ContentType,
    pub content_id: i64,
    pub title: String,
    /// Head of the embedded text, capped for storage.
    pub preview: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One nearest-neighbor hit.
#[derive(Debug, Clone, Serialize)]
pub struct Match {
    pub vector_id: String,
    /// Cosine similarity in [-1, 1]; 1.0 for an identical direction.
    pub score: f64,
    pub metadata: VectorMetadata,
    pub indexed_at: DateTime<Utc>,
}

/// Optional restrictions applied inside the store.
#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    /// Empty means all content types.
    pub content_types: Vec<ContentType>,
}

impl VectorFilter {
    pub fn types(content_types: &[ContentType]) -> Self {
        Self {
            content_types: content_types.to_vec(),
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite the vector stored under `id`.
    async fn upsert(
        &self,
        ns: &Namespace,
        id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> MemoryResult<()>;

    /// Up to `top_k` matches, sorted by descending score.
    async fn query(
        &self,
        ns: &Namespace,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> MemoryResult<Vec<Match>>;

    /// Remove the vector stored under `id`. Returns whether one existed.
    async fn delete(&self, ns: &Namespace, id: &str) -> MemoryResult<bool>;

    /// Number of vectors in the namespace matching `filter`.
    async fn count(&self, ns: &Namespace, filter: &VectorFilter) -> MemoryResult<usize>;
}
