//! Read path: contextual retrieval over a user's indexed content.
//!
//! [`Retriever::retrieve`] embeds the query, over-fetches from the vector store
//! (`top_k * over_fetch_factor`), then post-filters: threshold, dedup by content,
//! similarity ordering with a recency tie-break inside a small epsilon, truncate.
//! Dependency failures produce an empty result, never an error.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::EmbeddingClient;
use crate::error::{MemoryError, MemoryResult};
use crate::memory::types::{ContentItem, ContentType, OwnerId};
use crate::vector::{Match, Namespace, VectorFilter, VectorStore};

/// Float slack when comparing scores against thresholds.
const SCORE_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct RetrieveOptions {
    pub top_k: usize,
    pub min_score: f64,
    /// Empty means every content type.
    pub types: Vec<ContentType>,
}

impl RetrieveOptions {
    pub fn new(top_k: usize, min_score: f64) -> Self {
        Self {
            top_k,
            min_score,
            types: Vec::new(),
        }
    }

    pub fn with_types(mut self, types: &[ContentType]) -> Self {
        self.types = types.to_vec();
        self
    }
}

/// One retrieved content item.
#[derive(Debug, Clone, Serialize)]
pub struct RankedItem {
    pub content_type: ContentType,
    pub content_id: i64,
    pub score: f64,
    pub title: String,
    pub preview: String,
    pub updated_at: DateTime<Utc>,
}

impl From<Match> for RankedItem {
    fn from(m: Match) -> Self {
        Self {
            content_type: m.metadata.content_type,
            content_id: m.metadata.content_id,
            score: m.score,
            title: m.metadata.title,
            preview: m.metadata.preview,
            updated_at: m.metadata.updated_at,
        }
    }
}

pub struct Retriever {
    embedder: EmbeddingClient,
    store: Arc<dyn VectorStore>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(
        embedder: EmbeddingClient,
        store: Arc<dyn VectorStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    /// Options for conversation context lookups.
    pub fn context_options(&self, top_k: usize) -> RetrieveOptions {
        RetrieveOptions::new(top_k, self.config.context_min_score)
    }

    /// Ranked, deduplicated content owned by `owner` that resembles `query`.
    ///
    /// Only a cross-namespace match is an error; it means the store broke isolation.
    pub async fn retrieve(
        &self,
        owner: &OwnerId,
        query: &str,
        opts: &RetrieveOptions,
    ) -> MemoryResult<Vec<RankedItem>> {
        if query.trim().is_empty() || opts.top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(owner = %owner, error = %e, "retrieval degraded: embedding failed");
                return Ok(Vec::new());
            }
        };

        let ns = Namespace::for_owner(owner);
        let fetch = opts.top_k.saturating_mul(self.config.over_fetch_factor.max(1));
        let filter = VectorFilter::types(&opts.types);
        let matches = match self.store.query(&ns, &embedding, fetch, &filter).await {
            Ok(m) => m,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(owner = %owner, error = %e, "retrieval degraded: vector query failed");
                return Ok(Vec::new());
            }
        };

        if let Some(foreign) = matches.iter().find(|m| &m.metadata.owner_id != owner) {
            tracing::error!(owner = %owner, foreign = %foreign.metadata.owner_id, "vector store returned another owner's content");
            return Err(MemoryError::CrossNamespace {
                namespace: ns.as_str().to_string(),
                owner: foreign.metadata.owner_id.as_str().to_string(),
            });
        }

        let fetched = matches.len();
        let ranked = rank(matches, opts, self.config.recency_epsilon);
        debug!(owner = %owner, fetched, returned = ranked.len(), "retrieval complete");
        Ok(ranked)
    }

    /// Content related to `item`, excluding the item itself.
    pub async fn related(
        &self,
        owner: &OwnerId,
        item: &ContentItem,
        top_k: usize,
    ) -> MemoryResult<Vec<RankedItem>> {
        let opts = RetrieveOptions::new(top_k + 1, self.config.related_min_score);
        let mut results = self.retrieve(owner, &item.text(), &opts).await?;
        let item_type = item.content_type();
        results.retain(|r| !(r.content_type == item_type && r.content_id == item.id));
        results.truncate(top_k);
        Ok(results)
    }
}

/// Threshold, dedup, order, and truncate store matches.
pub fn rank(matches: Vec<Match>, opts: &RetrieveOptions, recency_epsilon: f64) -> Vec<RankedItem> {
    // Best score per (content_type, content_id).
    let mut best: HashMap<(ContentType, i64), Match> = HashMap::new();
    for m in matches {
        if !m.score.is_finite() || m.score + SCORE_TOLERANCE < opts.min_score {
            continue;
        }
        if !opts.types.is_empty() && !opts.types.contains(&m.metadata.content_type) {
            continue;
        }
        let key = (m.metadata.content_type, m.metadata.content_id);
        match best.get(&key) {
            Some(existing) if existing.score >= m.score => {}
            _ => {
                best.insert(key, m);
            }
        }
    }

    let mut items: Vec<RankedItem> = best.into_values().map(RankedItem::from).collect();
    items.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
            .then_with(|| a.content_id.cmp(&b.content_id))
    });
    recency_tie_break(&mut items, recency_epsilon);
    items.truncate(opts.top_k);
    items
}

/// Within runs of scores no more than `epsilon` below the run's leader, put newer
/// items first. Items outside a run keep their similarity order.
fn recency_tie_break(items: &mut [RankedItem], epsilon: f64) {
    if epsilon <= 0.0 {
        return;
    }
    let mut start = 0;
    while start < items.len() {
        let leader = items[start].score;
        let mut end = start + 1;
        while end < items.len() && leader - items[end].score <= epsilon {
            end += 1;
        }
        items[start..end].sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        start = end;
    }
}
