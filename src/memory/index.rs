//! Write path: embed a saved content item and store its vector.
//!
//! [`Indexer::index`] runs after the item is durably saved elsewhere and never
//! fails that save: dependency outages are logged and reported as
//! [`IndexOutcome::Deferred`], to be picked up by [`Indexer::backfill`]. The vector
//! id is derived from `(content_type, content_id)`, so repeated or concurrent
//! indexing overwrites instead of duplicating.

use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::{format_timestamp, parse_timestamp, with_conn, SharedConnection};
use crate::embedding::{truncate_head, EmbeddingClient};
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::memory::types::{vector_id_for, ContentBody, ContentItem, ContentType, OwnerId};
use crate::vector::{Namespace, VectorMetadata, VectorStore};

/// Max characters of embedded text kept in the vector metadata snapshot.
pub const PREVIEW_CHARS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed { vector_id: String },
    /// The vector already reflects the item's latest edit.
    UpToDate { vector_id: String },
    /// A dependency failed; the item stays unindexed until the next backfill.
    Deferred { reason: String },
    /// The item has no semantic text to embed.
    Skipped,
}

#[derive(Debug, Default, Serialize)]
pub struct BackfillReport {
    pub scanned: usize,
    pub indexed: usize,
    pub deferred: usize,
    /// Vectors removed for tombstoned items whose earlier delete was deferred.
    pub purged: usize,
}

pub struct Indexer {
    embedder: EmbeddingClient,
    store: Arc<dyn VectorStore>,
    db: SharedConnection,
}

struct IndexRow {
    owner_id: String,
    vector_id: String,
    indexed_at: String,
}

impl Indexer {
    pub fn new(
        embedder: EmbeddingClient,
        store: Arc<dyn VectorStore>,
        db: SharedConnection,
    ) -> Self {
        Self { embedder, store, db }
    }

    /// Embed and store `item`. Only contract violations return `Err`.
    pub async fn index(&self, item: &ContentItem) -> MemoryResult<IndexOutcome> {
        let content_type = item.content_type();
        let vector_id = vector_id_for(content_type, item.id);

        let text = item.text();
        if text.trim().is_empty() {
            debug!(content_type = %content_type, content_id = item.id, "nothing to index");
            return Ok(IndexOutcome::Skipped);
        }

        let existing = match self.index_row(content_type, item.id).await {
            Ok(row) => row,
            Err(e) => return Ok(defer(item, e)),
        };
        if let Some(row) = existing {
            if row.owner_id != item.owner_id.as_str() {
                return Err(MemoryError::CrossNamespace {
                    namespace: Namespace::for_owner(&item.owner_id).as_str().to_string(),
                    owner: row.owner_id,
                });
            }
            if parse_timestamp(&row.indexed_at) >= item.updated_at {
                return Ok(IndexOutcome::UpToDate { vector_id: row.vector_id });
            }
        }

        let embedding = match self.embedder.embed(&text).await {
            Ok(v) => v,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(defer(item, e)),
        };

        let metadata = VectorMetadata {
            owner_id: item.owner_id.clone(),
            content_type,
            content_id: item.id,
            title: item.body.title().to_string(),
            preview: truncate_head(&text, PREVIEW_CHARS).to_string(),
            created_at: item.created_at,
            updated_at: item.updated_at,
        };
        let ns = Namespace::for_owner(&item.owner_id);

        match self.store.upsert(&ns, &vector_id, &embedding, &metadata).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => return Ok(defer(item, e)),
        }

        let owner = item.owner_id.as_str().to_string();
        let vid = vector_id.clone();
        let content_id = item.id;
        let chars = text.chars().count() as i64;
        let indexed_at = format_timestamp(Utc::now());
        let recorded = with_conn(&self.db, Dependency::VectorStore, move |conn| {
            conn.execute(
                "INSERT INTO vector_index \
                    (content_type, content_id, owner_id, vector_id, embedded_chars, indexed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(content_type, content_id) DO UPDATE SET \
                    vector_id = excluded.vector_id, \
                    embedded_chars = excluded.embedded_chars, \
                    indexed_at = excluded.indexed_at",
                params![content_type.as_str(), content_id, owner, vid, chars, indexed_at],
            )?;
            Ok(())
        })
        .await;
        if let Err(e) = recorded {
            return Ok(defer(item, e));
        }

        info!(owner = %item.owner_id, content_type = %content_type, content_id = item.id, "content indexed");
        Ok(IndexOutcome::Indexed { vector_id })
    }

    /// Index on a background task so the caller's save path never waits on embedding.
    pub fn spawn_index(self: &Arc<Self>, item: ContentItem) -> tokio::task::JoinHandle<()> {
        let indexer = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = indexer.index(&item).await {
                tracing::error!(content_type = %item.content_type(), content_id = item.id, error = %e, "indexing rejected");
            }
        })
    }

    /// Remove the vector and local index record for an item.
    ///
    /// Returns `Ok(false)` when nothing was indexed or the store was unreachable.
    /// Outages leave the local record in place; [`Indexer::backfill`] retries the
    /// delete once the item is tombstoned.
    pub async fn delete(&self, content_type: ContentType, content_id: i64) -> MemoryResult<bool> {
        let row = match self.index_row(content_type, content_id).await {
            Ok(row) => row,
            Err(e) => {
                warn!(content_type = %content_type, content_id, error = %e, "index lookup failed, delete deferred");
                return Ok(false);
            }
        };
        let Some(row) = row else {
            debug!(content_type = %content_type, content_id, "delete of unindexed content");
            return Ok(false);
        };

        let owner = OwnerId::new(row.owner_id.clone()).map_err(MemoryError::InvalidInput)?;
        let ns = Namespace::for_owner(&owner);
        match self.store.delete(&ns, &row.vector_id).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(content_type = %content_type, content_id, error = %e, "vector delete deferred");
                return Ok(false);
            }
        }

        let removed = with_conn(&self.db, Dependency::VectorStore, move |conn| {
            conn.execute(
                "DELETE FROM vector_index WHERE content_type = ?1 AND content_id = ?2",
                params![content_type.as_str(), content_id],
            )
        })
        .await;
        if let Err(e) = removed {
            // A later delete finds no vector and clears the row.
            warn!(content_type = %content_type, content_id, error = %e, "failed to drop index record");
        }

        info!(owner = %owner, content_type = %content_type, content_id, "content vector deleted");
        Ok(true)
    }

    /// Index up to `limit` items that have no vector or whose vector predates an
    /// edit, then remove up to `limit` vectors still held by tombstoned items.
    pub async fn backfill(&self, limit: usize) -> MemoryResult<BackfillReport> {
        let rows = with_conn(&self.db, Dependency::ContentStore, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT c.content_id, c.owner_id, c.body, c.created_at, c.updated_at \
                 FROM content_items c \
                 LEFT JOIN vector_index v ON v.content_type = c.content_type \
                 AND v.content_id = c.content_id \
                 WHERE c.deleted_at IS NULL AND \
                    (v.content_id IS NULL OR v.indexed_at < c.updated_at) \
                 ORDER BY c.updated_at ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;

        let mut report = BackfillReport::default();
        for (id, owner, body, created, updated) in rows {
            report.scanned += 1;
            let parsed = (OwnerId::new(owner), serde_json::from_str::<ContentBody>(&body));
            let (Ok(owner_id), Ok(body)) = parsed else {
                warn!(content_id = id, "skipping unreadable content during backfill");
                continue;
            };
            let item = ContentItem {
                id,
                owner_id,
                body,
                created_at: parse_timestamp(&created),
                updated_at: parse_timestamp(&updated),
            };
            match self.index(&item).await {
                Ok(IndexOutcome::Indexed { .. }) => report.indexed += 1,
                Ok(IndexOutcome::Deferred { .. }) => report.deferred += 1,
                Ok(_) => {}
                Err(e) => warn!(content_id = id, error = %e, "backfill rejected item"),
            }
        }

        report.purged = self.purge_tombstoned(limit).await?;

        info!(
            scanned = report.scanned,
            indexed = report.indexed,
            deferred = report.deferred,
            purged = report.purged,
            "backfill complete"
        );
        Ok(report)
    }

    async fn purge_tombstoned(&self, limit: usize) -> MemoryResult<usize> {
        let tombstoned = with_conn(&self.db, Dependency::ContentStore, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT v.content_type, v.content_id FROM vector_index v \
                 JOIN content_items c ON c.content_type = v.content_type \
                 AND c.content_id = v.content_id \
                 WHERE c.deleted_at IS NOT NULL \
                 ORDER BY c.deleted_at ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit as i64], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;

        let mut purged = 0;
        for (raw_type, id) in tombstoned {
            let Ok(content_type) = raw_type.parse::<ContentType>() else {
                warn!(content_type = %raw_type, content_id = id, "skipping unreadable index record");
                continue;
            };
            match self.delete(content_type, id).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(e) => warn!(content_id = id, error = %e, "purge rejected item"),
            }
        }
        Ok(purged)
    }

    async fn index_row(
        &self,
        content_type: ContentType,
        content_id: i64,
    ) -> MemoryResult<Option<IndexRow>> {
        with_conn(&self.db, Dependency::VectorStore, move |conn| {
            conn.query_row(
                "SELECT owner_id, vector_id, indexed_at FROM vector_index WHERE content_type = ?1 \
                 AND content_id = ?2",
                params![content_type.as_str(), content_id],
                |row| {
                    Ok(IndexRow {
                        owner_id: row.get(0)?,
                        vector_id: row.get(1)?,
                        indexed_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
        .await
    }
}

fn defer(item: &ContentItem, err: MemoryError) -> IndexOutcome {
    warn!(
        owner = %item.owner_id,
        content_type = %item.content_type(),
        content_id = item.id,
        error = %err,
        "indexing deferred"
    );
    IndexOutcome::Deferred { reason: err.to_string() }
}
