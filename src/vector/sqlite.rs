//! SQLite + sqlite-vec implementation of [`VectorStore`].
//!
//! Vectors live in the `vectors` table as little-endian f32 blobs and are scored
//! with `vec_distance_cosine`. Writes are synchronous on the shared connection, so
//! an upsert is visible to the next query in the same namespace.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension};

use super::{Match, Namespace, VectorFilter, VectorMetadata, VectorStore};
use crate::db::{format_timestamp, parse_timestamp, with_conn, SharedConnection};
use crate::embedding::embedding_to_bytes;
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::retry::{with_retry, RetryPolicy};

const DEP: Dependency = Dependency::VectorStore;

pub struct SqliteVectorStore {
    db: SharedConnection,
    policy: RetryPolicy,
}

impl SqliteVectorStore {
    pub fn new(db: SharedConnection, policy: RetryPolicy) -> Self {
        Self { db, policy }
    }
}

fn cross_namespace(ns: &Namespace, owner: &str) -> MemoryError {
    tracing::error!(namespace = %ns, owner, "cross-namespace vector access rejected");
    MemoryError::CrossNamespace {
        namespace: ns.as_str().to_string(),
        owner: owner.to_string(),
    }
}

/// Outcome of the upsert statement, interpreted outside the blocking closure.
enum UpsertOutcome {
    Written,
    /// The id exists under another namespace; carries that row's owner.
    Conflict(String),
}

enum DeleteOutcome {
    Deleted,
    Missing,
    Foreign(String),
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(
        &self,
        ns: &Namespace,
        id: &str,
        vector: &[f32],
        metadata: &VectorMetadata,
    ) -> MemoryResult<()> {
        if !ns.owns(&metadata.owner_id) {
            return Err(cross_namespace(ns, metadata.owner_id.as_str()));
        }
        if id.is_empty() || vector.is_empty() {
            let reason = "vector id and embedding must be non-empty".to_string();
            return Err(MemoryError::InvalidInput(reason));
        }

        let metadata_json = serde_json::to_string(metadata)
            .map_err(|e| MemoryError::InvalidInput(format!("unserializable metadata: {e}")))?;
        let bytes = embedding_to_bytes(vector);
        let db = &self.db;

        let outcome = with_retry(&self.policy, DEP, "upsert", || {
            let ns_key = ns.as_str().to_string();
            let id = id.to_string();
            let owner = metadata.owner_id.as_str().to_string();
            let content_type = metadata.content_type.as_str();
            let content_id = metadata.content_id;
            let bytes = bytes.clone();
            let metadata_json = metadata_json.clone();
            with_conn(db, DEP, move |conn| {
                let changed = conn.execute(
                    "INSERT INTO vectors \
                        (vector_id, namespace, owner_id, content_type, content_id, \
                         embedding, metadata, indexed_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                     ON CONFLICT(vector_id) DO UPDATE SET \
                        content_type = excluded.content_type, \
                        content_id = excluded.content_id, \
                        embedding = excluded.embedding, \
                        metadata = excluded.metadata, \
                        indexed_at = excluded.indexed_at \
                     WHERE vectors.namespace = excluded.namespace",
                    params![
                        id,
                        ns_key,
                        owner,
                        content_type,
                        content_id,
                        bytes,
                        metadata_json,
                        format_timestamp(Utc::now())
                    ],
                )?;
                if changed > 0 {
                    return Ok(UpsertOutcome::Written);
                }
                let other: String = conn.query_row(
                    "SELECT owner_id FROM vectors WHERE vector_id = ?1",
                    [&id],
                    |row| row.get(0),
                )?;
                Ok(UpsertOutcome::Conflict(other))
            })
        })
        .await?;

        match outcome {
            UpsertOutcome::Written => {
                tracing::debug!(namespace = %ns, vector_id = id, "vector upserted");
                Ok(())
            }
            UpsertOutcome::Conflict(other) => Err(cross_namespace(ns, &other)),
        }
    }

    async fn query(
        &self,
        ns: &Namespace,
        vector: &[f32],
        top_k: usize,
        filter: &VectorFilter,
    ) -> MemoryResult<Vec<Match>> {
        if top_k == 0 || vector.is_empty() {
            return Ok(Vec::new());
        }

        let bytes = embedding_to_bytes(vector);
        let db = &self.db;

        let rows = with_retry(&self.policy, DEP, "query", || {
            let mut values = vec![Value::Blob(bytes.clone()), Value::Text(ns.as_str().to_string())];
            let mut sql = String::from(
                "SELECT vector_id, owner_id, metadata, indexed_at, \
                 1.0 - vec_distance_cosine(embedding, ?1) AS score \
                 FROM vectors WHERE namespace = ?2",
            );
            if !filter.content_types.is_empty() {
                let placeholders: Vec<String> = filter
                    .content_types
                    .iter()
                    .map(|t| {
                        values.push(Value::Text(t.as_str().to_string()));
                        format!("?{}", values.len())
                    })
                    .collect();
                sql.push_str(&format!(" AND content_type IN ({})", placeholders.join(", ")));
            }
            values.push(Value::Integer(top_k as i64));
            sql.push_str(&format!(" ORDER BY score DESC LIMIT ?{}", values.len()));

            with_conn(db, DEP, move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values), |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, f64>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
        })
        .await?;

        let mut matches = Vec::with_capacity(rows.len());
        for (vector_id, owner, metadata_json, indexed_at, score) in rows {
            if owner != ns.owner().as_str() {
                return Err(cross_namespace(ns, &owner));
            }
            let metadata: VectorMetadata = match serde_json::from_str(&metadata_json) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(vector_id = %vector_id, error = %e, "skipping vector with unreadable metadata");
                    continue;
                }
            };
            if !ns.owns(&metadata.owner_id) {
                return Err(cross_namespace(ns, metadata.owner_id.as_str()));
            }
            matches.push(Match {
                vector_id,
                score,
                metadata,
                indexed_at: parse_timestamp(&indexed_at),
            });
        }

        Ok(matches)
    }

    async fn delete(&self, ns: &Namespace, id: &str) -> MemoryResult<bool> {
        let db = &self.db;
        let outcome = with_retry(&self.policy, DEP, "delete", || {
            let ns_key = ns.as_str().to_string();
            let id = id.to_string();
            with_conn(db, DEP, move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM vectors WHERE vector_id = ?1 AND namespace = ?2",
                    params![id, ns_key],
                )?;
                if deleted > 0 {
                    return Ok(DeleteOutcome::Deleted);
                }
                let other: Option<String> = conn
                    .query_row("SELECT owner_id FROM vectors WHERE vector_id = ?1", [&id], |row| {
                        row.get(0)
                    })
                    .optional()?;
                Ok(other.map_or(DeleteOutcome::Missing, DeleteOutcome::Foreign))
            })
        })
        .await?;

        match outcome {
            DeleteOutcome::Deleted => Ok(true),
            DeleteOutcome::Missing => Ok(false),
            DeleteOutcome::Foreign(other) => Err(cross_namespace(ns, &other)),
        }
    }

    async fn count(&self, ns: &Namespace, filter: &VectorFilter) -> MemoryResult<usize> {
        let db = &self.db;
        with_retry(&self.policy, DEP, "count", || {
            let mut values = vec![Value::Text(ns.as_str().to_string())];
            let mut sql = String::from("SELECT COUNT(*) FROM vectors WHERE namespace = ?1");
            if !filter.content_types.is_empty() {
                let placeholders: Vec<String> = filter
                    .content_types
                    .iter()
                    .map(|t| {
                        values.push(Value::Text(t.as_str().to_string()));
                        format!("?{}", values.len())
                    })
                    .collect();
                sql.push_str(&format!(" AND content_type IN ({})", placeholders.join(", ")));
            }
            with_conn(db, DEP, move |conn| {
                let params = rusqlite::params_from_iter(values);
                let n: i64 = conn.query_row(&sql, params, |row| row.get(0))?;
                Ok(n as usize)
            })
        })
        .await
    }
}
