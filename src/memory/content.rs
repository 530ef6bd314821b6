//! Read access to the relational store: content items and behavior events.
//!
//! [`ContentSource`] is the seam the profile builder and indexer read through.
//! [`SqliteContentSource`] serves it from the local `content_items` and
//! `behavior_events` tables; its write helpers exist for the CLI, the MCP
//! `index_content` tool, and tests, standing in for the external persistence layer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{format_timestamp, parse_timestamp, with_conn, SharedConnection};
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::memory::types::{
    ActionType, BehaviorEvent, ContentBody, ContentItem, ContentType, OwnerId,
};
use crate::vector::Namespace;

const DEP: Dependency = Dependency::ContentStore;

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Non-deleted items for `owner` created or edited since `since`, newest first.
    async fn recent_items(
        &self,
        owner: &OwnerId,
        since: DateTime<Utc>,
        types: &[ContentType],
        limit: usize,
    ) -> MemoryResult<Vec<ContentItem>>;

    /// Behavior events for `owner` since `since`, newest first.
    async fn recent_events(
        &self,
        owner: &OwnerId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> MemoryResult<Vec<BehaviorEvent>>;

    /// Count of item writes plus events for `owner` strictly after `since`.
    async fn activity_since(&self, owner: &OwnerId, since: DateTime<Utc>) -> MemoryResult<usize>;

    async fn get_item(
        &self,
        content_type: ContentType,
        content_id: i64,
    ) -> MemoryResult<Option<ContentItem>>;
}

pub struct SqliteContentSource {
    db: SharedConnection,
}

impl SqliteContentSource {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    /// Insert or replace an item in the local read model.
    ///
    /// An id already held by another owner, live or tombstoned, is rejected with
    /// `CrossNamespace`.
    pub async fn save_item(&self, item: &ContentItem) -> MemoryResult<()> {
        let body = serde_json::to_string(&item.body)
            .map_err(|e| MemoryError::InvalidInput(format!("unserializable content body: {e}")))?;
        let content_type = item.content_type().as_str();
        let id = item.id;
        let owner = item.owner_id.as_str().to_string();
        let created = format_timestamp(item.created_at);
        let updated = format_timestamp(item.updated_at);

        let holder = with_conn(&self.db, DEP, move |conn| {
            let changed = conn.execute(
                "INSERT INTO content_items \
                    (content_type, content_id, owner_id, body, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(content_type, content_id) DO UPDATE SET \
                    body = excluded.body, updated_at = excluded.updated_at, deleted_at = NULL \
                 WHERE content_items.owner_id = excluded.owner_id",
                params![content_type, id, owner, body, created, updated],
            )?;
            if changed > 0 {
                return Ok(None);
            }
            conn.query_row(
                "SELECT owner_id FROM content_items WHERE content_type = ?1 AND content_id = ?2",
                params![content_type, id],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .await?;

        match holder {
            None => Ok(()),
            Some(holder) => {
                tracing::error!(
                    owner = %item.owner_id,
                    holder = %holder,
                    content_type = %content_type,
                    content_id = id,
                    "content id belongs to another owner"
                );
                Err(MemoryError::CrossNamespace {
                    namespace: Namespace::for_owner(&item.owner_id).as_str().to_string(),
                    owner: holder,
                })
            }
        }
    }

    /// Mark an item deleted. Returns whether a live item was tombstoned.
    pub async fn tombstone(
        &self,
        content_type: ContentType,
        content_id: i64,
    ) -> MemoryResult<bool> {
        let now = format_timestamp(Utc::now());
        with_conn(&self.db, DEP, move |conn| {
            let changed = conn.execute(
                "UPDATE content_items SET deleted_at = ?1 \
                 WHERE content_type = ?2 AND content_id = ?3 AND deleted_at IS NULL",
                params![now, content_type.as_str(), content_id],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    /// Next free id for `content_type`, for callers without an external id.
    pub async fn next_id(&self, content_type: ContentType) -> MemoryResult<i64> {
        with_conn(&self.db, DEP, move |conn| {
            conn.query_row(
                "SELECT COALESCE(MAX(content_id), 0) + 1 FROM content_items \
                 WHERE content_type = ?1",
                [content_type.as_str()],
                |row| row.get(0),
            )
        })
        .await
    }
}

fn row_to_item(row: &Row<'_>) -> rusqlite::Result<(String, i64, String, String, String, String)> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

/// Decode a raw row; rows with unreadable bodies or owners are skipped.
fn decode_item(raw: (String, i64, String, String, String, String)) -> Option<ContentItem> {
    let (content_type, id, owner, body, created, updated) = raw;
    let body: ContentBody = match serde_json::from_str(&body) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(content_type = %content_type, content_id = id, error = %e, "skipping unreadable content body");
            return None;
        }
    };
    Some(ContentItem {
        id,
        owner_id: OwnerId::new(owner).ok()?,
        body,
        created_at: parse_timestamp(&created),
        updated_at: parse_timestamp(&updated),
    })
}

#[async_trait]
impl ContentSource for SqliteContentSource {
    async fn recent_items(
        &self,
        owner: &OwnerId,
        since: DateTime<Utc>,
        types: &[ContentType],
        limit: usize,
    ) -> MemoryResult<Vec<ContentItem>> {
        let mut values = vec![
            Value::Text(owner.as_str().to_string()),
            Value::Text(format_timestamp(since)),
        ];
        let mut sql = String::from(
            "SELECT content_type, content_id, owner_id, body, created_at, updated_at \
             FROM content_items \
             WHERE owner_id = ?1 AND updated_at >= ?2 AND deleted_at IS NULL",
        );
        if !types.is_empty() {
            let placeholders: Vec<String> = types
                .iter()
                .map(|t| {
                    values.push(Value::Text(t.as_str().to_string()));
                    format!("?{}", values.len())
                })
                .collect();
            sql.push_str(&format!(" AND content_type IN ({})", placeholders.join(", ")));
        }
        values.push(Value::Integer(limit as i64));
        sql.push_str(&format!(" ORDER BY updated_at DESC LIMIT ?{}", values.len()));

        let rows = with_conn(&self.db, DEP, move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values), row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;

        Ok(rows.into_iter().filter_map(decode_item).collect())
    }

    async fn recent_events(
        &self,
        owner: &OwnerId,
        since: DateTime<Utc>,
        limit: usize,
    ) -> MemoryResult<Vec<BehaviorEvent>> {
        let owner_key = owner.as_str().to_string();
        let since = format_timestamp(since);
        let rows = with_conn(&self.db, DEP, move |conn| {
            let mut stmt = conn.prepare(
                "SELECT action_type, entity_type, entity_id, payload, session_id, timestamp \
                 FROM behavior_events WHERE owner_id = ?1 AND timestamp >= ?2 \
                 ORDER BY timestamp DESC, id DESC LIMIT ?3",
            )?;
            let rows = stmt
                .query_map(params![owner_key, since, limit as i64], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<i64>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await?;

        Ok(rows
            .into_iter()
            .map(|(action, entity_type, entity_id, payload, session_id, ts)| BehaviorEvent {
                owner_id: owner.clone(),
                action_type: ActionType::from(action.as_str()),
                entity_type: entity_type.and_then(|t| t.parse().ok()),
                entity_id,
                payload: payload
                    .and_then(|p| serde_json::from_str(&p).ok())
                    .unwrap_or(serde_json::Value::Null),
                session_id,
                timestamp: parse_timestamp(&ts),
            })
            .collect())
    }

    async fn activity_since(&self, owner: &OwnerId, since: DateTime<Utc>) -> MemoryResult<usize> {
        let owner_key = owner.as_str().to_string();
        let since = format_timestamp(since);
        with_conn(&self.db, DEP, move |conn| {
            let items: i64 = conn.query_row(
                "SELECT COUNT(*) FROM content_items WHERE owner_id = ?1 AND updated_at > ?2",
                params![owner_key, since],
                |row| row.get(0),
            )?;
            let events: i64 = conn.query_row(
                "SELECT COUNT(*) FROM behavior_events WHERE owner_id = ?1 AND timestamp > ?2",
                params![owner_key, since],
                |row| row.get(0),
            )?;
            Ok((items + events) as usize)
        })
        .await
    }

    async fn get_item(
        &self,
        content_type: ContentType,
        content_id: i64,
    ) -> MemoryResult<Option<ContentItem>> {
        let raw = with_conn(&self.db, DEP, move |conn| {
            conn.query_row(
                "SELECT content_type, content_id, owner_id, body, created_at, updated_at \
                 FROM content_items \
                 WHERE content_type = ?1 AND content_id = ?2 AND deleted_at IS NULL",
                params![content_type.as_str(), content_id],
                row_to_item,
            )
            .optional()
        })
        .await?;
        Ok(raw.and_then(decode_item))
    }
}
