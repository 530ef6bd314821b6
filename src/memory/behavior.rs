//! Append-only log of user actions.
//!
//! Events are never updated. [`BehaviorTracker::prune`] bounds the log to a
//! retention window, which is the only way rows leave the table.

use chrono::{Duration, Utc};
use rusqlite::params;

use crate::db::{format_timestamp, with_conn, SharedConnection};
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::memory::types::BehaviorEvent;

pub struct BehaviorTracker {
    db: SharedConnection,
}

impl BehaviorTracker {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    /// Append one event. Returns its row id.
    pub async fn record(&self, event: &BehaviorEvent) -> MemoryResult<i64> {
        if event.session_id.trim().is_empty() {
            return Err(MemoryError::InvalidInput("behavior event needs a session id".into()));
        }

        let owner = event.owner_id.as_str().to_string();
        let action = event.action_type.as_str().to_string();
        let entity_type = event.entity_type.map(|t| t.as_str());
        let entity_id = event.entity_id;
        let payload = match &event.payload {
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        };
        let session_id = event.session_id.clone();
        let timestamp = format_timestamp(event.timestamp);

        let id = with_conn(&self.db, Dependency::ContentStore, move |conn| {
            conn.execute(
                "INSERT INTO behavior_events \
                    (owner_id, action_type, entity_type, entity_id, payload, session_id, timestamp) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![owner, action, entity_type, entity_id, payload, session_id, timestamp],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await?;

        tracing::debug!(owner = %event.owner_id, action = %event.action_type, id, "behavior event recorded");
        Ok(id)
    }

    /// Record without surfacing failures to the caller.
    pub async fn record_best_effort(&self, event: BehaviorEvent) {
        if let Err(e) = self.record(&event).await {
            tracing::warn!(owner = %event.owner_id, action = %event.action_type, error = %e, "failed to record behavior event");
        }
    }

    /// Delete events older than `retention_days`. Returns the number removed.
    pub async fn prune(&self, retention_days: i64) -> MemoryResult<usize> {
        if retention_days < 0 {
            return Err(MemoryError::InvalidInput("retention window must not be negative".into()));
        }
        let cutoff = format_timestamp(Utc::now() - Duration::days(retention_days));
        let removed = with_conn(&self.db, Dependency::ContentStore, move |conn| {
            conn.execute("DELETE FROM behavior_events WHERE timestamp < ?1", [cutoff])
        })
        .await?;

        tracing::info!(removed, retention_days, "pruned behavior events");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_memory_database, shared};
    use crate::memory::types::{ActionType, ContentType, OwnerId};

    fn count(db: &SharedConnection) -> i64 {
        db.lock()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM behavior_events", [], |r| r.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn record_appends_rows() {
        let db = shared(open_memory_database().unwrap());
        let tracker = BehaviorTracker::new(db.clone());
        let owner = OwnerId::new("alice").unwrap();

        let first = tracker
            .record(
                &BehaviorEvent::new(owner.clone(), ActionType::ContentCreated, "s1")
                    .with_entity(ContentType::Insight, 3)
                    .with_payload(serde_json::json!({"words": 12})),
            )
            .await
            .unwrap();
        let second = tracker
            .record(&BehaviorEvent::new(owner, ActionType::ContentCreated, "s1"))
            .await
            .unwrap();

        assert!(second > first);
        assert_eq!(count(&db), 2);
    }

    #[tokio::test]
    async fn record_requires_session() {
        let tracker = BehaviorTracker::new(shared(open_memory_database().unwrap()));
        let alice = OwnerId::new("alice").unwrap();
        let event = BehaviorEvent::new(alice, ActionType::SearchQuery, " ");
        assert!(matches!(tracker.record(&event).await, Err(MemoryError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn prune_removes_only_expired_events() {
        let db = shared(open_memory_database().unwrap());
        let tracker = BehaviorTracker::new(db.clone());
        let owner = OwnerId::new("alice").unwrap();

        let mut old = BehaviorEvent::new(owner.clone(), ActionType::ChatInteraction, "s1");
        old.timestamp = Utc::now() - Duration::days(120);
        tracker.record(&old).await.unwrap();
        tracker
            .record(&BehaviorEvent::new(owner, ActionType::ChatInteraction, "s1"))
            .await
            .unwrap();

        assert_eq!(tracker.prune(90).await.unwrap(), 1);
        assert_eq!(count(&db), 1);
    }
}
