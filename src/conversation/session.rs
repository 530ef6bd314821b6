//! Persistence for conversation sessions, so multi-turn tools can resume by id.

use rusqlite::{params, OptionalExtension};

use super::ConversationSession;
use crate::db::{format_timestamp, with_conn, SharedConnection};
use crate::error::{Dependency, MemoryError, MemoryResult};
use crate::memory::types::OwnerId;

const DEP: Dependency = Dependency::ContentStore;

pub struct SessionStore {
    db: SharedConnection,
}

impl SessionStore {
    pub fn new(db: SharedConnection) -> Self {
        Self { db }
    }

    pub async fn save(&self, session: &ConversationSession) -> MemoryResult<()> {
        let data = serde_json::to_string(session)
            .map_err(|e| MemoryError::InvalidInput(format!("unserializable session: {e}")))?;
        let id = session.session_id.clone();
        let owner = session.owner_id.as_str().to_string();
        let state = session.state.as_str();
        let created = format_timestamp(session.created_at);
        let updated = format_timestamp(session.updated_at);

        let changed = with_conn(&self.db, DEP, move |conn| {
            conn.execute(
                "INSERT INTO conversation_sessions \
                    (session_id, owner_id, state, data, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 ON CONFLICT(session_id) DO UPDATE SET \
                    state = excluded.state, data = excluded.data, updated_at = excluded.updated_at \
                 WHERE conversation_sessions.owner_id = excluded.owner_id",
                params![id, owner, state, data, created, updated],
            )
        })
        .await?;

        if changed == 0 {
            return Err(MemoryError::InvalidInput(format!(
                "session {} belongs to another owner",
                session.session_id
            )));
        }
        Ok(())
    }

    /// Load `session_id` for `owner`. Another owner's session is reported as missing.
    pub async fn load(
        &self,
        owner: &OwnerId,
        session_id: &str,
    ) -> MemoryResult<Option<ConversationSession>> {
        let id = session_id.to_string();
        let owner_key = owner.as_str().to_string();
        let data: Option<String> = with_conn(&self.db, DEP, move |conn| {
            conn.query_row(
                "SELECT data FROM conversation_sessions WHERE session_id = ?1 AND owner_id = ?2",
                params![id, owner_key],
                |row| row.get(0),
            )
            .optional()
        })
        .await?;

        data.map(|raw| {
            serde_json::from_str::<ConversationSession>(&raw)
                .map_err(|e| MemoryError::Failed(DEP, format!("corrupt session {session_id}: {e}")))
        })
        .transpose()
    }
}
