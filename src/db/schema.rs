//! SQL DDL for all local tables.
//!
//! `content_items` mirrors the external relational store for profile reads,
//! `behavior_events` is the append-only action log, `vectors` backs the
//! namespaced vector store, `vector_index` holds the indexer's local records,
//! and `conversation_sessions` persists orchestrator sessions. All DDL uses
//! `IF NOT EXISTS` for idempotent initialization.

use rusqlite::Connection;

const SCHEMA_SQL: &str = r#"
-- Local read model of user content (insights, collections, principles)
CREATE TABLE IF NOT EXISTS content_items (
    content_type TEXT NOT NULL CHECK(content_type IN ('insight','collection','principle')),
    content_id INTEGER NOT NULL,
    owner_id TEXT NOT NULL,
    body TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT,
    PRIMARY KEY (content_type, content_id)
);

CREATE INDEX IF NOT EXISTS idx_content_owner_created ON content_items(owner_id, created_at);

-- Append-only user action log
CREATE TABLE IF NOT EXISTS behavior_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    action_type TEXT NOT NULL,
    entity_type TEXT,
    entity_id INTEGER,
    payload TEXT,
    session_id TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_behavior_owner_time ON behavior_events(owner_id, timestamp);

-- Namespaced vector store rows; embedding is a little-endian f32 blob
CREATE TABLE IF NOT EXISTS vectors (
    vector_id TEXT PRIMARY KEY,
    namespace TEXT NOT NULL,
    owner_id TEXT NOT NULL,
    content_type TEXT NOT NULL,
    content_id INTEGER NOT NULL,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_vectors_namespace ON vectors(namespace, content_type);

-- Content indexer bookkeeping, one row per live vector
CREATE TABLE IF NOT EXISTS vector_index (
    content_type TEXT NOT NULL,
    content_id INTEGER NOT NULL,
    owner_id TEXT NOT NULL,
    vector_id TEXT NOT NULL,
    embedded_chars INTEGER NOT NULL,
    indexed_at TEXT NOT NULL,
    PRIMARY KEY (content_type, content_id)
);

-- Conversation orchestrator sessions
CREATE TABLE IF NOT EXISTS conversation_sessions (
    session_id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    state TEXT NOT NULL CHECK(state IN ('exploring','deepening','ready','resolved')),
    data TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_owner ON conversation_sessions(owner_id, updated_at);

-- Schema metadata
CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    // Set initial schema version if not already present
    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', '1')",
        [],
    )?;

    Ok(())
}
