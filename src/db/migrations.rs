//! Schema versioning.
//!
//! `schema_meta.schema_version` holds the applied version. Each entry in
//! [`STEPS`] upgrades by exactly one version inside its own transaction.

use rusqlite::{Connection, OptionalExtension};

/// Version written by the newest step.
pub const CURRENT_SCHEMA_VERSION: u32 = 2;

type Step = fn(&Connection) -> rusqlite::Result<()>;

/// `(target version, upgrade)` pairs, ascending.
const STEPS: &[(u32, Step)] = &[(2, add_embedding_stamp)];

fn read_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM schema_meta WHERE key = ?1", [key], |row| row.get(0))
        .optional()
}

pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(read_meta(conn, "schema_version")?
        .and_then(|v| v.parse().ok())
        .unwrap_or(0))
}

/// The embedding model and dimension the stored vectors were produced with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingStamp {
    pub model: String,
    pub dimensions: usize,
}

/// Get the stored embedding stamp, if any vectors were ever written.
pub fn get_embedding_stamp(conn: &Connection) -> rusqlite::Result<Option<EmbeddingStamp>> {
    let model = read_meta(conn, "embedding_model")?.filter(|m| !m.is_empty());
    let dimensions = read_meta(conn, "embedding_dimensions")?.and_then(|d| d.parse().ok());
    Ok(match (model, dimensions) {
        (Some(model), Some(dimensions)) => Some(EmbeddingStamp { model, dimensions }),
        _ => None,
    })
}

/// Record the embedding model and dimension used for stored vectors.
pub fn set_embedding_stamp(conn: &Connection, stamp: &EmbeddingStamp) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('embedding_model', ?1)",
        [&stamp.model],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES ('embedding_dimensions', ?1)",
        [stamp.dimensions.to_string()],
    )?;
    Ok(())
}

/// Apply every step newer than the stored version.
pub fn run_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let applied = get_schema_version(conn)?;
    for &(target, step) in STEPS.iter().filter(|(target, _)| *target > applied) {
        tracing::info!(from = target - 1, to = target, "applying schema step");
        let tx = conn.unchecked_transaction()?;
        step(&tx)?;
        tx.execute(
            "UPDATE schema_meta SET value = ?1 WHERE key = 'schema_version'",
            [target.to_string()],
        )?;
        tx.commit()?;
    }
    Ok(())
}

/// v2: embedding stamp keys, plus an index for profile reads by action type.
fn add_embedding_stamp(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_model', '');
         INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('embedding_dimensions', '0');
         CREATE INDEX IF NOT EXISTS idx_behavior_owner_action
             ON behavior_events(owner_id, action_type);",
    )
}
