pub mod classify;
pub mod doctor;
pub mod maintenance;
pub mod profile;
pub mod search;

use anyhow::{Context, Result};
use sparkmind::memory::types::OwnerId;

fn parse_owner(raw: &str) -> Result<OwnerId> {
    OwnerId::new(raw)
        .map_err(anyhow::Error::msg)
        .with_context(|| format!("invalid owner id {raw:?}"))
}
