//! MCP `index_content` tool parameter definition.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IndexContentParams {
    #[schemars(description = "Owner of the content")]
    pub owner_id: String,

    #[schemars(description = "Content type: 'insight', 'collection', or 'principle'")]
    pub content_type: String,

    #[schemars(description = "Id from the content store. Omit to allocate the next free id.")]
    pub content_id: Option<i64>,

    #[schemars(
        description = "Semantic fields. insight: summary, anchor, pulse. collection: heading, objectives, timeframe. principle: heading, purpose, timeframe."
    )]
    pub fields: BTreeMap<String, String>,
}
