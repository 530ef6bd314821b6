//! MCP `track_event` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct TrackEventParams {
    #[schemars(description = "Owner who performed the action")]
    pub owner_id: String,

    #[schemars(
        description = "Action name, e.g. 'content_created', 'content_edited', 'chat_interaction', 'search_query'"
    )]
    pub action_type: String,

    #[schemars(description = "Client session the action happened in")]
    pub session_id: String,

    #[schemars(description = "Type of the entity acted on, if any")]
    pub entity_type: Option<String>,

    #[schemars(description = "Id of the entity acted on, if any")]
    pub entity_id: Option<i64>,

    #[schemars(description = "Arbitrary JSON details")]
    pub payload: Option<serde_json::Value>,
}
