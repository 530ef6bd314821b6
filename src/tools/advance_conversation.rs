//! MCP `advance_conversation` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Omit `session_id` to start a new session.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AdvanceConversationParams {
    #[schemars(description = "Owner of the conversation")]
    pub owner_id: String,

    #[schemars(description = "Session to continue. Omit to start a new exploration session.")]
    pub session_id: Option<String>,

    #[schemars(description = "The user's message for this turn")]
    pub message: String,
}
