//! MCP `classify_thought` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ClassifyThoughtParams {
    #[schemars(description = "The thought to classify as insight, collection, or principle")]
    pub text: String,

    #[schemars(description = "Earlier conversation messages, oldest first, alternating user and assistant starting with the user")]
    pub history: Option<Vec<String>>,
}
