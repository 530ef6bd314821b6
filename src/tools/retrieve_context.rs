//! MCP `retrieve_context` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct RetrieveContextParams {
    #[schemars(description = "Owner whose content is searched. Results never include other owners' content.")]
    pub owner_id: String,

    #[schemars(description = "Free text to find related content for")]
    pub query: String,

    #[schemars(description = "Maximum number of results (1-20). Defaults to the configured top_k.")]
    pub top_k: Option<usize>,

    #[schemars(description = "Minimum similarity score (0.0-1.0). Defaults to the configured context threshold.")]
    pub min_score: Option<f64>,

    #[schemars(description = "Restrict to content types: 'insight', 'collection', 'principle'")]
    pub types: Option<Vec<String>>,
}
