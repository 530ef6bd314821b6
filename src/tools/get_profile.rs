use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GetProfileParams {
    #[schemars(description = "Owner to build the profile for")]
    pub owner_id: String,

    #[schemars(description = "Recompute even if the cached profile is fresh (default: false)")]
    pub force_refresh: Option<bool>,
}
