use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ForgetContentParams {
    #[schemars(description = "Owner of the content")]
    pub owner_id: String,

    #[schemars(description = "Content type: 'insight', 'collection', or 'principle'")]
    pub content_type: String,

    #[schemars(description = "Id of the content item to remove from search")]
    pub content_id: i64,
}
