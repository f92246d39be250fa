use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A submitted feasibility query. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Query {
    pub id: String,
    pub query_content_id: String,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// A serialized query body, stored once per distinct content hash.
///
/// Several `Query` rows may point at the same `QueryContent`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct QueryContent {
    pub id: String,
    pub query_content: String,
    pub hash: String,
}
