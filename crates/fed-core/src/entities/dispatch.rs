use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::BrokerType;

/// Record of a query having been published through one broker.
///
/// Keyed by `(query_id, broker_type)`; created once and never updated.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct BrokerDispatch {
    pub query_id: String,
    pub broker_type: BrokerType,
    /// Broker-local identifier returned by `create_query`.
    pub broker_query_id: String,
    pub dispatched_at: DateTime<Utc>,
}
