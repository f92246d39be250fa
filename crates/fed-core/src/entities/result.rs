use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::ResultType;

/// The durable answer of one site to one query.
///
/// At most one row exists per `(query_id, site_id)`; later writes are
/// dropped by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct QueryResult {
    pub id: String,
    pub query_id: String,
    pub site_id: String,
    pub result_type: ResultType,
    /// Match count. Present iff `result_type` is `Success`.
    pub result: Option<u64>,
    pub received_at: DateTime<Utc>,
}

/// Insert payload for a `QueryResult`. Construct with [`NewQueryResult::success`]
/// or [`NewQueryResult::error`] so the count/type pairing always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQueryResult {
    query_id: String,
    site_id: String,
    result_type: ResultType,
    result: Option<u64>,
}

impl NewQueryResult {
    #[must_use]
    pub fn success(query_id: impl Into<String>, site_id: impl Into<String>, count: u64) -> Self {
        Self {
            query_id: query_id.into(),
            site_id: site_id.into(),
            result_type: ResultType::Success,
            result: Some(count),
        }
    }

    #[must_use]
    pub fn error(query_id: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            query_id: query_id.into(),
            site_id: site_id.into(),
            result_type: ResultType::Error,
            result: None,
        }
    }

    #[must_use]
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    #[must_use]
    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    #[must_use]
    pub const fn result_type(&self) -> ResultType {
        self.result_type
    }

    #[must_use]
    pub const fn result(&self) -> Option<u64> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_carries_count() {
        let r = NewQueryResult::success("qry-00000001", "sit-00000001", 42);
        assert_eq!(r.result_type(), ResultType::Success);
        assert_eq!(r.result(), Some(42));
    }

    #[test]
    fn error_has_no_count() {
        let r = NewQueryResult::error("qry-00000001", "sit-00000001");
        assert_eq!(r.result_type(), ResultType::Error);
        assert!(r.result().is_none());
    }
}
