use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A validated structured query (cohort definition) as submitted by a caller.
///
/// The federation never interprets its semantics; it is serialized for
/// hashing and storage and handed to a translator for broker formats.
/// Serialization is deterministic because `serde_json::Map` keeps keys sorted.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(transparent)]
pub struct StructuredQuery(pub serde_json::Value);

impl StructuredQuery {
    /// Serialize into the canonical body stored in `query_contents`.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if the value cannot be serialized.
    pub fn to_body(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.0)
    }

    /// Parse a stored body back into a structured query.
    ///
    /// # Errors
    ///
    /// Returns `serde_json::Error` if `body` is not valid JSON.
    pub fn from_body(body: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(body).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_independent_of_key_order() {
        let a = StructuredQuery::from_body(r#"{"version":"1","inclusionCriteria":[]}"#).unwrap();
        let b = StructuredQuery::from_body(r#"{"inclusionCriteria":[],"version":"1"}"#).unwrap();
        assert_eq!(a.to_body().unwrap(), b.to_body().unwrap());
    }
}
