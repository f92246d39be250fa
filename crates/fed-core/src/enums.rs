//! Status enums and type tags.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`
//! and expose `as_str()` for SQL storage. `QueryStatus` carries the per-site
//! state machine brokers drive after publish.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

// ---------------------------------------------------------------------------
// QueryStatus
// ---------------------------------------------------------------------------

/// Status of a query at one site, as reported by a broker.
///
/// ```text
/// retrieved → queued → executing → completed
///     │          │         │
///     └──────────┴─────────┴─────→ failed
/// ```
///
/// Brokers may skip intermediate states; a synchronous broker synthesizes
/// them before delivering the terminal one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Retrieved,
    Queued,
    Executing,
    Completed,
    Failed,
}

impl QueryStatus {
    /// Valid next states from the current state.
    #[must_use]
    pub const fn allowed_next_states(self) -> &'static [Self] {
        match self {
            Self::Retrieved => &[Self::Queued, Self::Executing, Self::Completed, Self::Failed],
            Self::Queued => &[Self::Executing, Self::Completed, Self::Failed],
            Self::Executing => &[Self::Completed, Self::Failed],
            Self::Completed | Self::Failed => &[],
        }
    }

    /// Check whether transitioning to `next` is allowed.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.allowed_next_states().contains(&next)
    }

    /// Terminal states produce a durable result; the rest are only logged.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retrieved => "retrieved",
            Self::Queued => "queued",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ResultType
// ---------------------------------------------------------------------------

/// Outcome of a query at one site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResultType {
    Success,
    Error,
}

impl ResultType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ResultType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// BrokerType
// ---------------------------------------------------------------------------

/// Broker protocol family. Each variant maps to one `BrokerClient` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BrokerType {
    /// In-process simulation with randomized per-site latency.
    Mock,
    /// Synchronous HTTP round trip to a single FHIR/CQL endpoint.
    Direct,
    /// Stateful remote broker with a push notification stream.
    Aktin,
    /// Task-based broker polled for per-site task status.
    Dsf,
}

impl BrokerType {
    pub const ALL: [Self; 4] = [Self::Mock, Self::Direct, Self::Aktin, Self::Dsf];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::Direct => "direct",
            Self::Aktin => "aktin",
            Self::Dsf => "dsf",
        }
    }
}

impl fmt::Display for BrokerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrokerType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "broker type",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// MediaType
// ---------------------------------------------------------------------------

/// Serialized query representation attached to a broker query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum MediaType {
    #[serde(rename = "application/sq+json")]
    StructuredQuery,
    #[serde(rename = "text/cql")]
    Cql,
    #[serde(rename = "text/fhir-codex")]
    FhirCodex,
}

impl MediaType {
    pub const ALL: [Self; 3] = [Self::StructuredQuery, Self::Cql, Self::FhirCodex];

    /// The MIME representation, also used as the HTTP `Content-Type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StructuredQuery => "application/sq+json",
            Self::Cql => "text/cql",
            Self::FhirCodex => "text/fhir-codex",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str() == s.trim())
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "media type",
                value: s.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// DispatchPolicy
// ---------------------------------------------------------------------------

/// How `dispatch` treats a broker that fails to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPolicy {
    /// The first failing broker aborts the whole dispatch.
    #[default]
    AllOrNothing,
    /// Failing brokers are logged and skipped; dispatch fails only when no
    /// broker accepted the query.
    BestEffort,
}

impl DispatchPolicy {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllOrNothing => "all_or_nothing",
            Self::BestEffort => "best_effort",
        }
    }
}

impl fmt::Display for DispatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(QueryStatus::Retrieved, false)]
    #[case(QueryStatus::Queued, false)]
    #[case(QueryStatus::Executing, false)]
    #[case(QueryStatus::Completed, true)]
    #[case(QueryStatus::Failed, true)]
    fn terminal_states(#[case] status: QueryStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn terminal_states_have_no_successors() {
        assert!(QueryStatus::Completed.allowed_next_states().is_empty());
        assert!(QueryStatus::Failed.allowed_next_states().is_empty());
        assert!(!QueryStatus::Executing.can_transition_to(QueryStatus::Queued));
        assert!(QueryStatus::Queued.can_transition_to(QueryStatus::Failed));
    }

    #[test]
    fn broker_type_parses_case_insensitively() {
        assert_eq!("DSF".parse::<BrokerType>().unwrap(), BrokerType::Dsf);
        assert_eq!(" mock ".parse::<BrokerType>().unwrap(), BrokerType::Mock);
        assert!("carrier-pigeon".parse::<BrokerType>().is_err());
    }

    #[test]
    fn media_type_serializes_as_mime() {
        let json = serde_json::to_string(&MediaType::StructuredQuery).unwrap();
        assert_eq!(json, "\"application/sq+json\"");
        assert_eq!("text/cql".parse::<MediaType>().unwrap(), MediaType::Cql);
        assert!("text/plain".parse::<MediaType>().is_err());
    }

    #[test]
    fn statuses_serialize_snake_case() {
        let json = serde_json::to_string(&QueryStatus::Executing).unwrap();
        assert_eq!(json, "\"executing\"");
        let parsed: ResultType = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(parsed, ResultType::Error);
    }

    #[test]
    fn dispatch_policy_defaults_to_all_or_nothing() {
        assert_eq!(DispatchPolicy::default(), DispatchPolicy::AllOrNothing);
        let parsed: DispatchPolicy = serde_json::from_str("\"best_effort\"").unwrap();
        assert_eq!(parsed, DispatchPolicy::BestEffort);
    }
}
