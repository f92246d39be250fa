//! Error types for dispatch, translation, and result collection.

use fed_core::enums::BrokerType;
use fed_core::errors::CoreError;
use fed_db::error::DatabaseError;
use fed_broker::BrokerError;
use thiserror::Error;

/// Failure to produce broker representations of a query.
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation failed: {0}")]
    Failed(String),
}

/// Errors surfaced by [`crate::QueryDispatcher`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("query not found: {0}")]
    QueryNotFound(String),

    #[error("query serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("query hashing failed: {0}")]
    Hash(#[from] CoreError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// A broker rejected the query during create, define, or publish.
    #[error("dispatch to {broker} broker failed: {source}")]
    BrokerFailure {
        broker: BrokerType,
        #[source]
        source: BrokerError,
    },

    #[error("no broker is configured")]
    NoBrokers,

    /// Best-effort dispatch where every broker failed.
    #[error("none of {attempted} brokers accepted the query")]
    NoBrokerAccepted { attempted: usize },
}

impl DispatchError {
    pub(crate) const fn broker(broker: BrokerType, source: BrokerError) -> Self {
        Self::BrokerFailure { broker, source }
    }
}

/// Failure while turning a status notification into a result. Logged by the
/// collector and never returned to a caller.
#[derive(Debug, Error)]
pub enum QueryResultCollectError {
    #[error("notification from {0} broker, which is not configured")]
    UnknownBroker(BrokerType),

    #[error("broker lookup failed: {0}")]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}
