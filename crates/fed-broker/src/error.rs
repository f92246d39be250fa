//! Broker error types.

use fed_core::enums::{BrokerType, MediaType};
use thiserror::Error;

/// Errors raised by broker clients.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The broker-local query id is unknown to this client.
    #[error("query not found: {0}")]
    QueryNotFound(String),

    /// The site has no result for the query, or is unknown to the broker.
    #[error("site not found: {0}")]
    SiteNotFound(String),

    /// The broker cannot carry this query representation.
    #[error("{broker} broker does not support media type {media_type}")]
    UnsupportedMediaType {
        broker: BrokerType,
        media_type: MediaType,
    },

    /// The broadcast did not reach the broker.
    #[error("publishing to {broker} broker failed: {reason}")]
    PublishFailed { broker: BrokerType, reason: String },

    /// The broker was enabled without the settings it needs.
    #[error("{0} broker is not configured")]
    NotConfigured(BrokerType),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The broker refused the request.
    #[error("broker rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The broker is overloaded (429 or 503) and asked callers to back off.
    #[error("broker is busy ({status}), retry after {retry_after_secs}s")]
    Busy { status: u16, retry_after_secs: u64 },

    /// Failed to parse a broker response.
    #[error("parse error: {0}")]
    Parse(String),
}

impl BrokerError {
    /// Whether the broker answered 404 for the requested resource.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Rejected { status: 404, .. })
    }
}
