//! Errors raised while loading or validating `fedq` settings.

use fed_core::enums::BrokerType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A config source could not be read, or a value did not deserialize.
    #[error("failed to load fedq configuration: {0}")]
    Load(#[from] figment::Error),

    /// A broker is listed in `brokers.enabled` but its section lacks the
    /// endpoint or identity it needs.
    #[error("broker '{broker}' is enabled but [brokers.{broker}] is incomplete")]
    BrokerNotConfigured { broker: BrokerType },

    #[error("invalid value for '{field}': {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
