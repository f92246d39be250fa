//! Result cache and dispatch policy configuration.

use std::time::Duration;

use fed_core::enums::DispatchPolicy;
use serde::{Deserialize, Serialize};

/// Default freshness window for cached result lines, in seconds.
const fn default_ttl_secs() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultsConfig {
    /// Result lines older than this are excluded from polling reads.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl ResultsConfig {
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for ResultsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// What to do when one broker fails to accept a query.
    #[serde(default)]
    pub policy: DispatchPolicy,
}
