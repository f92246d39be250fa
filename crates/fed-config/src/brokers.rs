//! Broker selection and per-broker connection settings.
//!
//! `enabled` decides which broker clients are assembled at startup. Remote
//! brokers must be configured before they can be enabled; the mock broker
//! works out of the box.

use std::collections::BTreeMap;

use fed_core::enums::BrokerType;
use serde::{Deserialize, Serialize};

fn default_enabled() -> Vec<BrokerType> {
    vec![BrokerType::Mock]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokersConfig {
    /// Broker types assembled at startup, in dispatch order.
    #[serde(default = "default_enabled")]
    pub enabled: Vec<BrokerType>,

    #[serde(default)]
    pub mock: MockBrokerConfig,

    #[serde(default)]
    pub direct: DirectBrokerConfig,

    #[serde(default)]
    pub aktin: AktinBrokerConfig,

    #[serde(default)]
    pub dsf: DsfBrokerConfig,
}

impl Default for BrokersConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mock: MockBrokerConfig::default(),
            direct: DirectBrokerConfig::default(),
            aktin: AktinBrokerConfig::default(),
            dsf: DsfBrokerConfig::default(),
        }
    }
}

impl BrokersConfig {
    /// Whether the settings for `broker` are complete enough to connect.
    #[must_use]
    pub fn is_configured(&self, broker: BrokerType) -> bool {
        match broker {
            BrokerType::Mock => self.mock.is_configured(),
            BrokerType::Direct => self.direct.is_configured(),
            BrokerType::Aktin => self.aktin.is_configured(),
            BrokerType::Dsf => self.dsf.is_configured(),
        }
    }
}

// ── Mock ───────────────────────────────────────────────────────────

fn default_mock_site_ids() -> Vec<String> {
    ["2", "3", "4", "5"].into_iter().map(String::from).collect()
}

fn default_mock_site_names() -> BTreeMap<String, String> {
    [
        ("2", "Erlangen"),
        ("3", "Frankfurt"),
        ("4", "Leipzig"),
        ("5", "Mainz"),
    ]
    .into_iter()
    .map(|(id, name)| (id.to_string(), name.to_string()))
    .collect()
}

const fn default_min_delay_ms() -> u64 {
    500
}

const fn default_max_delay_ms() -> u64 {
    2000
}

const fn default_min_result() -> u64 {
    10
}

const fn default_max_result() -> u64 {
    1000
}

const fn default_max_concurrency() -> usize {
    16
}

/// Simulated broker: every site answers after a random delay.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MockBrokerConfig {
    #[serde(default = "default_mock_site_ids")]
    pub site_ids: Vec<String>,

    /// Display names keyed by site id. Sites without an entry use their id.
    #[serde(default = "default_mock_site_names")]
    pub site_names: BTreeMap<String, String>,

    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_min_result")]
    pub min_result: u64,

    #[serde(default = "default_max_result")]
    pub max_result: u64,

    /// Upper bound on simulated sites executing at the same time.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for MockBrokerConfig {
    fn default() -> Self {
        Self {
            site_ids: default_mock_site_ids(),
            site_names: default_mock_site_names(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            min_result: default_min_result(),
            max_result: default_max_result(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl MockBrokerConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.site_ids.is_empty()
            && self.min_delay_ms <= self.max_delay_ms
            && self.min_result <= self.max_result
            && self.max_concurrency > 0
    }
}

// ── Direct ─────────────────────────────────────────────────────────

fn default_direct_site_name() -> String {
    "FHIR Server".to_string()
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Single-site broker answering synchronously over HTTP.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DirectBrokerConfig {
    /// Evaluation endpoint receiving the query body.
    #[serde(default)]
    pub url: String,

    /// Send CQL instead of the structured query.
    #[serde(default)]
    pub use_cql: bool,

    #[serde(default = "default_direct_site_name")]
    pub site_name: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Optional basic-auth credentials.
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

impl Default for DirectBrokerConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            use_cql: false,
            site_name: default_direct_site_name(),
            timeout_secs: default_timeout_secs(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl DirectBrokerConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.is_empty()
    }

    /// Basic-auth credentials, if a username is set.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        if self.username.is_empty() {
            None
        } else {
            Some((self.username.as_str(), self.password.as_str()))
        }
    }
}

// ── Aktin ──────────────────────────────────────────────────────────

const fn default_reconnect_secs() -> u64 {
    10
}

/// Stateful remote broker with a push event stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AktinBrokerConfig {
    /// Broker base URL (e.g., `https://broker.example.org/aktin`).
    #[serde(default)]
    pub base_url: String,

    /// Bearer token for REST and event stream requests.
    #[serde(default)]
    pub api_key: String,

    /// Fixed delay before reconnecting a dropped event stream.
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,
}

impl Default for AktinBrokerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            reconnect_secs: default_reconnect_secs(),
        }
    }
}

impl AktinBrokerConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.api_key.is_empty()
    }
}

// ── DSF ────────────────────────────────────────────────────────────

const fn default_poll_interval_secs() -> u64 {
    5
}

/// Task-based broker; per-site task status is polled.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DsfBrokerConfig {
    /// FHIR base URL of the local DSF instance.
    #[serde(default)]
    pub base_url: String,

    /// Identifier of the requesting organization.
    #[serde(default)]
    pub organization_id: String,

    /// Bearer token, if the instance requires one.
    #[serde(default)]
    pub auth_token: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for DsfBrokerConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            organization_id: String::new(),
            auth_token: String::new(),
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl DsfBrokerConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.organization_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_only_mock() {
        let config = BrokersConfig::default();
        assert_eq!(config.enabled, vec![BrokerType::Mock]);
        assert!(config.is_configured(BrokerType::Mock));
        assert!(!config.is_configured(BrokerType::Direct));
        assert!(!config.is_configured(BrokerType::Aktin));
        assert!(!config.is_configured(BrokerType::Dsf));
    }

    #[test]
    fn mock_defaults_cover_four_sites() {
        let mock = MockBrokerConfig::default();
        assert_eq!(mock.site_ids, vec!["2", "3", "4", "5"]);
        assert_eq!(mock.site_names.get("2").map(String::as_str), Some("Erlangen"));
        assert!(mock.min_result >= 10);
    }

    #[test]
    fn mock_with_inverted_delay_is_not_configured() {
        let mock = MockBrokerConfig {
            min_delay_ms: 10,
            max_delay_ms: 5,
            ..MockBrokerConfig::default()
        };
        assert!(!mock.is_configured());
    }

    #[test]
    fn direct_credentials_require_username() {
        let mut direct = DirectBrokerConfig::default();
        assert!(direct.credentials().is_none());
        direct.username = "fhir".into();
        direct.password = "secret".into();
        assert_eq!(direct.credentials(), Some(("fhir", "secret")));
    }
}
