//! Startup assembly of the enabled brokers.

use fed_config::BrokersConfig;
use fed_core::enums::BrokerType;

use crate::error::BrokerError;
use crate::status::{StatusReceiver, status_channel};
use crate::{
    AktinBrokerClient, BrokerClient, DirectBrokerClient, DsfBrokerClient, MockBrokerClient,
};

/// The brokers a query is dispatched to, in configuration order.
#[derive(Debug, Default)]
pub struct BrokerRegistry {
    brokers: Vec<BrokerClient>,
}

impl BrokerRegistry {
    /// Build every broker listed in `brokers.enabled`. Duplicates are
    /// collapsed; the aktin event stream is started immediately, so this must
    /// run inside a Tokio runtime when aktin is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotConfigured`] for an enabled broker whose
    /// section is incomplete.
    pub fn from_config(config: &BrokersConfig) -> Result<Self, BrokerError> {
        let mut registry = Self::default();
        for &broker_type in &config.enabled {
            if registry.get(broker_type).is_some() {
                continue;
            }
            if !config.is_configured(broker_type) {
                return Err(BrokerError::NotConfigured(broker_type));
            }
            let client = match broker_type {
                BrokerType::Mock => MockBrokerClient::new(config.mock.clone()).into(),
                BrokerType::Direct => DirectBrokerClient::new(config.direct.clone()).into(),
                BrokerType::Aktin => AktinBrokerClient::connect(config.aktin.clone()).into(),
                BrokerType::Dsf => DsfBrokerClient::new(config.dsf.clone()).into(),
            };
            tracing::info!(broker = %broker_type, "broker enabled");
            registry.brokers.push(client);
        }
        Ok(registry)
    }

    /// Add an already built broker, replacing one of the same type.
    #[must_use]
    pub fn with(mut self, client: impl Into<BrokerClient>) -> Self {
        let client = client.into();
        self.brokers
            .retain(|b| b.broker_type() != client.broker_type());
        self.brokers.push(client);
        self
    }

    #[must_use]
    pub fn get(&self, broker_type: BrokerType) -> Option<&BrokerClient> {
        self.brokers.iter().find(|b| b.broker_type() == broker_type)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BrokerClient> {
        self.brokers.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.brokers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.brokers.is_empty()
    }

    /// Register one shared listener with every broker and return the merged
    /// receiving end.
    #[must_use]
    pub fn subscribe(&self) -> StatusReceiver {
        let (tx, rx) = status_channel();
        for broker in &self.brokers {
            broker.add_status_listener(tx.clone());
        }
        rx
    }

    /// Shut every broker down. Channels returned by [`Self::subscribe`]
    /// close once the last broker has released its listener.
    pub fn shutdown_all(&self) {
        for broker in &self.brokers {
            broker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fed_config::{DirectBrokerConfig, DsfBrokerConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn default_config_builds_mock_only() {
        let registry = BrokerRegistry::from_config(&BrokersConfig::default()).unwrap();
        let types: Vec<BrokerType> = registry.iter().map(BrokerClient::broker_type).collect();
        assert_eq!(types, vec![BrokerType::Mock]);
    }

    #[tokio::test]
    async fn shutdown_closes_subscribed_channel() {
        let registry = BrokerRegistry::default()
            .with(MockBrokerClient::new(fed_config::MockBrokerConfig::default()))
            .with(DirectBrokerClient::new(DirectBrokerConfig::default()));
        let mut rx = registry.subscribe();

        registry.shutdown_all();
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn enabled_but_unconfigured_is_rejected() {
        let config = BrokersConfig {
            enabled: vec![BrokerType::Mock, BrokerType::Direct],
            ..BrokersConfig::default()
        };
        let err = BrokerRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, BrokerError::NotConfigured(BrokerType::Direct)));
    }

    #[test]
    fn duplicates_collapse_and_order_is_kept() {
        let config = BrokersConfig {
            enabled: vec![
                BrokerType::Dsf,
                BrokerType::Direct,
                BrokerType::Dsf,
            ],
            direct: DirectBrokerConfig {
                url: "http://localhost:8080/evaluate".into(),
                ..DirectBrokerConfig::default()
            },
            dsf: DsfBrokerConfig {
                base_url: "http://localhost:8081/fhir".into(),
                organization_id: "requester.org".into(),
                ..DsfBrokerConfig::default()
            },
            ..BrokersConfig::default()
        };
        let registry = BrokerRegistry::from_config(&config).unwrap();
        let types: Vec<BrokerType> = registry.iter().map(BrokerClient::broker_type).collect();
        assert_eq!(types, vec![BrokerType::Dsf, BrokerType::Direct]);
    }

    #[test]
    fn with_replaces_same_type() {
        let registry = BrokerRegistry::default()
            .with(MockBrokerClient::new(fed_config::MockBrokerConfig::default()))
            .with(MockBrokerClient::new(fed_config::MockBrokerConfig::default()));
        assert_eq!(registry.len(), 1);
    }
}
