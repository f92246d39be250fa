//! Integration tests for TOML and environment configuration loading.
//!
//! Uses figment::Jail for sandboxed file and env var manipulation.

use figment::{
    Figment, Jail,
    providers::{Env, Format, Serialized, Toml},
};
use fed_config::FedConfig;
use fed_core::enums::{BrokerType, DispatchPolicy};
use pretty_assertions::assert_eq;

#[test]
fn loads_broker_sections_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[brokers]
enabled = ["mock", "direct", "aktin"]

[brokers.direct]
url = "http://localhost:8080/fhir/evaluate"
use_cql = true
site_name = "Local FHIR"

[brokers.aktin]
base_url = "https://broker.example.org/aktin"
api_key = "xxxApiKeyAdmin123"
reconnect_secs = 3
"#,
        )?;

        let config: FedConfig = Figment::from(Serialized::defaults(FedConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(
            config.brokers.enabled,
            vec![BrokerType::Mock, BrokerType::Direct, BrokerType::Aktin]
        );
        assert!(config.brokers.direct.use_cql);
        assert_eq!(config.brokers.direct.site_name, "Local FHIR");
        assert_eq!(config.brokers.direct.timeout_secs, 30);
        assert_eq!(config.brokers.aktin.reconnect_secs, 3);
        assert!(config.validate().is_ok());
        Ok(())
    });
}

#[test]
fn loads_results_and_policy_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[results]
ttl_secs = 60

[dispatch]
policy = "best_effort"
"#,
        )?;

        let config: FedConfig = Figment::from(Serialized::defaults(FedConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.results.ttl_secs, 60);
        assert_eq!(config.dispatch.policy, DispatchPolicy::BestEffort);
        Ok(())
    });
}

#[test]
fn env_overrides_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[brokers.dsf]
base_url = "https://dsf.example.org/fhir"
organization_id = "toml-org"
"#,
        )?;
        jail.set_env("FEDQ_BROKERS__DSF__ORGANIZATION_ID", "env-org");
        jail.set_env("FEDQ_DATABASE__PATH", ":memory:");

        let config: FedConfig = Figment::from(Serialized::defaults(FedConfig::default()))
            .merge(Toml::file("config.toml"))
            .merge(Env::prefixed("FEDQ_").split("__"))
            .extract()?;

        assert_eq!(config.brokers.dsf.organization_id, "env-org");
        assert_eq!(config.brokers.dsf.base_url, "https://dsf.example.org/fhir");
        assert_eq!(config.database.path, ":memory:");
        Ok(())
    });
}

#[test]
fn project_config_file_is_picked_up() {
    Jail::expect_with(|jail| {
        jail.create_dir(".fedq")?;
        jail.create_file(
            ".fedq/config.toml",
            r#"
[results]
ttl_secs = 42
"#,
        )?;

        let config = FedConfig::load().expect("config loads");
        assert_eq!(config.results.ttl_secs, 42);
        Ok(())
    });
}

#[test]
fn malformed_value_is_reported() {
    Jail::expect_with(|jail| {
        jail.set_env("FEDQ_RESULTS__TTL_SECS", "soon");
        assert!(FedConfig::load().is_err());
        Ok(())
    });
}
