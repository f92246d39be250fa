//! # fed-config
//!
//! Layered configuration loading for the feasibility federation using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`FEDQ_*` prefix, `__` as separator)
//! 2. Project-level `.fedq/config.toml`
//! 3. User-level `~/.config/fedq/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `FEDQ_BROKERS__DIRECT__URL` -> `brokers.direct.url`,
//! `FEDQ_RESULTS__TTL_SECS` -> `results.ttl_secs`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use fed_config::FedConfig;
//!
//! let config = FedConfig::load_with_dotenv().expect("config");
//! config.validate().expect("enabled brokers are configured");
//! println!("result ttl: {:?}", config.results.ttl());
//! ```

mod brokers;
mod database;
mod error;
mod results;

pub use brokers::{
    AktinBrokerConfig, BrokersConfig, DirectBrokerConfig, DsfBrokerConfig, MockBrokerConfig,
};
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use results::{DispatchConfig, ResultsConfig};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const REDACTED: &str = "********";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FedConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub results: ResultsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub brokers: BrokersConfig,
}

impl FedConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] if a source cannot be parsed or a
    /// value has the wrong type.
    pub fn load() -> Result<Self, ConfigError> {
        Self::figment().extract().map_err(ConfigError::from)
    }

    /// Load configuration with `.env` file support.
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests and the CLI can layer extra providers on top.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".fedq/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("FEDQ_").split("__"))
    }

    /// Check that every enabled broker has the settings it needs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BrokerNotConfigured`] for the first incomplete
    /// broker section, or [`ConfigError::InvalidValue`] for an empty broker
    /// list or a zero TTL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.enabled.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "brokers.enabled",
                reason: "at least one broker must be enabled".into(),
            });
        }
        if self.results.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "results.ttl_secs",
                reason: "must be greater than zero".into(),
            });
        }
        for broker in &self.brokers.enabled {
            if !self.brokers.is_configured(*broker) {
                return Err(ConfigError::BrokerNotConfigured { broker: *broker });
            }
        }
        Ok(())
    }

    /// Copy of this configuration with secrets masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for secret in [
            &mut copy.brokers.direct.password,
            &mut copy.brokers.aktin.api_key,
            &mut copy.brokers.dsf.auth_token,
        ] {
            if !secret.is_empty() {
                *secret = REDACTED.to_string();
            }
        }
        copy
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("fedq").join("config.toml"))
    }

    /// Load `.env` from the workspace root.
    ///
    /// Walks up from `CARGO_MANIFEST_DIR` (if available) or falls back to the
    /// current directory. Silently does nothing if no `.env` is found.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}
