//! Database location.

use serde::{Deserialize, Serialize};

fn default_path() -> String {
    "fedq.db".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
        }
    }
}
