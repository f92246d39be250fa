use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A participating hospital site, created lazily on first observation.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct Site {
    pub id: String,
    pub site_name: String,
}
