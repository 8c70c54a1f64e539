//! Provider and endpoint records.

use crate::Model;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where and how a provider's model listing is fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderApi {
    pub base_url: String,
    /// Path appended to `base_url` for the list-models call.
    #[serde(default = "default_models_path")]
    pub models_path: String,
}

fn default_models_path() -> String {
    "/models".to_string()
}

/// A provider record. One provider owns one model record per model id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api: Option<ProviderApi>,
    /// Environment variable names that satisfy this provider's credential
    /// policy. The first set variable wins.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env_keys: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials_required: Option<bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub models: BTreeMap<String, Model>,
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Provider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            aliases: Vec::new(),
            api: None,
            env_keys: Vec::new(),
            credentials_required: None,
            models: BTreeMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    /// Look up the provider's API credential in the environment.
    ///
    /// Returns `None` when no declared variable is set, which callers treat
    /// as "skip this provider", never as an error.
    pub fn credential_from_env(&self) -> Option<String> {
        self.env_keys
            .iter()
            .filter_map(|key| std::env::var(key).ok())
            .find(|v| !v.is_empty())
    }

    /// Clone of this provider without its model map, for contexts that
    /// persist or transmit provider configuration alone.
    pub fn config_only(&self) -> Provider {
        let mut p = self.clone();
        p.models.clear();
        p
    }
}

/// A named invocation endpoint. Currently a passive record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(flatten, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Endpoint {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            extra: serde_json::Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_lookup_prefers_first_set_key() {
        std::env::set_var("LODESTAR_TEST_KEY_B", "beta");
        let mut p = Provider::new("p");
        p.env_keys = vec![
            "LODESTAR_TEST_KEY_A".to_string(),
            "LODESTAR_TEST_KEY_B".to_string(),
        ];
        assert_eq!(p.credential_from_env().as_deref(), Some("beta"));
        std::env::remove_var("LODESTAR_TEST_KEY_B");
    }

    #[test]
    fn config_only_drops_models() {
        let mut p = Provider::new("p");
        p.models.insert("m".to_string(), Model::new("m"));
        assert!(p.config_only().models.is_empty());
        assert_eq!(p.models.len(), 1);
    }
}
