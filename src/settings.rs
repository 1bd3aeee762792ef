//! Runtime settings for the computer-use agent, read from the environment.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::ModelConfig;

/// Connection and language settings shared by the CLI and embedders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Vision model API base URL
    pub vlm_base_url: String,
    /// Vision model API key
    pub vlm_api_key: String,
    /// Vision model name
    pub vlm_model_name: String,
    /// Reasoning model API base URL
    pub reasoning_base_url: String,
    /// Reasoning model API key
    pub reasoning_api_key: String,
    /// Reasoning model name
    pub reasoning_model_name: String,
    /// Knowledge base JSON file (optional)
    pub knowledge_base_path: Option<PathBuf>,
    /// Language code ("en" or "zh")
    pub lang: String,
}

impl Default for Settings {
    fn default() -> Self {
        let vlm = ModelConfig::default();
        let reasoning = ModelConfig::reasoning();
        Self {
            vlm_base_url: vlm.base_url,
            vlm_api_key: vlm.api_key,
            vlm_model_name: vlm.model_name,
            reasoning_base_url: reasoning.base_url,
            reasoning_api_key: reasoning.api_key,
            reasoning_model_name: reasoning.model_name,
            knowledge_base_path: None,
            lang: "en".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`, falling back to defaults for unset
    /// or empty keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            vlm_base_url: get("VLM_BASE_URL").unwrap_or(defaults.vlm_base_url),
            vlm_api_key: get("VLM_API_KEY").unwrap_or(defaults.vlm_api_key),
            vlm_model_name: get("VLM_MODEL_NAME").unwrap_or(defaults.vlm_model_name),
            reasoning_base_url: get("REASONING_BASE_URL").unwrap_or(defaults.reasoning_base_url),
            reasoning_api_key: get("OPENAI_API_KEY").unwrap_or(defaults.reasoning_api_key),
            reasoning_model_name: get("REASONING_MODEL")
                .unwrap_or(defaults.reasoning_model_name),
            knowledge_base_path: get("KNOWLEDGE_BASE_PATH").map(PathBuf::from),
            lang: get("AGENT_LANG").unwrap_or(defaults.lang),
        }
    }

    /// Model config for the vision model driving the loop.
    pub fn vlm_model_config(&self) -> ModelConfig {
        ModelConfig::default()
            .with_base_url(&self.vlm_base_url)
            .with_api_key(&self.vlm_api_key)
            .with_model_name(&self.vlm_model_name)
    }

    /// Model config for the reasoning model used by the decomposer.
    pub fn reasoning_model_config(&self) -> ModelConfig {
        ModelConfig::reasoning()
            .with_base_url(&self.reasoning_base_url)
            .with_api_key(&self.reasoning_api_key)
            .with_model_name(&self.reasoning_model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let settings = Settings::from_lookup(lookup(&[]));
        assert_eq!(settings.reasoning_model_name, "gpt-4o");
        assert_eq!(settings.lang, "en");
        assert!(settings.knowledge_base_path.is_none());
    }

    #[test]
    fn test_reads_environment_keys() {
        let settings = Settings::from_lookup(lookup(&[
            ("VLM_BASE_URL", "http://vlm.local/v1"),
            ("VLM_MODEL_NAME", "ui-tars-7b"),
            ("OPENAI_API_KEY", "sk-test"),
            ("REASONING_MODEL", "gpt-4o-mini"),
            ("KNOWLEDGE_BASE_PATH", "/tmp/kb.json"),
            ("AGENT_LANG", "zh"),
            ("VLM_API_KEY", "  "),
        ]));

        let vlm = settings.vlm_model_config();
        assert_eq!(vlm.base_url, "http://vlm.local/v1");
        assert_eq!(vlm.model_name, "ui-tars-7b");
        assert_eq!(vlm.api_key, ModelConfig::default().api_key);

        let reasoning = settings.reasoning_model_config();
        assert_eq!(reasoning.api_key, "sk-test");
        assert_eq!(reasoning.model_name, "gpt-4o-mini");
        assert_eq!(reasoning.temperature, ModelConfig::reasoning().temperature);

        assert_eq!(settings.knowledge_base_path, Some(PathBuf::from("/tmp/kb.json")));
        assert_eq!(settings.lang, "zh");
    }
}
