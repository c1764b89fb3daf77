//! Configuration — YAML config + env var overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{INITIAL_TIMEOUT_SECS, TIMEOUT_FLOOR_SECS};

/// Known provider presets
const PROVIDER_PRESETS: &[(&str, Option<&str>)] = &[
    ("openai", None),
    ("openrouter", Some("https://openrouter.ai/api/v1")),
];

/// Provider-specific API key env vars (checked before OPENAI_API_KEY fallback)
const PROVIDER_KEY_ENV_VARS: &[(&str, &str)] = &[("openrouter", "OPENROUTER_API_KEY")];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// "openai" | "openrouter" | "custom"
    #[serde(default = "default_provider")]
    pub provider: String,

    /// LLM model name
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (set here or via env var)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Base URL for Chat Completions API (auto-set for known providers)
    #[serde(default)]
    pub base_url: Option<String>,

    /// Which timeout advisor to use: "auto" | "model" | "rules".
    /// "auto" picks the model when an API key is available, rules otherwise.
    #[serde(default = "default_advisor")]
    pub advisor: String,

    /// Starting inactivity timeout for new sessions, in seconds
    #[serde(default = "default_initial_timeout")]
    pub initial_timeout_secs: u32,

    /// Wall-clock budget for one advisor evaluation, retries included
    #[serde(default = "default_advisor_deadline")]
    pub advisor_deadline_secs: u64,

    /// HTTP timeout for a single advisor attempt
    #[serde(default = "default_attempt_timeout")]
    pub advisor_attempt_timeout_secs: u64,

    /// Relay server base URL (e.g. http://127.0.0.1:8787). None = local loopback.
    #[serde(default)]
    pub relay_url: Option<String>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4.1".into()
}
fn default_advisor() -> String {
    "auto".into()
}
fn default_initial_timeout() -> u32 {
    INITIAL_TIMEOUT_SECS
}
fn default_advisor_deadline() -> u64 {
    12
}
fn default_attempt_timeout() -> u64 {
    30
}

impl Config {
    /// Load config from a YAML file with env var overrides.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config: {}", config_path.display()))?;

        let config: Config =
            serde_yaml::from_str(&content).context("Failed to parse config.yaml")?;

        config.finalize()
    }

    /// Load from a YAML file if it exists, otherwise start from defaults.
    /// Env var overrides apply either way.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            Config::default().finalize()
        }
    }

    /// Apply env var overrides, resolve provider presets, validate.
    fn finalize(mut self) -> Result<Self> {
        // Provider (env var override)
        if let Ok(p) = std::env::var("MAYFLY_PROVIDER") {
            self.provider = p;
        }

        // Base URL: env var > config > provider preset
        if let Ok(url) = std::env::var("MAYFLY_BASE_URL") {
            self.base_url = Some(url);
        } else if self.base_url.is_none() {
            self.base_url = PROVIDER_PRESETS
                .iter()
                .find(|(p, _)| *p == self.provider)
                .and_then(|(_, url)| url.map(String::from));
        }

        // API key: provider-specific env var > OPENAI_API_KEY > config
        let provider_key_var = PROVIDER_KEY_ENV_VARS
            .iter()
            .find(|(p, _)| *p == self.provider)
            .map(|(_, var)| *var);

        if let Some(var) = provider_key_var {
            if let Ok(key) = std::env::var(var) {
                self.api_key = Some(key);
            }
        }
        if self.api_key.is_none() {
            if let Ok(key) = std::env::var("OPENAI_API_KEY") {
                self.api_key = Some(key);
            }
        }

        // Model (env var override)
        if let Ok(m) = std::env::var("MAYFLY_MODEL") {
            self.model = m;
        }

        // Advisor mode (env var override)
        if let Ok(a) = std::env::var("MAYFLY_ADVISOR") {
            self.advisor = a;
        }

        // Relay URL (env var override)
        if let Ok(url) = std::env::var("MAYFLY_RELAY_URL") {
            self.relay_url = Some(url);
        }

        // Validation
        if self.provider == "custom" && self.base_url.is_none() {
            anyhow::bail!(
                "Provider 'custom' requires base_url in config.yaml or MAYFLY_BASE_URL env var"
            );
        }
        if !matches!(self.advisor.as_str(), "auto" | "model" | "rules") {
            anyhow::bail!(
                "Unknown advisor '{}': expected auto, model, or rules",
                self.advisor
            );
        }
        if self.initial_timeout_secs < TIMEOUT_FLOOR_SECS {
            anyhow::bail!(
                "initial_timeout_secs must be at least {TIMEOUT_FLOOR_SECS}, got {}",
                self.initial_timeout_secs
            );
        }

        Ok(self)
    }

    /// Whether the model-backed advisor can actually run.
    pub fn model_advisor_available(&self) -> bool {
        self.api_key.is_some() || self.provider == "custom"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: None,
            advisor: default_advisor(),
            initial_timeout_secs: default_initial_timeout(),
            advisor_deadline_secs: default_advisor_deadline(),
            advisor_attempt_timeout_secs: default_attempt_timeout(),
            relay_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_defaults() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "provider: openai\nmodel: gpt-4.1").unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model, "gpt-4.1");
        assert_eq!(config.advisor, "auto");
        assert_eq!(config.initial_timeout_secs, 300);
        assert_eq!(config.advisor_deadline_secs, 12);
        assert_eq!(config.advisor_attempt_timeout_secs, 30);
    }

    #[test]
    fn test_load_config_custom_values() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(
            tmp,
            "provider: custom\nmodel: llama3\nbase_url: http://localhost:11434/v1\ninitial_timeout_secs: 120"
        )
        .unwrap();

        let config = Config::load(tmp.path()).unwrap();
        assert_eq!(config.provider, "custom");
        assert_eq!(config.model, "llama3");
        assert_eq!(
            config.base_url.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.initial_timeout_secs, 120);
    }

    #[test]
    fn test_custom_without_base_url_fails() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "provider: custom\nmodel: llama3").unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_advisor_fails() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "advisor: psychic").unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_timeout_below_floor_fails() {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "initial_timeout_secs: 30").unwrap();

        let result = Config::load(tmp.path());
        assert!(result.is_err());
    }
}
