use anyhow::{Context as AnyhowContext, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::Path;
use taxonav_funnel::FunnelConfig;
use taxonav_gateway::{GatewaySettings, RetryPolicy};

pub(crate) const API_KEY_ENV: &str = "OPENAI_API_KEY";
pub(crate) const API_KEY_FILE: &str = "data/api_key.txt";

/// Contents of a `--config` file. Every section is optional.
///
/// ```toml
/// [funnel]
/// batch_size = 50
/// l1_match = "exact"
///
/// [funnel.models]
/// final_selection = "gpt-4.1"
///
/// [retry]
/// max_attempts = 5
///
/// [gateway]
/// base_url = "http://localhost:8080/v1"
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct AppConfig {
    pub funnel: FunnelConfig,
    pub retry: RetryPolicy,
    pub gateway: GatewaySettings,
}

impl AppConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Re-check after command-line overrides have been applied
    pub fn validate(&self) -> Result<()> {
        self.funnel.validate()?;
        self.retry.validate().map_err(anyhow::Error::msg)?;
        Ok(())
    }
}

/// Find an API key: explicit flag, then environment, then the config file,
/// then the key file. Blank values are skipped.
pub(crate) fn resolve_api_key(
    explicit: Option<&str>,
    env_value: Option<&str>,
    configured: &str,
    key_file: &Path,
) -> Option<String> {
    let sources = [
        ("--api-key", explicit),
        (API_KEY_ENV, env_value),
        ("config file", Some(configured)),
    ];
    for (source, value) in sources {
        if let Some(key) = value.map(str::trim).filter(|key| !key.is_empty()) {
            log::debug!("API key taken from {source}");
            return Some(key.to_string());
        }
    }

    match fs::read_to_string(key_file) {
        Ok(raw) if !raw.trim().is_empty() => {
            log::debug!("API key read from {}", key_file.display());
            Some(raw.trim().to_string())
        }
        Ok(_) => {
            log::warn!("API key file {} is empty", key_file.display());
            None
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            log::debug!("No API key file at {}", key_file.display());
            None
        }
        Err(err) => {
            log::warn!("Failed to read API key file {}: {err}", key_file.display());
            None
        }
    }
}

/// OpenAI keys start with `sk-`; anything else is used anyway
pub(crate) fn has_expected_key_format(key: &str) -> bool {
    key.starts_with("sk-")
}
