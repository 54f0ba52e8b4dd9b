//! Configuration loading and validation for `shq-enqueue`.
//!
//! The API connection settings come from [`ClientConfig::from_env`]; this
//! module only covers what the binary adds on top.

use anyhow::{Context, Result};
use serde::Deserialize;
use shq_client::ClientConfig;

/// Validated `shq-enqueue` configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// API token sent as `shq-token`. **Required.**
    pub token: String,

    /// Function to enqueue. **Required.**
    pub function_name: String,

    /// URL the service calls back to run the function. **Required.**
    pub callback_url: String,

    /// API connection settings, read from the `SHQ_*` variables.
    #[serde(skip)]
    pub client: ClientConfig,
}

/// Tracing log level, from `LOG_LEVEL`.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    /// Load and validate configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("SHQ"))
            .build()
            .context("failed to build shq-enqueue configuration")?;

        let mut c: Config = cfg
            .try_deserialize()
            .context("failed to deserialise shq-enqueue configuration")?;
        c.client = ClientConfig::from_env().context("invalid SHQ_* client configuration")?;

        c.validate()?;
        Ok(c)
    }

    fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            anyhow::bail!("SHQ_TOKEN is required and must not be empty");
        }
        if self.function_name.trim().is_empty() {
            anyhow::bail!("SHQ_FUNCTION_NAME is required and must not be empty");
        }
        if !(self.callback_url.starts_with("http://") || self.callback_url.starts_with("https://")) {
            anyhow::bail!("SHQ_CALLBACK_URL must be an http(s) URL");
        }
        Ok(())
    }
}

impl LogConfig {
    /// Read `LOG_LEVEL`, defaulting to `info`.
    pub fn from_env() -> Result<Self> {
        config::Config::builder()
            .add_source(config::Environment::default())
            .build()
            .and_then(config::Config::try_deserialize)
            .context("failed to read LOG_LEVEL")
    }
}
