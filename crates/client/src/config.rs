//! Client configuration.
//!
//! [`ClientConfig`] can be built directly or loaded from `SHQ_`-prefixed
//! environment variables with [`ClientConfig::from_env`]. Nothing else in the
//! crate reads the environment.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::crypto::{Encryptor, Secret};

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The environment could not be read or deserialised.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validated client configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Scheme and host of the API, e.g. `https://www.serverlesshq.com`.
    #[serde(default = "default_api_host")]
    pub api_host: String,

    /// Path prefix of the API endpoints.
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Secret used to encrypt outbound and decrypt inbound payloads.
    /// Unset or empty disables encryption.
    #[serde(default)]
    pub encryption_secret: Option<Secret>,

    /// Secret being rotated out. Only ever used to decrypt.
    #[serde(default)]
    pub previous_secret: Option<Secret>,

    /// Upper bound on a single API call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_api_host() -> String {
    "https://www.serverlesshq.com".into()
}
fn default_api_path() -> String {
    "/api".into()
}
fn default_request_timeout() -> u64 {
    30
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_host: default_api_host(),
            api_path: default_api_path(),
            encryption_secret: None,
            previous_secret: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ClientConfig {
    /// Load and validate configuration from `SHQ_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable cannot be parsed or fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::Environment::with_prefix("SHQ"))
            .build()?;

        let c: ClientConfig = cfg.try_deserialize()?;
        c.validate()?;
        Ok(c)
    }

    /// Set the encryption secrets.
    pub fn with_secrets(mut self, current: impl Into<Secret>, previous: Option<Secret>) -> Self {
        self.encryption_secret = Some(current.into());
        self.previous_secret = previous;
        self
    }

    /// Point the client at a different API host.
    pub fn with_api_host(mut self, api_host: impl Into<String>) -> Self {
        self.api_host = api_host.into();
        self
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Build the encryptor if an encryption secret is configured.
    ///
    /// `None` means payloads travel serialised but unencrypted.
    pub fn encryptor(&self) -> Option<Encryptor> {
        let current = self.encryption_secret.as_ref().filter(|s| !s.is_empty())?;
        Some(Encryptor::new(current, self.previous_secret.as_ref()))
    }

    /// Validate all fields, returning a descriptive error on the first failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.api_host.starts_with("http://") || self.api_host.starts_with("https://")) {
            return Err(ConfigError::Invalid(
                "SHQ_API_HOST must start with http:// or https://".into(),
            ));
        }
        if !self.api_path.is_empty() && !self.api_path.starts_with('/') {
            return Err(ConfigError::Invalid(
                "SHQ_API_PATH must be empty or start with '/'".into(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "SHQ_REQUEST_TIMEOUT_SECS must be > 0".into(),
            ));
        }
        Ok(())
    }
}
