//! Client configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then environment variables. Command-line flags are applied last by the
//! caller through the `with_*` builders.

use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::error::{ClientError, ClientResult};

/// Default Estimation Service base URL.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000";

/// Default HTTP timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the endpoint.
pub const ENDPOINT_ENV: &str = "ROOFEST_ENDPOINT";

/// Environment variable overriding the timeout, in seconds.
pub const TIMEOUT_ENV: &str = "ROOFEST_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Base URL the API paths are appended to
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Defaults, then `path` if given, then the environment.
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            config = config.merge_file(path)?;
        }
        config.merge_env()
    }

    /// Overlay the settings found in a TOML file.
    pub fn merge_file(self, path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ClientError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&content).map_err(|source| ClientError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded client config file");
        Ok(self.overlay(file.endpoint, file.timeout_secs))
    }

    /// Overlay `ROOFEST_ENDPOINT` and `ROOFEST_TIMEOUT_SECS`.
    pub fn merge_env(self) -> ClientResult<Self> {
        self.merge_vars(|name| std::env::var(name).ok())
    }

    /// Overlay variables obtained from `lookup`.
    pub fn merge_vars(self, lookup: impl Fn(&str) -> Option<String>) -> ClientResult<Self> {
        let endpoint = lookup(ENDPOINT_ENV).filter(|v| !v.trim().is_empty());
        let timeout_secs = match lookup(TIMEOUT_ENV) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ClientError::InvalidConfig(format!("{} must be a number of seconds, got '{}'", TIMEOUT_ENV, raw))
            })?),
            None => None,
        };
        Ok(self.overlay(endpoint, timeout_secs))
    }

    fn overlay(mut self, endpoint: Option<String>, timeout_secs: Option<u64>) -> Self {
        if let Some(endpoint) = endpoint {
            self.endpoint = endpoint;
        }
        if let Some(secs) = timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        self
    }

    /// Check the settings and parse the endpoint.
    pub fn base_url(&self) -> ClientResult<Url> {
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidConfig("timeout must be greater than zero".to_string()));
        }

        let invalid = |reason: String| ClientError::InvalidEndpoint {
            endpoint: self.endpoint.clone(),
            reason,
        };
        let url = Url::parse(self.endpoint.trim()).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("not a base URL".to_string()));
        }
        Ok(url)
    }
}
