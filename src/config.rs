use crate::error::{RelayError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Process-wide settings, fixed at startup and handed to the router by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_timeout_ms() -> u64 {
    120_000
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_key: String::new(),
            base_url: default_base_url(),
            default_model: default_model(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RelayConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Explicit path first, then `kbserver.toml` in the current directory,
    /// then built-in defaults.
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        let candidate = PathBuf::from("kbserver.toml");
        if candidate.exists() {
            tracing::info!(path = %candidate.display(), "Loading config");
            return Self::load(&candidate);
        }

        Ok(Self::default())
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup. Empty values are ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OPENAI_API_KEY") {
            self.api_key = key;
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.base_url = url;
        }
        if let Some(model) = get("DEFAULT_MODEL") {
            self.default_model = model;
        }
        if let Some(host) = get("KBSERVER_HOST") {
            self.host = host;
        }
        if let Some(port) = get("KBSERVER_PORT") {
            self.port = port.trim().parse().map_err(|_| {
                RelayError::config(format!("KBSERVER_PORT must be a port number, got '{port}'"))
            })?;
        }
        if let Some(timeout) = get("API_TIMEOUT_MS") {
            self.timeout_ms = timeout.trim().parse().map_err(|_| {
                RelayError::config(format!(
                    "API_TIMEOUT_MS must be a number of milliseconds, got '{timeout}'"
                ))
            })?;
        }
        Ok(())
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(RelayError::config(
                "No API key configured. Set OPENAI_API_KEY or api_key in the config file.",
            ));
        }
        if self.base_url.trim().is_empty() {
            return Err(RelayError::config("base_url must not be empty"));
        }
        if self.timeout_ms == 0 {
            return Err(RelayError::config("timeout_ms must be greater than zero"));
        }
        Ok(())
    }

    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The address callers are told to use, as reported by the info probe.
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.bind_addr())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
