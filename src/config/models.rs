// src/config/models.rs
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub checks: ChecksConfig,
    #[serde(default)]
    pub checkers: Vec<HttpCheckerConfig>,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.service.name.trim().is_empty() {
            bail!("service.name must not be empty");
        }

        if !self.server.path.starts_with('/') {
            bail!("server.path must start with '/': {}", self.server.path);
        }

        let mut seen = HashSet::new();
        for checker in &self.checkers {
            if checker.name.trim().is_empty() {
                bail!("checker names must not be empty");
            }
            if !seen.insert(checker.name.as_str()) {
                bail!("duplicate checker name: {}", checker.name);
            }
            if !matches!(checker.url.scheme(), "http" | "https") {
                bail!("checker {} must use an http(s) url", checker.name);
            }
        }

        if self.metrics.enabled {
            if !self.metrics.path.starts_with('/') {
                bail!("metrics.path must start with '/': {}", self.metrics.path);
            }
            if self.metrics.listen == self.server.listen {
                bail!("metrics.listen must differ from server.listen");
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_status_path")]
    pub path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            path: default_status_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChecksConfig {
    /// Round-wide budget in milliseconds; 0 selects the 1 second default.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl ChecksConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpCheckerConfig {
    pub name: String,
    pub url: Url,
    #[serde(default = "default_request_timeout_ms")]
    pub timeout_ms: u64,
}

impl HttpCheckerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
            path: default_metrics_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// How long the endpoint keeps answering 503 before the server stops.
    #[serde(default = "default_drain_ms")]
    pub drain_ms: u64,
}

impl ShutdownConfig {
    pub fn drain(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            drain_ms: default_drain_ms(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_status_path() -> String {
    "/health".to_string()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_drain_ms() -> u64 {
    5000
}
