use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{bail, Context, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sniffing: SniffingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Maximum number of packets kept in memory
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SniffingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Start producing packets as soon as the daemon is up
    #[serde(default = "default_autostart")]
    pub autostart: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_max_size() -> usize {
    1000
}

fn default_interval_ms() -> u64 {
    5000
}

fn default_autostart() -> bool {
    true
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
        }
    }
}

impl Default for SniffingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            autostart: default_autostart(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl SniffingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl ApiConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file. A missing file yields defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::info!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Apply environment overrides on top of file values
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(max_size) = parse_override::<usize>(&lookup, "STORAGE_MAX_SIZE") {
            self.storage.max_size = max_size;
        }
        if let Some(interval_ms) = parse_override::<u64>(&lookup, "SNIFFING_INTERVAL_MS") {
            self.sniffing.interval_ms = interval_ms;
        }
        if let Some(port) = parse_override::<u16>(&lookup, "SERVER_PORT") {
            self.api.listen = with_port(&self.api.listen, port);
        }
        if let Some(timeout) = parse_override::<u64>(&lookup, "SERVER_SHUTDOWN_TIMEOUT_SECS") {
            self.api.shutdown_timeout_secs = timeout;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.max_size == 0 {
            bail!("storage.max_size must be at least 1");
        }
        if self.sniffing.interval_ms == 0 {
            bail!("sniffing.interval_ms must be at least 1");
        }
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
            None
        }
    }
}

/// Replace the port of a `host:port` listen address
fn with_port(listen: &str, port: u16) -> String {
    match listen.rsplit_once(':') {
        Some((host, _)) => format!("{}:{}", host, port),
        None => format!("{}:{}", listen, port),
    }
}
