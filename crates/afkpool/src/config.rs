//! Process configuration: a TOML file plus a few environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use afkpool_session::{ProxyPool, ReconnectConfig, SessionConfig};
use afkpool_transport::{GatewayConfig, ProxyEndpoint};
use serde::{Deserialize, Serialize};

/// Overrides the port part of `bind`.
pub const PORT_ENV: &str = "PORT";
/// Overrides `stats.api_key`.
pub const STATS_API_KEY_ENV: &str = "AFKPOOL_STATS_API_KEY";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level settings. Every field has a default, so an empty file (or
/// no file) is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AfkpoolConfig {
    /// Control surface address (default: 0.0.0.0:8000)
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Root of the per-identity auth folders (default: auth)
    #[serde(default = "default_auth_dir")]
    pub auth_dir: PathBuf,

    /// WebSocket URL of the protocol gateway
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Game server the gateway joins (default: donutsmp.net)
    #[serde(default = "default_server_host")]
    pub server_host: String,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Egress proxies, assigned to sessions in groups
    #[serde(default)]
    pub proxies: Vec<ProxySettings>,

    /// Sessions per proxy before moving to the next (default: 5)
    #[serde(default = "default_proxy_group_size")]
    pub proxy_group_size: usize,

    #[serde(default)]
    pub reconnect: ReconnectSettings,

    #[serde(default)]
    pub stats: StatsSettings,

    /// Refresh every online balance this often; 0 disables it
    #[serde(default)]
    pub balance_refresh_secs: u64,

    /// Connect restored identities at startup
    #[serde(default)]
    pub auto_connect: bool,

    /// Lines kept for the log endpoint (default: 50)
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub url: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectSettings {
    #[serde(default = "default_short_delay_secs")]
    pub short_delay_secs: u64,
    #[serde(default = "default_long_delay_secs")]
    pub long_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSettings {
    #[serde(default = "default_stats_base_url")]
    pub base_url: String,
    /// Sent verbatim as the `Authorization` header
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_stats_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_bind() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_auth_dir() -> PathBuf {
    PathBuf::from("auth")
}

fn default_gateway_url() -> String {
    "ws://127.0.0.1:8765".to_string()
}

fn default_server_host() -> String {
    "donutsmp.net".to_string()
}

fn default_server_port() -> u16 {
    19132
}

fn default_proxy_group_size() -> usize {
    5
}

fn default_short_delay_secs() -> u64 {
    5
}

fn default_long_delay_secs() -> u64 {
    30
}

fn default_stats_base_url() -> String {
    "https://api.donutsmp.net".to_string()
}

fn default_stats_timeout_secs() -> u64 {
    10
}

fn default_log_capacity() -> usize {
    50
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            short_delay_secs: default_short_delay_secs(),
            long_delay_secs: default_long_delay_secs(),
        }
    }
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            base_url: default_stats_base_url(),
            api_key: None,
            timeout_secs: default_stats_timeout_secs(),
        }
    }
}

impl Default for AfkpoolConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            auth_dir: default_auth_dir(),
            gateway_url: default_gateway_url(),
            server_host: default_server_host(),
            server_port: default_server_port(),
            proxies: Vec::new(),
            proxy_group_size: default_proxy_group_size(),
            reconnect: ReconnectSettings::default(),
            stats: StatsSettings::default(),
            balance_refresh_secs: 0,
            auto_connect: false,
            log_capacity: default_log_capacity(),
        }
    }
}

impl AfkpoolConfig {
    /// Reads `path` if given, otherwise starts from defaults, then applies
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Applies `PORT` and `AFKPOOL_STATS_API_KEY` through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup(PORT_ENV) {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{PORT_ENV}={port:?} is not a port")))?;
            let host = self
                .bind
                .rsplit_once(':')
                .map_or(self.bind.as_str(), |(host, _)| host);
            self.bind = format!("{host}:{port}");
        }
        if let Some(key) = lookup(STATS_API_KEY_ENV).filter(|k| !k.is_empty()) {
            self.stats.api_key = Some(key);
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect: ReconnectConfig {
                short_delay: Duration::from_secs(self.reconnect.short_delay_secs),
                long_delay: Duration::from_secs(self.reconnect.long_delay_secs),
            },
            ..SessionConfig::default()
        }
    }

    pub fn proxy_pool(&self) -> ProxyPool {
        let endpoints = self
            .proxies
            .iter()
            .map(|p| ProxyEndpoint::new(p.url.clone(), p.label.clone()))
            .collect();
        ProxyPool::new(endpoints, self.proxy_group_size)
    }

    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            url: self.gateway_url.clone(),
            server_host: self.server_host.clone(),
            server_port: self.server_port,
        }
    }

    /// Interval of the periodic balance refresh, if enabled.
    pub fn balance_refresh(&self) -> Option<Duration> {
        (self.balance_refresh_secs > 0).then(|| Duration::from_secs(self.balance_refresh_secs))
    }
}
