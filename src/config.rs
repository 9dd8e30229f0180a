use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::transport::TransportKind;

pub const CONFIG_FILE_ENV: &str = "MCP_CONFIG_FILE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Transport named by the configuration file. The `MCP_TRANSPORT`
    /// variable is a separate, higher-priority selection input.
    pub transport: Option<TransportKind>,
    pub http_host: String,
    pub http_port: u16,
    pub api_token: Option<String>,
    pub max_clients: usize,
    pub resource_cache_ttl: Duration,
    pub resource_cache_max_entries: usize,
    pub cache_sweep_interval: Duration,
    pub keep_alive_interval: Duration,
    pub read_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{0} must be a valid u16")]
    InvalidPort(&'static str),
    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),
    #[error("unknown transport type {0:?}, expected stdio or http")]
    UnknownTransport(String),
    #[error("http host must not be empty")]
    EmptyHost,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    transport: Option<String>,
    http_host: Option<String>,
    http_port: Option<u16>,
    api_token: Option<String>,
    max_clients: Option<usize>,
    resource_cache_ttl_secs: Option<u64>,
    resource_cache_max_entries: Option<usize>,
    cache_sweep_interval_secs: Option<u64>,
    keep_alive_secs: Option<u64>,
    read_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: None,
            http_host: "127.0.0.1".to_string(),
            http_port: 8080,
            api_token: None,
            max_clients: 100,
            resource_cache_ttl: Duration::from_secs(300),
            resource_cache_max_entries: 1_000,
            cache_sweep_interval: Duration::from_secs(60),
            keep_alive_interval: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Loads defaults, then the optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_FILE_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(&path)
                    .map_err(|source| ConfigError::Read { path, source })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw)?;
        let mut config = Self::default();

        if let Some(transport) = file.transport {
            config.transport = Some(parse_transport(&transport)?);
        }
        if let Some(host) = file.http_host {
            config.http_host = host;
        }
        if let Some(port) = file.http_port {
            config.http_port = port;
        }
        config.api_token = file
            .api_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty());
        if let Some(max_clients) = file.max_clients {
            config.max_clients = positive(max_clients, "max_clients")?;
        }
        if let Some(secs) = file.resource_cache_ttl_secs {
            config.resource_cache_ttl =
                Duration::from_secs(positive(secs, "resource_cache_ttl_secs")?);
        }
        if let Some(entries) = file.resource_cache_max_entries {
            config.resource_cache_max_entries = positive(entries, "resource_cache_max_entries")?;
        }
        if let Some(secs) = file.cache_sweep_interval_secs {
            config.cache_sweep_interval =
                Duration::from_secs(positive(secs, "cache_sweep_interval_secs")?);
        }
        if let Some(secs) = file.keep_alive_secs {
            config.keep_alive_interval = Duration::from_secs(positive(secs, "keep_alive_secs")?);
        }
        if let Some(secs) = file.read_timeout_secs {
            config.read_timeout = Duration::from_secs(positive(secs, "read_timeout_secs")?);
        }

        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(host) = get("MCP_HTTP_HOST") {
            self.http_host = host;
        }
        if let Some(port) = get("MCP_HTTP_PORT") {
            self.http_port = port
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort("MCP_HTTP_PORT"))?;
        }
        if let Some(token) = get("MCP_API_TOKEN") {
            self.api_token = Some(token);
        }
        if let Some(value) = get("MCP_MAX_CLIENTS") {
            self.max_clients = parse_positive(&value, "MCP_MAX_CLIENTS")?;
        }
        if let Some(value) = get("MCP_RESOURCE_CACHE_TTL_SECS") {
            self.resource_cache_ttl =
                Duration::from_secs(parse_positive(&value, "MCP_RESOURCE_CACHE_TTL_SECS")?);
        }
        if let Some(value) = get("MCP_RESOURCE_CACHE_MAX_ENTRIES") {
            self.resource_cache_max_entries =
                parse_positive(&value, "MCP_RESOURCE_CACHE_MAX_ENTRIES")?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http_host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}

fn parse_transport(value: &str) -> Result<TransportKind, ConfigError> {
    value
        .parse::<TransportKind>()
        .map_err(|_| ConfigError::UnknownTransport(value.to_string()))
}

fn positive<T>(value: T, key: &'static str) -> Result<T, ConfigError>
where
    T: PartialOrd + Default,
{
    if value > T::default() {
        Ok(value)
    } else {
        Err(ConfigError::InvalidNumber(key))
    }
}

fn parse_positive<T>(value: &str, key: &'static str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed = value
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidNumber(key))?;
    positive(parsed, key)
}
