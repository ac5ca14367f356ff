//! Configuration management for the Braid mock server

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

use crate::resource::DEFAULT_EXTENSION;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub resources: ResourceConfig,
    pub proxy: ProxyConfig,
    pub subscriptions: SubscriptionConfig,
    pub watch: WatchConfig,
    pub cors: CorsConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ResourceConfig {
    /// Directory holding the mock resource files
    pub root_dir: PathBuf,
    /// Recognized file extension, without the dot
    pub extension: String,
}

#[derive(Debug, Clone, Default)]
pub struct ProxyConfig {
    /// Upstream for resources with no local file
    pub url: Option<Url>,
    /// Skip upstream certificate verification
    pub insecure: bool,
}

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// Frames queued per subscriber before it is evicted
    pub buffer: usize,
}

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Quiet period a file must reach before its change is read
    pub settle: Duration,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub enabled: bool,
    pub allow_origins: Vec<String>,
}

/// Invalid configuration values
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid proxy URL {value}: {reason}")]
    InvalidProxyUrl { value: String, reason: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            resources: ResourceConfig {
                root_dir: PathBuf::from("."),
                extension: DEFAULT_EXTENSION.to_string(),
            },
            proxy: ProxyConfig::default(),
            subscriptions: SubscriptionConfig { buffer: 64 },
            watch: WatchConfig {
                settle: Duration::from_millis(50),
            },
            cors: CorsConfig {
                enabled: false,
                allow_origins: vec!["*".to_string()],
            },
        }
    }
}

impl Config {
    /// Read configuration from `BRAID_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let proxy_url = var("BRAID_PROXY_URL")
            .map(|value| {
                Url::parse(value.trim())
                    .map_err(|e| ConfigError::InvalidProxyUrl {
                        reason: e.to_string(),
                        value,
                    })
            })
            .transpose()?;

        Ok(Config {
            server: ServerConfig {
                host: var("BRAID_HOST").unwrap_or(defaults.server.host),
                port: parse_or("BRAID_PORT", var("BRAID_PORT"), defaults.server.port)?,
            },
            resources: ResourceConfig {
                root_dir: var("BRAID_ROOT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.resources.root_dir),
                extension: var("BRAID_EXTENSION")
                    .map(|ext| ext.trim_start_matches('.').to_string())
                    .unwrap_or(defaults.resources.extension),
            },
            proxy: ProxyConfig {
                url: proxy_url,
                insecure: parse_bool("BRAID_PROXY_INSECURE", var("BRAID_PROXY_INSECURE"), false)?,
            },
            subscriptions: SubscriptionConfig {
                buffer: parse_or(
                    "BRAID_SUBSCRIBER_BUFFER",
                    var("BRAID_SUBSCRIBER_BUFFER"),
                    defaults.subscriptions.buffer,
                )?
                .max(1),
            },
            watch: WatchConfig {
                settle: var("BRAID_WATCH_SETTLE_MS")
                    .map(|value| parse_or("BRAID_WATCH_SETTLE_MS", Some(value), 0u64))
                    .transpose()?
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.watch.settle),
            },
            cors: CorsConfig {
                enabled: parse_bool("BRAID_CORS", var("BRAID_CORS"), false)?,
                allow_origins: var("BRAID_CORS_ORIGINS")
                    .map(|origins| {
                        origins
                            .split(',')
                            .map(|origin| origin.trim().to_string())
                            .filter(|origin| !origin.is_empty())
                            .collect()
                    })
                    .unwrap_or(defaults.cors.allow_origins),
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &'static str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        None => Ok(default),
    }
}

fn parse_bool(name: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match value.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::InvalidValue {
            name,
            value: value.unwrap_or_default(),
        }),
    }
}
