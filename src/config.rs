use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::ClientConfig;
use crate::bridge::BridgeConfig;
use crate::format::DEFAULT_NETWORK;
use crate::sign::DEFAULT_BASE_URL;
use crate::stream::DEFAULT_NOOP_LINK;
use crate::tracker::DEFAULT_MAX_COMMENTS;

const DEFAULT_ENV_PREFIX: &str = "FEEDBRIDGE";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default)]
    pub stream_limit: Option<u32>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
            stream_limit: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("feedbridge/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(20)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BridgeSettings {
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_max_comments")]
    pub max_comments: usize,
    #[serde(default = "default_noop_link")]
    pub noop_link: String,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            network: default_network(),
            max_comments: default_max_comments(),
            noop_link: default_noop_link(),
        }
    }
}

fn default_network() -> String {
    DEFAULT_NETWORK.to_string()
}

fn default_max_comments() -> usize {
    DEFAULT_MAX_COMMENTS
}

fn default_noop_link() -> String {
    DEFAULT_NOOP_LINK.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PollConfig {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl Config {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            user_agent: self.api.user_agent.clone(),
            base_url: Some(self.api.base_url.clone()),
            timeout: Some(self.api.timeout),
            http_client: None,
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            network: self.bridge.network.clone(),
            max_comments: self.bridge.max_comments,
            noop_link: self.bridge.noop_link.clone(),
            stream_limit: self.api.stream_limit,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(path) = options.config_file.as_ref() {
        if path.exists() {
            let from_file = read_config_file(path)?;
            cfg = merge_config(cfg, from_file);
        }
    } else if let Some(default_path) = default_path() {
        if default_path.exists() {
            let from_file = read_config_file(&default_path)?;
            cfg = merge_config(cfg, from_file);
        }
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    cfg = merge_config(cfg, load_env(prefix));

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file at {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("Failed to parse config file at {}", path.display()))?;
    Ok(config)
}

/// Layers `other` over `base`. Fields left at their defaults in `other` do
/// not override what `base` already holds.
fn merge_config(mut base: Config, other: Config) -> Config {
    let defaults = Config::default();

    if other.api.base_url != defaults.api.base_url && !other.api.base_url.is_empty() {
        base.api.base_url = other.api.base_url;
    }
    if other.api.user_agent != defaults.api.user_agent && !other.api.user_agent.is_empty() {
        base.api.user_agent = other.api.user_agent;
    }
    if other.api.timeout != defaults.api.timeout {
        base.api.timeout = other.api.timeout;
    }
    if other.api.stream_limit.is_some() {
        base.api.stream_limit = other.api.stream_limit;
    }

    if other.bridge.network != defaults.bridge.network && !other.bridge.network.is_empty() {
        base.bridge.network = other.bridge.network;
    }
    if other.bridge.max_comments != defaults.bridge.max_comments {
        base.bridge.max_comments = other.bridge.max_comments;
    }
    if other.bridge.noop_link != defaults.bridge.noop_link {
        base.bridge.noop_link = other.bridge.noop_link;
    }

    if other.poll.interval != defaults.poll.interval && !other.poll.interval.is_zero() {
        base.poll.interval = other.poll.interval;
    }

    if other.storage.path.is_some() {
        base.storage.path = other.storage.path;
    }

    if other.log.level != defaults.log.level && !other.log.level.is_empty() {
        base.log.level = other.log.level;
    }

    base
}

fn load_env(prefix: &str) -> Config {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let map: HashMap<String, String> = env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect();

    let mut cfg = Config::default();
    for (key, value) in map {
        apply_env_value(&mut cfg, &key, value);
    }
    cfg
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "api.base_url" => cfg.api.base_url = value,
        "api.user_agent" => cfg.api.user_agent = value,
        "api.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.api.timeout = duration;
            }
        }
        "api.stream_limit" => {
            if let Ok(parsed) = value.parse::<u32>() {
                cfg.api.stream_limit = Some(parsed);
            }
        }
        "bridge.network" => cfg.bridge.network = value,
        "bridge.max_comments" => {
            if let Ok(parsed) = value.parse::<usize>() {
                cfg.bridge.max_comments = parsed;
            }
        }
        "bridge.noop_link" => cfg.bridge.noop_link = value,
        "poll.interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.poll.interval = duration;
            }
        }
        "storage.path" => cfg.storage.path = Some(PathBuf::from(value)),
        "log.level" => cfg.log.level = value,
        _ => {}
    }
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("feedbridge").join("config.yaml"))
}
