//! Configuration management

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::mpd::ConnectionSettings;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub password: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6600
}

/// Timeouts in milliseconds
#[derive(Debug, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_connect_ms")]
    pub connect_ms: u64,
    #[serde(default = "default_response_ms")]
    pub response_ms: u64,
    #[serde(default = "default_idle_delay_ms")]
    pub idle_delay_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_ms: default_connect_ms(),
            response_ms: default_response_ms(),
            idle_delay_ms: default_idle_delay_ms(),
        }
    }
}

fn default_connect_ms() -> u64 {
    5000
}

fn default_response_ms() -> u64 {
    5000
}

fn default_idle_delay_ms() -> u64 {
    500
}

impl From<&Config> for ConnectionSettings {
    fn from(config: &Config) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            password: config.server.password.clone().filter(|p| !p.is_empty()),
            connect_timeout: Duration::from_millis(config.timeouts.connect_ms),
            response_timeout: Duration::from_millis(config.timeouts.response_ms),
            idle_delay: Duration::from_millis(config.timeouts.idle_delay_ms),
        }
    }
}

/// Get config directory (XDG_CONFIG_HOME or platform default)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MPD_LINK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mpd-link");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config/mpd-link");
    }

    // Fallback to current directory
    PathBuf::from(".")
}

/// Split the `MPD_HOST` convention `password@host`
pub fn split_mpd_host(value: &str) -> (Option<&str>, &str) {
    match value.rsplit_once('@') {
        Some((password, host)) if !host.is_empty() => (Some(password), host),
        _ => (None, value),
    }
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        // Start with defaults
        .set_default("server.host", default_host())?
        .set_default("server.port", default_port() as i64)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (MPD_LINK_SERVER__HOST, MPD_LINK_TIMEOUTS__RESPONSE_MS, etc.)
        .add_source(
            ::config::Environment::with_prefix("MPD_LINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    // The variables every MPD client honours win over everything else
    if let Ok(value) = std::env::var("MPD_HOST") {
        let (password, host) = split_mpd_host(&value);
        builder = builder.set_override("server.host", host)?;
        if let Some(password) = password {
            builder = builder.set_override("server.password", password)?;
        }
    }
    if let Ok(port) = std::env::var("MPD_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("server.port", port_num as i64)?;
        }
    }

    let config = builder.build().context("Failed to read configuration")?;

    config
        .try_deserialize()
        .context("Invalid configuration")
}
