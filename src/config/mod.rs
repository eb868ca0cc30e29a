//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::watcher::RetryConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Per-read/per-write timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_ms: default_timeout_ms(),
            password: None,
            retry: RetrySettings::default(),
        }
    }
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `host:port`, or the socket path for local connections.
    pub fn address(&self) -> String {
        if self.host.starts_with('/') {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6600
}

fn default_timeout_ms() -> u64 {
    10_000
}

/// Reconnect backoff for the watcher, in milliseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_stable_run_ms")]
    pub stable_run_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            stable_run_ms: default_stable_run_ms(),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        RetryConfig {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            stable_run_threshold: Duration::from_millis(settings.stable_run_ms),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_stable_run_ms() -> u64 {
    30_000
}

/// Get config directory (MPDLINK_CONFIG_DIR, XDG_CONFIG_HOME or ~/.config)
pub fn get_config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("MPDLINK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("mpdlink");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".config/mpdlink");
    }

    // Fallback to current directory
    PathBuf::from(".")
}

/// Split an `MPD_HOST` value of the form `password@host`.
///
/// A leading `@` names an abstract socket and is not a password separator.
pub fn split_mpd_host(value: &str) -> (Option<&str>, &str) {
    match value.rfind('@') {
        Some(at) if at > 0 => (Some(&value[..at]), &value[at + 1..]),
        _ => (None, value),
    }
}

pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir();

    let mut builder = ::config::Config::builder()
        // Start with defaults
        .set_default("host", default_host())?
        .set_default("port", default_port() as i64)?
        .set_default("timeout_ms", default_timeout_ms() as i64)?
        // Load from config file if it exists
        .add_source(
            ::config::File::with_name(&config_dir.join("config").to_string_lossy()).required(false),
        )
        // Override with environment variables (MPDLINK_HOST, MPDLINK_RETRY__MAX_DELAY_MS, etc.)
        .add_source(
            ::config::Environment::with_prefix("MPDLINK")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

    // The variables every MPD client honours win over the file
    if let Ok(value) = std::env::var("MPD_HOST") {
        let (password, host) = split_mpd_host(&value);
        if !host.is_empty() {
            builder = builder.set_override("host", host)?;
        }
        if let Some(password) = password {
            builder = builder.set_override("password", password)?;
        }
    }
    if let Ok(port) = std::env::var("MPD_PORT") {
        if let Ok(port_num) = port.parse::<u16>() {
            builder = builder.set_override("port", port_num as i64)?;
        }
    }

    let config = builder.build()?;

    Ok(config.try_deserialize()?)
}
