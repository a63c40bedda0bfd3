//! Configuration management for Drover-Oxide

use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// How long `Tab::get` blocks relative to the page-lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Wait for the `complete` state
    #[default]
    Normal,
    /// Ready at `interactive`; loading is stopped once reached
    Eager,
    /// Return as soon as the navigation command returns
    None,
}

/// Timeouts resolved at call time by tab-scoped waits.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Timeouts {
    /// Default timeout for element lookups and waits (seconds)
    pub base: f64,
    /// Timeout for one page-load attempt (seconds)
    pub page_load: f64,
    /// Timeout for JavaScript execution (seconds)
    pub script: f64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            base: 10.0,
            page_load: 30.0,
            script: 30.0,
        }
    }
}

impl Timeouts {
    /// Base timeout as a [`Duration`]
    pub fn base_duration(&self) -> Duration {
        Duration::from_secs_f64(self.base)
    }

    /// Page-load timeout as a [`Duration`]
    pub fn page_load_duration(&self) -> Duration {
        Duration::from_secs_f64(self.page_load)
    }

    /// Script timeout as a [`Duration`]
    pub fn script_duration(&self) -> Duration {
        Duration::from_secs_f64(self.script)
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Debugger address of the browser ("host:port")
    pub address: String,

    /// Connect timeout for the HTTP probe of the debugger address (seconds)
    pub connect_timeout: f64,

    /// Navigation retry count for `Tab::get`
    pub retry_times: u32,

    /// Seconds between navigation retries
    pub retry_interval: f64,

    /// Tab-scoped timeouts
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Page readiness mode
    #[serde(default)]
    pub load_mode: LoadMode,

    /// Directory downloads are routed to
    pub download_path: Option<PathBuf>,

    /// Auto-created user-data directory, removed by `Browser::quit`
    /// when asked to delete browsing data
    pub user_data_dir: Option<PathBuf>,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:9222".to_string(),
            connect_timeout: 30.0,
            retry_times: 0,
            retry_interval: 2.0,
            timeouts: Timeouts::default(),
            load_mode: LoadMode::Normal,
            download_path: None,
            user_data_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(address) = env::var("DROVER_ADDRESS") {
            config.address = address;
        }

        if let Ok(timeout) = env::var("DROVER_CONNECT_TIMEOUT") {
            config.connect_timeout = timeout
                .parse()
                .map_err(|_| Error::configuration("Invalid DROVER_CONNECT_TIMEOUT"))?;
        }

        if let Ok(retry) = env::var("DROVER_RETRY_TIMES") {
            config.retry_times = retry
                .parse()
                .map_err(|_| Error::configuration("Invalid DROVER_RETRY_TIMES"))?;
        }

        if let Ok(interval) = env::var("DROVER_RETRY_INTERVAL") {
            config.retry_interval = interval
                .parse()
                .map_err(|_| Error::configuration("Invalid DROVER_RETRY_INTERVAL"))?;
        }

        if let Ok(page_load) = env::var("DROVER_PAGE_LOAD_TIMEOUT") {
            config.timeouts.page_load = page_load
                .parse()
                .map_err(|_| Error::configuration("Invalid DROVER_PAGE_LOAD_TIMEOUT"))?;
        }

        if let Ok(mode) = env::var("DROVER_LOAD_MODE") {
            config.load_mode = match mode.as_str() {
                "normal" => LoadMode::Normal,
                "eager" => LoadMode::Eager,
                "none" => LoadMode::None,
                other => {
                    return Err(Error::configuration(format!("Invalid DROVER_LOAD_MODE: {}", other)))
                }
            };
        }

        if let Ok(path) = env::var("DROVER_DOWNLOAD_PATH") {
            config.download_path = Some(PathBuf::from(path));
        }

        if let Ok(log_level) = env::var("DROVER_LOG_LEVEL") {
            config.log_level = log_level;
        }

        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.address, "127.0.0.1:9222");
        assert_eq!(config.load_mode, LoadMode::Normal);
        assert_eq!(config.timeouts.page_load, 30.0);
    }

    #[test]
    fn test_from_toml() {
        let toml = r#"
            address = "127.0.0.1:9333"
            connect_timeout = 10.0
            retry_times = 2
            retry_interval = 1.5
            load_mode = "eager"
            log_level = "debug"

            [timeouts]
            base = 5.0
            page_load = 20.0
            script = 15.0
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.address, "127.0.0.1:9333");
        assert_eq!(config.load_mode, LoadMode::Eager);
        assert_eq!(config.retry_times, 2);
        assert_eq!(config.timeouts.base, 5.0);
    }
}
