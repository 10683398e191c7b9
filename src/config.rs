//! ==============================================================================
//! config.rs - runtime configuration loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `windsensor.toml`, overlays the environment
//!     variables on top of it and validates the result.
//!
//! precedence (last wins):
//!     1. built-in defaults (port 80, 10s poll interval, 120s idle timeout)
//!     2. config/windsensor.toml or ../config/windsensor.toml, if present
//!     3. SENSOR_URL, SENSOR_ID, API_KEY, WEBSERVER_PORT, ALLOWED_ORIGIN,
//!        LOG_LEVEL
//!
//! anything missing or malformed is a ConfigError and the server refuses to
//! start.
//!
//! ==============================================================================

use crate::domain::{InvalidSensorId, SensorId};
use crate::poller::{PollingSettings, POLLING_INTERVAL, STOP_POLLING_TIMEOUT};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

pub const DEFAULT_PORT: u16 = 80;

/// upper bound for the poll interval and the idle timeout (one day)
pub const MAX_POLLING_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no sensor URL configured! Please provide it via the environment variable called SENSOR_URL.")]
    MissingSensorUrl,

    #[error("no sensor ID configured! Please provide it via the environment variable called SENSOR_ID.")]
    MissingSensorId,

    #[error(transparent)]
    InvalidSensorId(#[from] InvalidSensorId),

    #[error("no api key configured! Please provide it via the environment variable called API_KEY.")]
    MissingApiKey,

    #[error("invalid port {0:?} in WEBSERVER_PORT")]
    InvalidPort(String),

    #[error("{name} of {seconds}s is out of range, expected 1..={max}s")]
    PollingOutOfRange {
        name: &'static str,
        seconds: u64,
        max: u64,
    },
}

// ==============================================================================
// file schema
// ==============================================================================
// every field is optional so the environment alone is enough to run.

#[derive(Debug, Deserialize, Clone, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub sensor: SensorSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub polling: PollingSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SensorSection {
    pub url: Option<String>,
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ServerSection {
    pub port: Option<u16>,
    pub api_key: Option<String>,
    pub allowed_origin: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PollingSection {
    pub interval_seconds: Option<u64>,
    pub idle_timeout_seconds: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingSection {
    pub level: Option<String>,
}

impl FileConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// first config file found, or an empty one
    pub fn load_or_default() -> Result<(Self, Option<PathBuf>), ConfigError> {
        let paths = [
            PathBuf::from("config").join("windsensor.toml"),
            PathBuf::from("..").join("config").join("windsensor.toml"),
        ];

        for path in paths {
            if path.exists() {
                let config = Self::load(&path)?;
                return Ok((config, Some(path)));
            }
        }

        Ok((Self::default(), None))
    }

    /// overlay environment values; `lookup` is `std::env::var` outside tests
    pub fn apply_env<L>(&mut self, lookup: L) -> Result<(), ConfigError>
    where
        L: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SENSOR_URL") {
            self.sensor.url = Some(url);
        }
        if let Some(id) = lookup("SENSOR_ID") {
            self.sensor.id = Some(id);
        }
        if let Some(key) = lookup("API_KEY") {
            self.server.api_key = Some(key);
        }
        if let Some(origin) = lookup("ALLOWED_ORIGIN") {
            self.server.allowed_origin = Some(origin);
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        if let Some(port) = lookup("WEBSERVER_PORT") {
            let parsed = port.trim().parse().map_err(|_| ConfigError::InvalidPort(port.clone()))?;
            self.server.port = Some(parsed);
        }
        Ok(())
    }
}

// ==============================================================================
// log level
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Off,
}

impl LogLevel {
    /// case-insensitive; `None` for names we don't know
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARNING" | "WARN" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            "OFF" => Some(Self::Off),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Off => "OFF",
        }
    }

    pub fn as_filter(self) -> LevelFilter {
        match self {
            Self::Debug => LevelFilter::DEBUG,
            Self::Info => LevelFilter::INFO,
            Self::Warning => LevelFilter::WARN,
            Self::Error => LevelFilter::ERROR,
            Self::Off => LevelFilter::OFF,
        }
    }
}

// ==============================================================================
// validated configuration
// ==============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub sensor_url: String,
    pub sensor_id: SensorId,
    pub api_key: String,
    pub port: u16,
    /// hostname suffix allowed for CORS
    pub allowed_origin: Option<String>,
    pub log_level: LogLevel,
    pub polling: PollingSettings,
    /// file the settings came from, if any
    pub source: Option<PathBuf>,
}

impl ServerConfig {
    /// config file + process environment
    pub fn load() -> Result<Self, ConfigError> {
        let (mut file, source) = FileConfig::load_or_default()?;
        file.apply_env(|key| std::env::var(key).ok())?;
        Self::from_file_config(file, source)
    }

    pub fn from_file_config(file: FileConfig, source: Option<PathBuf>) -> Result<Self, ConfigError> {
        let sensor_url = non_empty(file.sensor.url).ok_or(ConfigError::MissingSensorUrl)?;
        let sensor_id: SensorId = file.sensor.id.ok_or(ConfigError::MissingSensorId)?.parse()?;
        let api_key = non_empty(file.server.api_key).ok_or(ConfigError::MissingApiKey)?;

        let interval = polling_duration(
            "interval_seconds",
            file.polling.interval_seconds,
            POLLING_INTERVAL,
        )?;
        let idle_timeout = polling_duration(
            "idle_timeout_seconds",
            file.polling.idle_timeout_seconds,
            STOP_POLLING_TIMEOUT,
        )?;

        let log_level = file
            .logging
            .level
            .as_deref()
            .and_then(LogLevel::parse)
            .unwrap_or_default();

        Ok(Self {
            sensor_url,
            sensor_id,
            api_key,
            port: file.server.port.unwrap_or(DEFAULT_PORT),
            allowed_origin: non_empty(file.server.allowed_origin),
            log_level,
            polling: PollingSettings { interval, idle_timeout },
            source,
        })
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        match &self.source {
            Some(path) => info!("config file    = {}", path.display()),
            None => info!("config file    = <none, environment only>"),
        }
        info!("log level      = {}", self.log_level.description());
        info!("sensor URL     = {}", self.sensor_url);
        info!("sensor ID      = {}", self.sensor_id);
        info!("API key        = {}", mask(&self.api_key));
        if let Some(origin) = &self.allowed_origin {
            info!("allowed origin = {}", origin);
        }
        info!(
            "polling        = every {}s, idle after {}s",
            self.polling.interval.as_secs(),
            self.polling.idle_timeout.as_secs()
        );
    }
}

/// zero panics tokio's interval, huge values overflow `Instant`
fn polling_duration(
    name: &'static str,
    seconds: Option<u64>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match seconds {
        None => Ok(default),
        Some(seconds) if (1..=MAX_POLLING_SECONDS).contains(&seconds) => {
            Ok(Duration::from_secs(seconds))
        }
        Some(seconds) => Err(ConfigError::PollingOutOfRange {
            name,
            seconds,
            max: MAX_POLLING_SECONDS,
        }),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn mask(secret: &str) -> String {
    match secret.chars().next() {
        Some(first) if secret.chars().count() > 4 => format!("{}***", first),
        _ => "***".to_string(),
    }
}
