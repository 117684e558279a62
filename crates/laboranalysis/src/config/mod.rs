use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::{ScheduleConfig, ScheduleMode};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration shared by the intake server and the stage workers.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
    pub notifier: NotifierConfig,
    pub pipeline: PipelineConfig,
    pub handlers: HandlerConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let store = StoreConfig {
            path: env::var("APP_STORE_PATH").unwrap_or_else(|_| "laboranalysis.db".to_string()),
            database: env::var("APP_STORE_DATABASE").unwrap_or_else(|_| "hh_orders".to_string()),
        };

        let notifier = NotifierConfig {
            operator_email: env::var("APP_OPERATOR_EMAIL")
                .unwrap_or_else(|_| "operator@localhost".to_string()),
            outbox_dir: optional_var("APP_OUTBOX_DIR").map(PathBuf::from),
        };

        let mode = match optional_var("APP_SCHEDULE_MODE") {
            Some(raw) => raw
                .parse::<ScheduleMode>()
                .map_err(|_| ConfigError::InvalidScheduleMode { value: raw })?,
            None => ScheduleMode::Loop,
        };
        let defaults = ScheduleConfig::default();
        let schedule = ScheduleConfig {
            mode,
            settle: seconds_var("APP_SETTLE_SECS", defaults.settle)?,
            idle: seconds_var("APP_IDLE_SECS", defaults.idle)?,
        };
        let max_attempts = match optional_var("APP_MAX_ATTEMPTS") {
            Some(raw) => Some(parse_number::<u32>("APP_MAX_ATTEMPTS", &raw)?).filter(|n| *n > 0),
            None => None,
        };

        let handlers = HandlerConfig {
            reports_dir: PathBuf::from(
                env::var("APP_REPORTS_DIR").unwrap_or_else(|_| "reports".to_string()),
            ),
            harvest_command: optional_var("APP_HARVEST_COMMAND"),
            analyze_command: optional_var("APP_ANALYZE_COMMAND"),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            store,
            notifier,
            pipeline: PipelineConfig {
                schedule,
                max_attempts,
            },
            handlers,
        })
    }
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.trim().is_empty())
}

fn parse_number<T: std::str::FromStr>(var: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidNumber {
        var,
        value: raw.to_string(),
    })
}

fn seconds_var(var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match optional_var(var) {
        Some(raw) => parse_number::<u64>(var, &raw).map(Duration::from_secs),
        None => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Where the stage queues live. `path` of `:memory:` keeps them in process.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: String,
    pub database: String,
}

impl StoreConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub operator_email: String,
    /// Spool directory for outgoing mail; unset means log-only delivery.
    pub outbox_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub schedule: ScheduleConfig,
    /// `None` retries failed orders forever.
    pub max_attempts: Option<u32>,
}

/// Stage handler wiring.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub reports_dir: PathBuf,
    pub harvest_command: Option<String>,
    pub analyze_command: Option<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str, value: String },
    InvalidScheduleMode { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer, got '{value}'")
            }
            ConfigError::InvalidScheduleMode { value } => {
                write!(f, "APP_SCHEDULE_MODE must be 'loop' or 'once', got '{value}'")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::InvalidScheduleMode { .. } => None,
        }
    }
}
