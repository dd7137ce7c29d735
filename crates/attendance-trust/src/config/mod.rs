use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::NaiveTime;

use crate::workflows::attendance::trust::{
    PolicyMode, PolicyUpdate, PolicyViolation, ReasonRiskLevel, TrustEngineConfig, TrustPolicy,
};

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub trust: TrustEngineConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            trust: load_trust()?,
        })
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

fn load_trust() -> Result<TrustEngineConfig, ConfigError> {
    let fallback = TrustPolicy::default();

    let mode = match env::var("APP_TRUST_MODE") {
        Ok(raw) => raw
            .parse::<PolicyMode>()
            .map_err(|_| invalid("APP_TRUST_MODE", raw))?,
        Err(_) => fallback.mode,
    };
    let require_reason_at_risk = match env::var("APP_TRUST_REASON_AT_RISK") {
        Ok(raw) => raw
            .parse::<ReasonRiskLevel>()
            .map_err(|_| invalid("APP_TRUST_REASON_AT_RISK", raw))?,
        Err(_) => fallback.require_reason_at_risk,
    };

    let update = PolicyUpdate {
        mode,
        warn_threshold: parse_or(
            "APP_TRUST_WARN_THRESHOLD",
            i64::from(fallback.warn_threshold),
        )?,
        hold_threshold: parse_or(
            "APP_TRUST_HOLD_THRESHOLD",
            i64::from(fallback.hold_threshold),
        )?,
        deny_threshold: parse_or(
            "APP_TRUST_DENY_THRESHOLD",
            i64::from(fallback.deny_threshold),
        )?,
        require_reason_at_risk,
        impossible_travel_speed_kph: parse_or(
            "APP_TRUST_TRAVEL_KPH",
            fallback.impossible_travel_speed_kph,
        )?,
        geofence: None,
        enabled: parse_or("APP_TRUST_ENABLED", fallback.enabled)?,
    };
    let default_policy = update
        .into_policy()
        .map_err(ConfigError::InvalidDefaultPolicy)?;

    let late_after = match env::var("APP_LATE_AFTER") {
        Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
            .map_err(|_| invalid("APP_LATE_AFTER", raw))?,
        Err(_) => TrustEngineConfig::default_late_after(),
    };

    Ok(TrustEngineConfig {
        default_policy,
        late_after,
    })
}

fn parse_or<T: std::str::FromStr>(key: &'static str, fallback: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| invalid(key, raw)),
        Err(_) => Ok(fallback),
    }
}

fn invalid(key: &'static str, value: String) -> ConfigError {
    ConfigError::InvalidTrustSetting { key, value }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidTrustSetting { key: &'static str, value: String },
    InvalidDefaultPolicy(PolicyViolation),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidTrustSetting { key, value } => {
                write!(f, "{key} has an unsupported value '{value}'")
            }
            ConfigError::InvalidDefaultPolicy(violation) => {
                write!(f, "default trust policy is invalid: {violation}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidTrustSetting { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidDefaultPolicy(violation) => Some(violation),
        }
    }
}
