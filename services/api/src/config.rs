//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The
//! `.env` file is used for local development.

use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Base64 of the 32-byte AES-256-GCM key used for token fields at rest.
    /// Operational invariant: this key must be stable across restarts, or
    /// previously stored tokens become permanently undecryptable.
    pub encrypt_key: String,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub chart_api_base_url: String,
    /// First year the canonical chart has data for. Percentages that map to
    /// earlier years are served from the curated fallback table.
    pub chart_coverage_start_year: i32,
    /// Values below this are treated as fractions and rescaled by 100. The
    /// default of 1.0 keeps historical behavior, at the cost of reading a
    /// legitimate 0.5% as 50%; set it to 0 to disable rescaling entirely.
    pub fraction_threshold: f64,
    /// How long an interactive request waits for the local OAuth callback to
    /// deliver an authorization code.
    pub auth_code_wait: Duration,
    /// Ceiling applied to every outbound provider call.
    pub http_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Secrets (all required; the server must not start blind) ---
        let encrypt_key = std::env::var("ENCRYPT_KEY")
            .map_err(|_| ConfigError::MissingVar("ENCRYPT_KEY".to_string()))?;
        let client_id = std::env::var("CLIENT_ID")
            .map_err(|_| ConfigError::MissingVar("CLIENT_ID".to_string()))?;
        let client_secret = std::env::var("CLIENT_SECRET")
            .map_err(|_| ConfigError::MissingVar("CLIENT_SECRET".to_string()))?;

        // --- Load Provider Settings ---
        let redirect_uri = std::env::var("SPOTIFY_REDIRECT_URI")
            .unwrap_or_else(|_| "http://localhost:8000/local_callback".to_string());
        let chart_api_base_url = std::env::var("CHART_API_BASE_URL")
            .map_err(|_| ConfigError::MissingVar("CHART_API_BASE_URL".to_string()))?;

        let chart_coverage_start_year =
            parse_var("CHART_COVERAGE_START_YEAR", 1952, |s| s.parse::<i32>())?;
        let fraction_threshold = parse_var("FRACTION_THRESHOLD", 1.0, |s| s.parse::<f64>())?;
        let auth_code_wait =
            parse_var("AUTH_CODE_WAIT_SECS", 30, |s| s.parse::<u64>()).map(Duration::from_secs)?;
        let http_timeout =
            parse_var("HTTP_TIMEOUT_SECS", 15, |s| s.parse::<u64>()).map(Duration::from_secs)?;

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            encrypt_key,
            client_id,
            client_secret,
            redirect_uri,
            chart_api_base_url,
            chart_coverage_start_year,
            fraction_threshold,
            auth_code_wait,
            http_timeout,
        })
    }

    /// The percentage below which results are served from the fallback table,
    /// i.e. the point corresponding to the chart's coverage start year.
    pub fn fallback_threshold_percent(&self) -> f64 {
        f64::from(self.chart_coverage_start_year - 1900)
    }
}

/// Parses an optional environment variable, defaulting when unset and
/// reporting the variable's name when its value does not parse.
fn parse_var<T, E>(
    name: &str,
    default: T,
    parse: impl Fn(&str) -> Result<T, E>,
) -> Result<T, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => {
            parse(&raw).map_err(|_| ConfigError::InvalidValue(name.to_string(), raw.clone()))
        }
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_threshold_tracks_coverage_start_year() {
        let config = Config {
            bind_address: "127.0.0.1:8000".parse().unwrap(),
            database_url: String::new(),
            log_level: Level::INFO,
            encrypt_key: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            chart_api_base_url: String::new(),
            chart_coverage_start_year: 1952,
            fraction_threshold: 1.0,
            auth_code_wait: Duration::from_secs(30),
            http_timeout: Duration::from_secs(15),
        };
        assert_eq!(config.fallback_threshold_percent(), 52.0);
    }
}
