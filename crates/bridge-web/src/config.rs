//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;

use crm_client::{CrmConfig, CrmError};
use sync_engine::EngineConfig;

/// Bridge web server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// Emit JSON log lines instead of text.
    pub json_logs: bool,
    pub crm: CrmConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `BRIDGE_ADDR` | Server bind address | `127.0.0.1:8790` |
    /// | `SQLITE_PATH` | SQLite database URL | `sqlite:bridge.db?mode=rwc` |
    /// | `LOG_FORMAT` | `json` for structured logs | text |
    ///
    /// CRM variables are read by [`CrmConfig::from_env`], engine variables by
    /// [`EngineConfig::from_env`]. The CRM platform credentials double as the
    /// engine's fallback OAuth app.
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("BRIDGE_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8790".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("SQLITE_PATH")
            .unwrap_or_else(|_| "sqlite:bridge.db?mode=rwc".to_string());

        let json_logs = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let crm = CrmConfig::from_env()?;
        let engine = EngineConfig::from_env().with_platform_credentials(crm.platform_credentials.clone());

        Ok(Self {
            addr,
            database_url,
            json_logs,
            crm,
            engine,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid BRIDGE_ADDR format")]
    InvalidAddr,

    #[error("CRM configuration: {0}")]
    Crm(#[from] CrmError),
}
