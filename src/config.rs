//! Store and backend configuration, with environment-based loading.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::reporting::{ReportSink, default_sink};

/// Default table holding client registrations
pub const DEFAULT_CLIENT_TABLE: &str = "ClientStore";

/// Default table holding issued tokens
pub const DEFAULT_TOKEN_TABLE: &str = "TokenStore";

/// Default delay between two reclamation sweeps
pub const DEFAULT_RECLAIM_INTERVAL: Duration = Duration::from_secs(5);

/// Validated SQL table name
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableName(String);

/// Delay between two reclamation sweeps
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReclaimInterval(Duration);

/// Configuration shared by the client registry and the credential store
#[derive(Clone)]
pub struct StoreConfig {
    pub table_name: TableName,
    /// Delay between sweeps of the credential store. `ClientRegistry` ignores
    /// it because client records never expire.
    pub reclaim_interval: ReclaimInterval,
    pub reporter: Arc<dyn ReportSink>,
}

impl StoreConfig {
    fn with_default_table(table: &str) -> Self {
        Self {
            table_name: TableName(table.to_string()),
            reclaim_interval: ReclaimInterval(DEFAULT_RECLAIM_INTERVAL),
            reporter: default_sink(),
        }
    }

    /// Defaults for a client registry
    pub fn clients() -> Self {
        Self::with_default_table(DEFAULT_CLIENT_TABLE)
    }

    /// Defaults for a credential store
    pub fn tokens() -> Self {
        Self::with_default_table(DEFAULT_TOKEN_TABLE)
    }

    pub fn with_table_name(mut self, table_name: &str) -> Result<Self, ConfigError> {
        self.table_name = table_name.to_string().try_into()?;
        Ok(self)
    }

    pub fn with_reclaim_interval(mut self, interval: Duration) -> Result<Self, ConfigError> {
        self.reclaim_interval = interval.try_into()?;
        Ok(self)
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ReportSink>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Override `defaults` with `<PREFIX>_TABLE_NAME` and `<PREFIX>_RECLAIM_INTERVAL`
    pub fn from_env(prefix: &str, defaults: StoreConfig) -> Result<Self, ConfigError> {
        let mut config = defaults;
        if let Some(table_name) = optional_env(&format!("{prefix}_TABLE_NAME")) {
            config.table_name = table_name.try_into()?;
        }
        if let Some(interval) = optional_env(&format!("{prefix}_RECLAIM_INTERVAL")) {
            config.reclaim_interval = interval.try_into()?;
        }
        Ok(config)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("table_name", &self.table_name)
            .field("reclaim_interval", &self.reclaim_interval)
            .finish_non_exhaustive()
    }
}

/// Backend selection for the admin tool
#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub storage_backend: String,
    pub database_url: Option<String>,
}

impl BackendConfig {
    /// Create a new backend configuration from environment variables
    pub fn new() -> Result<Self, ConfigError> {
        let storage_backend = default_env("STORAGE_BACKEND", "sqlite");
        let database_url = match storage_backend.as_str() {
            "postgres" => Some(require_env("DATABASE_URL")?),
            _ => optional_env("DATABASE_URL"),
        };
        Ok(Self {
            storage_backend,
            database_url,
        })
    }
}

pub(crate) fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn default_env(name: &str, default_value: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default_value.to_string())
}

/// Require an environment variable to be set
pub fn require_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::EnvVarRequired(name.to_string()))
}

fn is_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TryFrom<String> for TableName {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if is_identifier(&value) {
            Ok(Self(value))
        } else {
            Err(ConfigError::InvalidTableName(value))
        }
    }
}

impl AsRef<str> for TableName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<Duration> for ReclaimInterval {
    type Error = ConfigError;

    fn try_from(value: Duration) -> Result<Self, Self::Error> {
        if value.is_zero() {
            Err(ConfigError::ZeroInterval)
        } else {
            Ok(Self(value))
        }
    }
}

impl TryFrom<String> for ReclaimInterval {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Ok(Self(DEFAULT_RECLAIM_INTERVAL));
        }
        let duration = duration_str::parse(&value)
            .map_err(|e| ConfigError::DurationParsingFailed(value, e.to_string()))?;
        duration.try_into()
    }
}

impl AsRef<Duration> for ReclaimInterval {
    fn as_ref(&self) -> &Duration {
        &self.0
    }
}
