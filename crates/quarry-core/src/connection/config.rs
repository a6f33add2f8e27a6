//! Connection configuration.
//!
//! Configurations deserialize from any serde format; the migration CLI
//! reads them from TOML:
//!
//! ```toml
//! default = "main"
//!
//! [connections.main]
//! driver = "postgres"
//! database = "app"
//! host = "db.internal"
//! user = "app"
//! prefix = "app_"
//!
//! [[connections.main.read]]
//! host = "replica-1.internal"
//!
//! [[connections.main.read]]
//! host = "replica-2.internal"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::seq::SliceRandom;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::grammar::ParameterStyle;

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// SQLite.
    Sqlite,
    /// MySQL and MariaDB.
    MySql,
    /// PostgreSQL.
    Postgres,
}

impl DriverKind {
    /// Returns the canonical driver name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" => Ok(Self::MySql),
            "postgres" | "pgsql" | "postgresql" => Ok(Self::Postgres),
            other => Err(Error::UnsupportedDriver(other.to_string())),
        }
    }
}

/// Host-level overrides for one side of a read/write split.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EndpointConfig {
    /// Host name.
    pub host: Option<String>,
    /// Port.
    pub port: Option<u16>,
    /// Database name or SQLite path.
    pub database: Option<String>,
    /// User name.
    pub user: Option<String>,
    /// Password.
    pub password: Option<String>,
}

/// One read endpoint, or several to pick from at random.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ReadConfig {
    /// A single replica.
    One(EndpointConfig),
    /// Several replicas.
    Many(Vec<EndpointConfig>),
}

fn default_foreign_keys() -> bool {
    true
}

/// Settings of one named connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectionConfig {
    /// Driver name: `sqlite`, `mysql` or `postgres`.
    pub driver: String,
    /// Connection name, filled in by the manager when absent.
    #[serde(default)]
    pub name: Option<String>,
    /// Database name, or file path for SQLite (`:memory:` for in-memory).
    #[serde(default)]
    pub database: String,
    /// Host name.
    #[serde(default)]
    pub host: Option<String>,
    /// Port.
    #[serde(default)]
    pub port: Option<u16>,
    /// User name.
    #[serde(default)]
    pub user: Option<String>,
    /// Password.
    #[serde(default)]
    pub password: Option<String>,
    /// Prefix prepended to every table name.
    #[serde(default)]
    pub prefix: String,
    /// Start with the query log enabled.
    #[serde(default)]
    pub log_queries: bool,
    /// Use `?` markers (MySQL defaults to `true`, PostgreSQL to `false`).
    #[serde(default)]
    pub use_qmark: Option<bool>,
    /// Connection character set (MySQL).
    #[serde(default)]
    pub charset: Option<String>,
    /// Connection collation (MySQL).
    #[serde(default)]
    pub collation: Option<String>,
    /// Default storage engine (MySQL).
    #[serde(default)]
    pub engine: Option<String>,
    /// Enforce foreign keys (SQLite).
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
    /// Search schema (PostgreSQL).
    #[serde(default)]
    pub schema: Option<String>,
    /// Server version, gating dialect features (MySQL).
    #[serde(default)]
    pub server_version: Option<String>,
    /// Substrings identifying a lost connection in driver errors.
    #[serde(default)]
    pub lost_connection_messages: Option<Vec<String>>,
    /// Read replica(s).
    #[serde(default)]
    pub read: Option<ReadConfig>,
    /// Write endpoint overrides.
    #[serde(default)]
    pub write: Option<EndpointConfig>,
}

impl ConnectionConfig {
    /// Creates a configuration for `driver` and `database`.
    #[must_use]
    pub fn new(driver: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            name: None,
            database: database.into(),
            host: None,
            port: None,
            user: None,
            password: None,
            prefix: String::new(),
            log_queries: false,
            use_qmark: None,
            charset: None,
            collation: None,
            engine: None,
            foreign_keys: true,
            schema: None,
            server_version: None,
            lost_connection_messages: None,
            read: None,
            write: None,
        }
    }

    /// SQLite configuration for a file path or `:memory:`.
    #[must_use]
    pub fn sqlite(database: impl Into<String>) -> Self {
        Self::new("sqlite", database)
    }

    /// MySQL configuration for `database`.
    #[must_use]
    pub fn mysql(database: impl Into<String>) -> Self {
        Self::new("mysql", database)
    }

    /// PostgreSQL configuration for `database`.
    #[must_use]
    pub fn postgres(database: impl Into<String>) -> Self {
        Self::new("postgres", database)
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Parses the driver name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDriver`] for unknown drivers.
    pub fn driver_kind(&self) -> Result<DriverKind> {
        self.driver.parse()
    }

    /// Marker style of the grammars, before any driver override.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDriver`] for unknown drivers.
    pub fn parameter_style(&self) -> Result<ParameterStyle> {
        let qmark = match self.driver_kind()? {
            DriverKind::Sqlite => true,
            DriverKind::MySql => self.use_qmark.unwrap_or(true),
            DriverKind::Postgres => self.use_qmark.unwrap_or(false),
        };
        Ok(if qmark {
            ParameterStyle::Qmark
        } else {
            ParameterStyle::Format
        })
    }

    /// Returns `true` when a separate read endpoint is configured.
    #[must_use]
    pub const fn has_read_endpoint(&self) -> bool {
        self.read.is_some()
    }

    /// Configuration of the write side: the base settings with the
    /// `write` overrides applied.
    #[must_use]
    pub fn write_config(&self) -> Self {
        self.merged(self.write.as_ref())
    }

    /// Configuration of the read side, when one is configured. A list of
    /// replicas yields one at random.
    #[must_use]
    pub fn read_config(&self) -> Option<Self> {
        let endpoint = match self.read.as_ref()? {
            ReadConfig::One(endpoint) => Some(endpoint),
            ReadConfig::Many(endpoints) => endpoints.choose(&mut rand::thread_rng()),
        };
        Some(self.merged(endpoint))
    }

    fn merged(&self, endpoint: Option<&EndpointConfig>) -> Self {
        let mut merged = self.clone();
        merged.read = None;
        merged.write = None;
        if let Some(endpoint) = endpoint {
            if endpoint.host.is_some() {
                merged.host.clone_from(&endpoint.host);
            }
            if endpoint.port.is_some() {
                merged.port = endpoint.port;
            }
            if let Some(database) = &endpoint.database {
                merged.database.clone_from(database);
            }
            if endpoint.user.is_some() {
                merged.user.clone_from(&endpoint.user);
            }
            if endpoint.password.is_some() {
                merged.password.clone_from(&endpoint.password);
            }
        }
        merged
    }
}

/// Every named connection of an application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DatabaseConfig {
    /// Name of the default connection.
    pub default: String,
    /// Connections by name.
    pub connections: HashMap<String, ConnectionConfig>,
}

impl DatabaseConfig {
    /// Creates a configuration with a single default connection.
    #[must_use]
    pub fn single(name: impl Into<String>, config: ConnectionConfig) -> Self {
        let name = name.into();
        let mut connections = HashMap::new();
        connections.insert(name.clone(), config);
        Self {
            default: name,
            connections,
        }
    }

    /// Returns the configuration of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when `name` is not configured.
    pub fn connection(&self, name: &str) -> Result<ConnectionConfig> {
        let mut config = self
            .connections
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Config(format!("database [{name}] not configured")))?;
        if config.name.is_none() {
            config.name = Some(name.to_string());
        }
        Ok(config)
    }
}
