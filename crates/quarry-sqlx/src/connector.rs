//! Opens sqlx-backed drivers for a connection configuration.

use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::connection::{Connector, Driver, DriverKind, Role};
use quarry_core::{Connection, ConnectionConfig, DatabaseConfig, DatabaseManager, Error, Result};
use tracing::info;

/// Connects SQLite, MySQL and PostgreSQL configurations through sqlx.
///
/// Drivers whose cargo feature is disabled report
/// [`Error::MissingPackage`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

impl SqlxConnector {
    /// Creates the connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for SqlxConnector {
    async fn connect(&self, config: &ConnectionConfig, role: Role) -> Result<Box<dyn Driver>> {
        let kind = config.driver_kind()?;
        let endpoint = match role {
            Role::Write => config.write_config(),
            Role::Read => config.read_config().unwrap_or_else(|| config.write_config()),
        };
        info!(driver = %kind, %role, database = %endpoint.database, "Connecting");
        open(kind, &endpoint).await
    }
}

#[allow(unused_variables)]
async fn open(kind: DriverKind, config: &ConnectionConfig) -> Result<Box<dyn Driver>> {
    match kind {
        #[cfg(feature = "sqlite")]
        DriverKind::Sqlite => Ok(Box::new(crate::sqlite::SqliteDriver::connect(config).await?)),
        #[cfg(feature = "mysql")]
        DriverKind::MySql => Ok(Box::new(crate::mysql::MySqlDriver::connect(config).await?)),
        #[cfg(feature = "postgres")]
        DriverKind::Postgres => Ok(Box::new(
            crate::postgres::PostgresDriver::connect(config).await?,
        )),
        #[allow(unreachable_patterns)]
        other => Err(Error::MissingPackage(other.to_string())),
    }
}

/// Opens a connection that reconnects through [`SqlxConnector`].
///
/// # Errors
///
/// Returns configuration and connection failures.
pub async fn connect(name: &str, config: ConnectionConfig) -> Result<Connection> {
    Connection::connect(name, config, Arc::new(SqlxConnector)).await
}

/// Creates a manager whose connections are opened through [`SqlxConnector`].
#[must_use]
pub fn manager(config: DatabaseConfig) -> DatabaseManager {
    DatabaseManager::new(config, Arc::new(SqlxConnector))
}
