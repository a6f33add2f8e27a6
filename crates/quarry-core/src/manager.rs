//! Named connections built on demand.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::Mutex;
use tracing::debug;

use crate::connection::{Connection, Connector, DatabaseConfig};
use crate::error::Result;

/// Opens, caches and closes the connections of a [`DatabaseConfig`].
#[derive(Debug)]
pub struct DatabaseManager {
    config: DatabaseConfig,
    connector: Arc<dyn Connector>,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    default: RwLock<String>,
}

impl DatabaseManager {
    /// Creates a manager. No connection is opened yet.
    #[must_use]
    pub fn new(config: DatabaseConfig, connector: Arc<dyn Connector>) -> Self {
        let default = RwLock::new(config.default.clone());
        Self {
            config,
            connector,
            connections: Mutex::new(HashMap::new()),
            default,
        }
    }

    /// The configuration.
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Name of the default connection.
    #[must_use]
    pub fn default_connection(&self) -> String {
        self.default
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Changes the default connection.
    pub fn set_default_connection(&self, name: impl Into<String>) {
        *self.default.write().unwrap_or_else(PoisonError::into_inner) = name.into();
    }

    /// Configured connection names, sorted.
    #[must_use]
    pub fn connection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.config.connections.keys().cloned().collect();
        names.sort();
        names
    }

    fn resolve(&self, name: Option<&str>) -> String {
        name.map_or_else(|| self.default_connection(), String::from)
    }

    /// Returns the connection `name` (the default one for `None`), opening
    /// it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] for unknown names, or the
    /// connector's failure.
    pub async fn connection(&self, name: Option<&str>) -> Result<Arc<Connection>> {
        let name = self.resolve(name);
        if let Some(connection) = self.connections.lock().await.get(&name) {
            return Ok(Arc::clone(connection));
        }

        // Connect without the lock so a slow endpoint does not stall the
        // other connections. The first connection cached wins a race.
        let config = self.config.connection(&name)?;
        let opened = Connection::connect(name.clone(), config, Arc::clone(&self.connector)).await?;
        let (connection, loser) = match self.connections.lock().await.entry(name) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), Some(opened)),
            Entry::Vacant(entry) => (Arc::clone(entry.insert(Arc::new(opened))), None),
        };
        if let Some(loser) = loser {
            debug!(connection = %connection.get_name(), "Closing connection opened concurrently");
            loser.disconnect().await;
        }
        Ok(connection)
    }

    /// Reconnects `name`, opening it when it was never used.
    ///
    /// # Errors
    ///
    /// Returns the connector's failure.
    pub async fn reconnect(&self, name: Option<&str>) -> Result<Arc<Connection>> {
        let name = self.resolve(name);
        let cached = self.connections.lock().await.get(&name).cloned();
        match cached {
            Some(connection) => {
                connection.reconnect().await?;
                Ok(connection)
            }
            None => self.connection(Some(&name)).await,
        }
    }

    /// Closes the drivers of `name`. The connection stays cached and
    /// reconnects on its next statement.
    pub async fn disconnect(&self, name: Option<&str>) {
        let name = self.resolve(name);
        let cached = self.connections.lock().await.get(&name).cloned();
        if let Some(connection) = cached {
            connection.disconnect().await;
        }
    }

    /// Disconnects `name` and forgets it.
    pub async fn purge(&self, name: Option<&str>) {
        let name = self.resolve(name);
        let removed = self.connections.lock().await.remove(&name);
        if let Some(connection) = removed {
            connection.disconnect().await;
            debug!(connection = %name, "Purged connection");
        }
    }
}
