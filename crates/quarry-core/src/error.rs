//! Error types for the query builder, schema builder and connection layer.

use std::error::Error as StdError;
use std::fmt;

use crate::value::SqlValue;

/// An error raised by a database driver.
///
/// Keeps the driver's message so the connection can recognise lost
/// connections by substring.
#[derive(Debug)]
pub struct DriverError {
    message: String,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl DriverError {
    /// Creates a driver error from a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an underlying driver error.
    pub fn from_source<E>(source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns the driver message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for DriverError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// Errors produced by the core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A caller passed an argument the builder or grammar cannot use.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The configured driver name is unknown.
    #[error("unsupported driver: {0}")]
    UnsupportedDriver(String),

    /// The driver is known but its backing package was not compiled in.
    #[error("missing package for driver: {0}")]
    MissingPackage(String),

    /// A statement failed after any reconnection retry.
    #[error("{source} (SQL: {sql})")]
    Query {
        /// The statement that failed.
        sql: String,
        /// Its bindings.
        bindings: Vec<SqlValue>,
        /// The driver failure.
        #[source]
        source: DriverError,
    },

    /// A driver failure not tied to a particular statement.
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    /// The connection was swapped while a transaction was open.
    #[error("cannot change the connection while {0} transaction(s) are active")]
    TransactionActive(usize),

    /// The connection is closed and cannot be re-established.
    #[error("lost connection: {0}")]
    LostConnection(String),

    /// Configuration could not be used.
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::InvalidArgument`].
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Returns the driver message carried by this error, if any.
    #[must_use]
    pub fn driver_message(&self) -> Option<&str> {
        match self {
            Self::Query { source, .. } | Self::Driver(source) => Some(source.message()),
            _ => None,
        }
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display_carries_sql() {
        let err = Error::Query {
            sql: "select 1".into(),
            bindings: vec![],
            source: DriverError::new("boom"),
        };
        assert_eq!(err.to_string(), "boom (SQL: select 1)");
        assert_eq!(err.driver_message(), Some("boom"));
    }
}
