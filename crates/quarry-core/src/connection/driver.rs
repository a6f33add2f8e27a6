//! The contract a database driver fulfils for a [`super::Connection`].

use std::fmt;

use async_trait::async_trait;

use crate::error::{DriverError, Result};
use crate::grammar::ParameterStyle;
use crate::row::Row;
use crate::value::SqlValue;

use super::config::ConnectionConfig;

/// Result type of driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    /// Rows changed by the statement.
    pub rows_affected: u64,
    /// Id generated by an insert, when the driver reports one.
    pub last_insert_id: Option<i64>,
}

/// One open database session.
///
/// The connection owns its drivers and never shares a driver between
/// tasks; implementations only need `Send`.
#[async_trait]
pub trait Driver: Send + fmt::Debug {
    /// Returns the driver name (`sqlite`, `mysql`, `postgres`, ...).
    fn name(&self) -> &'static str;

    /// Marker style the driver requires, overriding the configured one.
    fn parameter_style(&self) -> Option<ParameterStyle> {
        None
    }

    /// Runs a query and collects its rows.
    async fn fetch_all(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<Vec<Row>>;

    /// Runs a statement.
    async fn execute(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<ExecuteResult>;

    /// Runs SQL without preparing it. May contain several statements.
    async fn execute_unprepared(&mut self, sql: &str) -> DriverResult<u64>;

    /// Opens a transaction.
    async fn begin(&mut self) -> DriverResult<()>;

    /// Commits the open transaction.
    async fn commit(&mut self) -> DriverResult<()>;

    /// Rolls back the open transaction.
    async fn rollback(&mut self) -> DriverResult<()>;

    /// Closes the session. Later calls fail.
    async fn close(&mut self) -> DriverResult<()>;
}

/// Which side of a read/write split a driver serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read-only replica.
    Read,
    /// Primary.
    Write,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// Opens drivers from configuration.
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Opens a driver for `role`, using the matching endpoint of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UnsupportedDriver`] or
    /// [`crate::Error::MissingPackage`] when the driver cannot be provided,
    /// or the driver's failure to connect.
    async fn connect(&self, config: &ConnectionConfig, role: Role) -> Result<Box<dyn Driver>>;
}
