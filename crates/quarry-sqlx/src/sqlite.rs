//! SQLite driver.

use std::str::FromStr;

use async_trait::async_trait;
use quarry_core::connection::{Driver, DriverResult, ExecuteResult};
use quarry_core::{ConnectionConfig, DriverError, Row, SqlValue};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Sqlite};
use tracing::debug;

use crate::value::{bind_all, driver_error, to_row};

const CLOSED: &str = "no connection to the server";

/// A single SQLite connection.
#[derive(Debug)]
pub struct SqliteDriver {
    connection: Option<SqliteConnection>,
}

impl SqliteDriver {
    /// Opens the database file named by `config.database`, creating it when
    /// missing. `:memory:` opens a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns the sqlx failure.
    pub async fn connect(config: &ConnectionConfig) -> DriverResult<Self> {
        let options = if config.database == ":memory:" {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(driver_error)?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database)
                .create_if_missing(true)
        };
        let connection = options
            .foreign_keys(config.foreign_keys)
            .connect()
            .await
            .map_err(driver_error)?;
        debug!(database = %config.database, "Opened SQLite connection");
        Ok(Self::from_connection(connection))
    }

    /// Wraps an open connection.
    #[must_use]
    pub const fn from_connection(connection: SqliteConnection) -> Self {
        Self {
            connection: Some(connection),
        }
    }

    fn connection(&mut self) -> DriverResult<&mut SqliteConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| DriverError::new(CLOSED))
    }

    async fn raw(&mut self, sql: &str) -> DriverResult<u64> {
        let result = sqlx::Executor::execute(self.connection()?, sqlx::raw_sql(sql))
            .await
            .map_err(driver_error)?;
        Ok(result.rows_affected())
    }
}

fn convert(row: &SqliteRow) -> Row {
    // Columns without a declared type report the storage class of each value;
    // read anything else as text.
    to_row(row, |row, index| {
        sqlx::Row::try_get_unchecked::<String, usize>(row, index)
            .ok()
            .map(SqlValue::Text)
    })
}

#[async_trait]
impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn fetch_all(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<Vec<Row>> {
        let query = bind_all(sqlx::query::<Sqlite>(sql), bindings);
        let rows = query
            .fetch_all(self.connection()?)
            .await
            .map_err(driver_error)?;
        Ok(rows.iter().map(convert).collect())
    }

    async fn execute(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<ExecuteResult> {
        let query = bind_all(sqlx::query::<Sqlite>(sql), bindings);
        let result = query
            .execute(self.connection()?)
            .await
            .map_err(driver_error)?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn execute_unprepared(&mut self, sql: &str) -> DriverResult<u64> {
        self.raw(sql).await
    }

    async fn begin(&mut self) -> DriverResult<()> {
        self.raw("BEGIN").await.map(drop)
    }

    async fn commit(&mut self) -> DriverResult<()> {
        self.raw("COMMIT").await.map(drop)
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.raw("ROLLBACK").await.map(drop)
    }

    async fn close(&mut self) -> DriverResult<()> {
        match self.connection.take() {
            Some(connection) => connection.close().await.map_err(driver_error),
            None => Ok(()),
        }
    }
}
