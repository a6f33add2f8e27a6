//! MySQL driver.

use async_trait::async_trait;
use quarry_core::connection::{Driver, DriverResult, ExecuteResult};
use quarry_core::{ConnectionConfig, DriverError, Row, SqlValue};
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{ConnectOptions, Connection, Row as _};
use tracing::debug;

use crate::value::{bind_all, driver_error, to_row};

const CLOSED: &str = "no connection to the server";

/// A single MySQL connection.
#[derive(Debug)]
pub struct MySqlDriver {
    connection: Option<MySqlConnection>,
}

impl MySqlDriver {
    /// Connects with the endpoint, credentials and charset of `config`.
    ///
    /// # Errors
    ///
    /// Returns the sqlx failure.
    pub async fn connect(config: &ConnectionConfig) -> DriverResult<Self> {
        let mut options = MySqlConnectOptions::new()
            .host(config.host.as_deref().unwrap_or("localhost"))
            .port(config.port.unwrap_or(3306))
            .database(&config.database);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(charset) = &config.charset {
            options = options.charset(charset);
        }
        if let Some(collation) = &config.collation {
            options = options.collation(collation);
        }
        let connection = options.connect().await.map_err(driver_error)?;
        debug!(host = ?config.host, database = %config.database, "Opened MySQL connection");
        Ok(Self {
            connection: Some(connection),
        })
    }

    fn connection(&mut self) -> DriverResult<&mut MySqlConnection> {
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

fn convert(row: &MySqlRow) -> Row {
    to_row(row, |row, index| {
        if let Ok(n) = row.try_get::<u64, usize>(index) {
            return Some(i64::try_from(n).map_or_else(
                |_| SqlValue::Text(n.to_string()),
                SqlValue::Int,
            ));
        }
        // DECIMAL and friends arrive as text.
        row.try_get_unchecked::<String, usize>(index)
            .ok()
            .map(SqlValue::Text)
    })
}

#[async_trait]
impl Driver for MySqlDriver {
    fn name(&self) -> &'static str {
        "mysql"
    }

    async fn fetch_all(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<Vec<Row>> {
        let query = bind_all(sqlx::query::<MySql>(sql), bindings);
        let rows = query
            .fetch_all(self.connection()?)
            .await
            .map_err(driver_error)?;
        Ok(rows.iter().map(convert).collect())
    }

    async fn execute(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<ExecuteResult> {
        let query = bind_all(sqlx::query::<MySql>(sql), bindings);
        let result = query
            .execute(self.connection()?)
            .await
            .map_err(driver_error)?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id()).ok(),
        })
    }

    async fn execute_unprepared(&mut self, sql: &str) -> DriverResult<u64> {
        self.raw(sql).await
    }

    async fn begin(&mut self) -> DriverResult<()> {
        self.raw("START TRANSACTION").await.map(drop)
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
