//! PostgreSQL driver.

use async_trait::async_trait;
use quarry_core::connection::{Driver, DriverResult, ExecuteResult};
use quarry_core::grammar::ParameterStyle;
use quarry_core::{ConnectionConfig, DriverError, Row, SqlValue};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow, Postgres};
use sqlx::{ConnectOptions, Connection};
use tracing::debug;

use crate::value::{bind_all, driver_error, to_row};

const CLOSED: &str = "no connection to the server";

/// A single PostgreSQL connection.
///
/// The grammar emits `?` markers for this driver; they are renumbered to
/// `$1`, `$2`, ... before the statement is sent.
#[derive(Debug)]
pub struct PostgresDriver {
    connection: Option<PgConnection>,
}

impl PostgresDriver {
    /// Connects with the endpoint and credentials of `config`. A configured
    /// schema becomes the session's `search_path`.
    ///
    /// # Errors
    ///
    /// Returns the sqlx failure.
    pub async fn connect(config: &ConnectionConfig) -> DriverResult<Self> {
        let mut options = PgConnectOptions::new()
            .host(config.host.as_deref().unwrap_or("localhost"))
            .port(config.port.unwrap_or(5432))
            .database(&config.database);
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(schema) = &config.schema {
            options = options.options([("search_path", schema.as_str())]);
        }
        let connection = options.connect().await.map_err(driver_error)?;
        debug!(host = ?config.host, database = %config.database, "Opened PostgreSQL connection");
        Ok(Self {
            connection: Some(connection),
        })
    }

    fn connection(&mut self) -> DriverResult<&mut PgConnection> {
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

/// Rewrites `?` markers as `$n`, leaving quoted text and identifiers alone.
#[must_use]
pub fn number_markers(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len() + 8);
    let mut quote: Option<char> = None;
    let mut next = 0_usize;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '?' => {
                next += 1;
                out.push('$');
                out.push_str(&next.to_string());
                continue;
            }
            None => {}
        }
        out.push(c);
    }
    out
}

fn convert(row: &PgRow) -> Row {
    to_row(row, |_, _| None)
}

#[async_trait]
impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn parameter_style(&self) -> Option<ParameterStyle> {
        Some(ParameterStyle::Qmark)
    }

    async fn fetch_all(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<Vec<Row>> {
        let sql = number_markers(sql);
        let query = bind_all(sqlx::query::<Postgres>(&sql), bindings);
        let rows = query
            .fetch_all(self.connection()?)
            .await
            .map_err(driver_error)?;
        Ok(rows.iter().map(convert).collect())
    }

    async fn execute(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<ExecuteResult> {
        let sql = number_markers(sql);
        let query = bind_all(sqlx::query::<Postgres>(&sql), bindings);
        let result = query
            .execute(self.connection()?)
            .await
            .map_err(driver_error)?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
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
