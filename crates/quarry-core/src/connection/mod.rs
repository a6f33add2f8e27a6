//! Connection facade.
//!
//! A [`Connection`] owns a write driver and an optional read driver, picks
//! the grammars for its dialect and runs every statement the builders
//! compile. It counts nested transactions, records a query log, captures
//! statements instead of running them while pretending, and reconnects
//! once when a driver reports a lost connection.

pub mod config;
mod driver;

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::error::{DriverError, Error, Result};
use crate::expression::{raw, Expression};
use crate::grammar::ParameterStyle;
use crate::query::{Builder, MySqlGrammar, PostgresGrammar, QueryGrammar, SqliteGrammar};
use crate::row::Row;
use crate::schema::{
    MySqlSchemaGrammar, PostgresSchemaGrammar, SchemaBuilder, SchemaGrammar, SqliteSchemaGrammar,
};
use crate::value::SqlValue;

pub use config::{ConnectionConfig, DatabaseConfig, DriverKind, EndpointConfig, ReadConfig};
pub use driver::{Connector, Driver, DriverResult, ExecuteResult, Role};

/// Driver messages that mean the session is gone.
pub const DEFAULT_LOST_CONNECTION_MESSAGES: &[&str] = &[
    "server has gone away",
    "no connection to the server",
    "lost connection",
];

const NO_CONNECTION: &str = "no connection to the server";

/// A statement recorded by the query log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedQuery {
    /// The SQL text.
    pub sql: String,
    /// Its bindings.
    pub bindings: Vec<SqlValue>,
    /// Wall time in milliseconds, rounded to two decimals. `None` for
    /// statements captured while pretending.
    pub elapsed_ms: Option<f64>,
}

#[derive(Debug, Default)]
struct Drivers {
    write: Option<Box<dyn Driver>>,
    read: Option<Box<dyn Driver>>,
}

impl Drivers {
    fn pick(&mut self, read: bool) -> Option<&mut Box<dyn Driver>> {
        if read {
            if let Some(driver) = self.read.as_mut() {
                return Some(driver);
            }
        }
        self.write.as_mut()
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Select { read: bool },
    Execute,
    Unprepared,
}

enum Outcome {
    Rows(Vec<Row>),
    Executed(ExecuteResult),
    Unprepared(u64),
}

impl Outcome {
    fn empty(operation: Operation) -> Self {
        match operation {
            Operation::Select { .. } => Self::Rows(Vec::new()),
            Operation::Execute => Self::Executed(ExecuteResult::default()),
            Operation::Unprepared => Self::Unprepared(0),
        }
    }

    fn rows(self) -> Vec<Row> {
        match self {
            Self::Rows(rows) => rows,
            _ => Vec::new(),
        }
    }

    fn executed(self) -> ExecuteResult {
        match self {
            Self::Executed(result) => result,
            Self::Unprepared(rows_affected) => ExecuteResult {
                rows_affected,
                last_insert_id: None,
            },
            Self::Rows(_) => ExecuteResult::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TransactionCall {
    Begin,
    Commit,
    Rollback,
}

/// A database connection.
pub struct Connection {
    name: String,
    config: ConnectionConfig,
    driver_kind: DriverKind,
    query_grammar: Arc<dyn QueryGrammar>,
    schema_grammar: Arc<dyn SchemaGrammar>,
    drivers: tokio::sync::Mutex<Drivers>,
    reconnector: Option<Arc<dyn Connector>>,
    transactions: AtomicUsize,
    pretending: AtomicBool,
    logging: AtomicBool,
    query_log: Mutex<Vec<LoggedQuery>>,
    lost_connection_messages: Vec<String>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("driver", &self.driver_kind)
            .field("transactions", &self.transaction_level())
            .field("pretending", &self.is_pretending())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Wraps already opened drivers.
    ///
    /// The grammars follow `config.driver`; a driver that requires its own
    /// marker style overrides `use_qmark`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedDriver`] for unknown drivers.
    pub fn new(
        name: impl Into<String>,
        config: ConnectionConfig,
        write: Box<dyn Driver>,
        read: Option<Box<dyn Driver>>,
    ) -> Result<Self> {
        let driver_kind = config.driver_kind()?;
        let style = match write.parameter_style() {
            Some(style) => style,
            None => config.parameter_style()?,
        };
        let (query_grammar, schema_grammar) = grammars(&config, driver_kind, style);
        let lost_connection_messages = config.lost_connection_messages.clone().unwrap_or_else(|| {
            DEFAULT_LOST_CONNECTION_MESSAGES
                .iter()
                .map(|m| (*m).to_string())
                .collect()
        });
        Ok(Self {
            name: name.into(),
            driver_kind,
            query_grammar,
            schema_grammar,
            drivers: tokio::sync::Mutex::new(Drivers {
                write: Some(write),
                read,
            }),
            reconnector: None,
            transactions: AtomicUsize::new(0),
            pretending: AtomicBool::new(false),
            logging: AtomicBool::new(config.log_queries),
            query_log: Mutex::new(Vec::new()),
            lost_connection_messages,
            config,
        })
    }

    /// Opens the drivers through `connector` and keeps it as reconnector.
    ///
    /// # Errors
    ///
    /// Returns the connector's failure.
    pub async fn connect(
        name: impl Into<String>,
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        let name = name.into();
        let write = connector.connect(&config, Role::Write).await?;
        let read = if config.has_read_endpoint() {
            Some(connector.connect(&config, Role::Read).await?)
        } else {
            None
        };
        info!(connection = %name, driver = %config.driver, "Connected");
        Ok(Self::new(name, config, write, read)?.with_reconnector(connector))
    }

    /// Sets the connector used after a lost connection.
    #[must_use]
    pub fn with_reconnector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.reconnector = Some(connector);
        self
    }

    // ----- accessors -----

    /// Connection name.
    #[must_use]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    /// Configuration the connection was built from.
    #[must_use]
    pub const fn get_config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Dialect of the connection.
    #[must_use]
    pub const fn driver_kind(&self) -> DriverKind {
        self.driver_kind
    }

    /// Driver name.
    #[must_use]
    pub const fn driver_name(&self) -> &'static str {
        self.driver_kind.as_str()
    }

    /// Table prefix.
    #[must_use]
    pub fn get_table_prefix(&self) -> &str {
        &self.config.prefix
    }

    /// Query grammar.
    #[must_use]
    pub const fn query_grammar(&self) -> &Arc<dyn QueryGrammar> {
        &self.query_grammar
    }

    /// Schema grammar.
    #[must_use]
    pub const fn schema_grammar(&self) -> &Arc<dyn SchemaGrammar> {
        &self.schema_grammar
    }

    /// Starts a query against `table`.
    #[must_use]
    pub fn table(&self, table: &str) -> Builder<'_> {
        Builder::on_connection(self).from(table)
    }

    /// Starts a query with no table.
    #[must_use]
    pub fn query(&self) -> Builder<'_> {
        Builder::on_connection(self)
    }

    /// Wraps SQL that must not be quoted or bound.
    #[must_use]
    pub fn raw(&self, sql: impl Into<String>) -> Expression {
        raw(sql)
    }

    /// Schema builder for this connection.
    #[must_use]
    pub fn schema(&self) -> SchemaBuilder<'_> {
        SchemaBuilder::new(self)
    }

    // ----- execution -----

    /// Runs a SELECT, on the read driver outside transactions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn select(&self, sql: &str, bindings: &[SqlValue]) -> Result<Vec<Row>> {
        self.run(sql, bindings, Operation::Select { read: true })
            .await
            .map(Outcome::rows)
    }

    /// Runs a SELECT on the write driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn select_from_write(&self, sql: &str, bindings: &[SqlValue]) -> Result<Vec<Row>> {
        self.run(sql, bindings, Operation::Select { read: false })
            .await
            .map(Outcome::rows)
    }

    /// Runs an INSERT.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn insert(&self, sql: &str, bindings: &[SqlValue]) -> Result<bool> {
        self.statement(sql, bindings).await
    }

    /// Runs an INSERT and returns the id the driver reports, or 0.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn insert_get_id(&self, sql: &str, bindings: &[SqlValue]) -> Result<i64> {
        let result = self.execute(sql, bindings).await?;
        Ok(result.last_insert_id.unwrap_or_default())
    }

    /// Runs an UPDATE and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn update(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64> {
        self.affecting_statement(sql, bindings).await
    }

    /// Runs a DELETE and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn delete(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64> {
        self.affecting_statement(sql, bindings).await
    }

    /// Runs any statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn statement(&self, sql: &str, bindings: &[SqlValue]) -> Result<bool> {
        self.execute(sql, bindings).await.map(|_| true)
    }

    /// Runs a statement and returns the affected row count.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn affecting_statement(&self, sql: &str, bindings: &[SqlValue]) -> Result<u64> {
        self.execute(sql, bindings)
            .await
            .map(|result| result.rows_affected)
    }

    /// Runs SQL without preparing it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Query`] when the statement fails.
    pub async fn unprepared(&self, sql: &str) -> Result<bool> {
        self.run(sql, &[], Operation::Unprepared).await.map(|_| true)
    }

    async fn execute(&self, sql: &str, bindings: &[SqlValue]) -> Result<ExecuteResult> {
        self.run(sql, bindings, Operation::Execute)
            .await
            .map(Outcome::executed)
    }

    async fn run(&self, sql: &str, bindings: &[SqlValue], operation: Operation) -> Result<Outcome> {
        if self.is_pretending() {
            self.log_query(sql, bindings, None);
            return Ok(Outcome::empty(operation));
        }

        let started = Instant::now();
        let outcome = match self.run_once(sql, bindings, operation).await {
            Ok(outcome) => outcome,
            Err(error) if self.may_reconnect(&error) => {
                warn!(connection = %self.name, %error, "Lost connection, reconnecting");
                self.reconnect().await?;
                self.run_once(sql, bindings, operation)
                    .await
                    .map_err(|source| query_error(sql, bindings, source))?
            }
            Err(source) => return Err(query_error(sql, bindings, source)),
        };

        let elapsed_ms = round_ms(started.elapsed().as_secs_f64() * 1000.0);
        debug!(connection = %self.name, sql, elapsed_ms, "Executed statement");
        if self.logging() {
            self.log_query(sql, bindings, Some(elapsed_ms));
        }
        Ok(outcome)
    }

    async fn run_once(
        &self,
        sql: &str,
        bindings: &[SqlValue],
        operation: Operation,
    ) -> DriverResult<Outcome> {
        let use_read = matches!(operation, Operation::Select { read: true })
            && self.transaction_level() == 0;
        let mut drivers = self.drivers.lock().await;
        let driver = drivers
            .pick(use_read)
            .ok_or_else(|| DriverError::new(NO_CONNECTION))?;
        match operation {
            Operation::Select { .. } => driver.fetch_all(sql, bindings).await.map(Outcome::Rows),
            Operation::Execute => driver.execute(sql, bindings).await.map(Outcome::Executed),
            Operation::Unprepared => driver
                .execute_unprepared(sql)
                .await
                .map(Outcome::Unprepared),
        }
    }

    /// A lost connection is only recovered outside transactions; a fresh
    /// session would not carry the open transaction.
    fn may_reconnect(&self, error: &DriverError) -> bool {
        self.reconnector.is_some()
            && self.transaction_level() == 0
            && self.caused_by_lost_connection(error)
    }

    fn caused_by_lost_connection(&self, error: &DriverError) -> bool {
        let message = error.message().to_lowercase();
        self.lost_connection_messages
            .iter()
            .any(|needle| message.contains(&needle.to_lowercase()))
    }

    // ----- driver management -----

    /// Replaces the write driver.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransactionActive`] while a transaction is open.
    pub async fn set_connection(&self, driver: Box<dyn Driver>) -> Result<()> {
        let level = self.transaction_level();
        if level >= 1 {
            return Err(Error::TransactionActive(level));
        }
        self.drivers.lock().await.write = Some(driver);
        Ok(())
    }

    /// Replaces the read driver. `None` sends reads to the write driver.
    pub async fn set_read_connection(&self, driver: Option<Box<dyn Driver>>) {
        self.drivers.lock().await.read = driver;
    }

    /// Closes both drivers. The next statement reconnects, or fails when
    /// there is no reconnector.
    pub async fn disconnect(&self) {
        let mut drivers = self.drivers.lock().await;
        for mut driver in [drivers.write.take(), drivers.read.take()].into_iter().flatten() {
            if let Err(error) = driver.close().await {
                warn!(connection = %self.name, %error, "Failed to close driver");
            }
        }
        debug!(connection = %self.name, "Disconnected");
    }

    /// Opens fresh drivers through the reconnector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LostConnection`] without a reconnector, or the
    /// connector's failure.
    pub async fn reconnect(&self) -> Result<()> {
        let connector = self.reconnector.as_ref().ok_or_else(|| {
            Error::LostConnection(format!("connection [{}] has no reconnector", self.name))
        })?;
        let write = connector.connect(&self.config, Role::Write).await?;
        let read = if self.config.has_read_endpoint() {
            Some(connector.connect(&self.config, Role::Read).await?)
        } else {
            None
        };
        let mut drivers = self.drivers.lock().await;
        drivers.write = Some(write);
        drivers.read = read;
        info!(connection = %self.name, "Reconnected");
        Ok(())
    }

    // ----- transactions -----

    /// Number of open (nested) transactions.
    #[must_use]
    pub fn transaction_level(&self) -> usize {
        self.transactions.load(Ordering::SeqCst)
    }

    /// Opens a transaction, or a nesting level inside one.
    ///
    /// # Errors
    ///
    /// Returns the driver failure; the level is unchanged then.
    pub async fn begin_transaction(&self) -> Result<()> {
        if self.transaction_level() == 0 && !self.is_pretending() {
            self.begin_with_retry().await?;
        }
        let level = self.transactions.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(connection = %self.name, level, "Began transaction");
        Ok(())
    }

    async fn begin_with_retry(&self) -> Result<()> {
        match self.transaction_call(TransactionCall::Begin).await {
            Err(error) if self.may_reconnect(&error) => {
                warn!(connection = %self.name, %error, "Lost connection, reconnecting");
                self.reconnect().await?;
                Ok(self.transaction_call(TransactionCall::Begin).await?)
            }
            other => Ok(other?),
        }
    }

    /// Commits the innermost level; the driver commits when it is the
    /// outermost one.
    ///
    /// # Errors
    ///
    /// Returns an error without an open transaction, or the driver failure
    /// (the level is unchanged then).
    pub async fn commit(&self) -> Result<()> {
        let level = self.transaction_level();
        if level == 0 {
            return Err(Error::invalid("no active transaction to commit"));
        }
        if level == 1 && !self.is_pretending() {
            self.transaction_call(TransactionCall::Commit).await?;
        }
        self.transactions.fetch_sub(1, Ordering::SeqCst);
        debug!(connection = %self.name, level, "Committed transaction");
        Ok(())
    }

    /// Rolls back. At the outermost level the driver rolls back; deeper
    /// levels only decrement the counter.
    ///
    /// # Errors
    ///
    /// Returns the driver failure.
    pub async fn rollback(&self) -> Result<()> {
        match self.transaction_level() {
            0 => Ok(()),
            1 => {
                self.transactions.store(0, Ordering::SeqCst);
                if !self.is_pretending() {
                    self.transaction_call(TransactionCall::Rollback).await?;
                }
                debug!(connection = %self.name, "Rolled back transaction");
                Ok(())
            }
            _ => {
                self.transactions.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    async fn transaction_call(&self, call: TransactionCall) -> DriverResult<()> {
        let mut drivers = self.drivers.lock().await;
        let driver = drivers
            .write
            .as_mut()
            .ok_or_else(|| DriverError::new(NO_CONNECTION))?;
        match call {
            TransactionCall::Begin => driver.begin().await,
            TransactionCall::Commit => driver.commit().await,
            TransactionCall::Rollback => driver.rollback().await,
        }
    }

    async fn rollback_after_failure(&self) {
        if let Err(error) = self.rollback().await {
            warn!(connection = %self.name, %error, "Rollback failed");
        }
    }

    /// Runs `callback` inside a transaction. An error from the callback, or
    /// a failed commit, rolls the transaction back.
    ///
    /// ```rust,ignore
    /// connection
    ///     .transaction(|conn| {
    ///         Box::pin(async move {
    ///             conn.table("accounts").where_eq("id", 1).decrement("balance", 10).await?;
    ///             conn.table("accounts").where_eq("id", 2).increment("balance", 10).await?;
    ///             Ok::<_, quarry_core::Error>(())
    ///         })
    ///     })
    ///     .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the callback's error, or the begin/commit failure.
    pub async fn transaction<F, T, E>(&self, callback: F) -> std::result::Result<T, E>
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, std::result::Result<T, E>>,
        E: From<Error>,
    {
        self.begin_transaction().await?;
        match callback(self).await {
            Ok(value) => {
                if let Err(error) = self.commit().await {
                    self.rollback_after_failure().await;
                    return Err(error.into());
                }
                Ok(value)
            }
            Err(error) => {
                self.rollback_after_failure().await;
                Err(error)
            }
        }
    }

    // ----- pretending -----

    /// Returns `true` while statements are captured instead of run.
    #[must_use]
    pub fn is_pretending(&self) -> bool {
        self.pretending.load(Ordering::SeqCst)
    }

    /// Runs `callback` without touching the database and returns the
    /// statements it issued. The previous mode and query log are restored
    /// on every exit path.
    ///
    /// # Errors
    ///
    /// Returns the callback's error.
    pub async fn pretend<F, E>(&self, callback: F) -> std::result::Result<Vec<LoggedQuery>, E>
    where
        F: for<'a> FnOnce(&'a Self) -> BoxFuture<'a, std::result::Result<(), E>>,
    {
        info!(connection = %self.name, "Pretending");
        let guard = PretendGuard::enter(self);
        callback(self).await?;
        Ok(guard.finish())
    }

    // ----- query log -----

    /// Starts recording executed statements.
    pub fn enable_query_log(&self) {
        self.logging.store(true, Ordering::SeqCst);
    }

    /// Stops recording executed statements.
    pub fn disable_query_log(&self) {
        self.logging.store(false, Ordering::SeqCst);
    }

    /// Returns `true` while statements are recorded.
    #[must_use]
    pub fn logging(&self) -> bool {
        self.logging.load(Ordering::SeqCst)
    }

    /// Recorded statements, oldest first.
    #[must_use]
    pub fn get_query_log(&self) -> Vec<LoggedQuery> {
        self.lock_log().clone()
    }

    /// Clears the query log.
    pub fn flush_query_log(&self) {
        self.lock_log().clear();
    }

    fn log_query(&self, sql: &str, bindings: &[SqlValue], elapsed_ms: Option<f64>) {
        self.lock_log().push(LoggedQuery {
            sql: sql.to_string(),
            bindings: bindings.to_vec(),
            elapsed_ms,
        });
    }

    fn lock_log(&self) -> MutexGuard<'_, Vec<LoggedQuery>> {
        self.query_log.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Pretend mode for the lifetime of the guard.
struct PretendGuard<'c> {
    connection: &'c Connection,
    was_pretending: bool,
    was_logging: bool,
    saved_log: Vec<LoggedQuery>,
}

impl<'c> PretendGuard<'c> {
    fn enter(connection: &'c Connection) -> Self {
        let saved_log = mem::take(&mut *connection.lock_log());
        let was_pretending = connection.pretending.swap(true, Ordering::SeqCst);
        let was_logging = connection.logging.swap(true, Ordering::SeqCst);
        Self {
            connection,
            was_pretending,
            was_logging,
            saved_log,
        }
    }

    fn finish(self) -> Vec<LoggedQuery> {
        mem::take(&mut *self.connection.lock_log())
    }
}

impl Drop for PretendGuard<'_> {
    fn drop(&mut self) {
        let connection = self.connection;
        *connection.lock_log() = mem::take(&mut self.saved_log);
        connection
            .pretending
            .store(self.was_pretending, Ordering::SeqCst);
        connection.logging.store(self.was_logging, Ordering::SeqCst);
    }
}

fn grammars(
    config: &ConnectionConfig,
    kind: DriverKind,
    style: ParameterStyle,
) -> (Arc<dyn QueryGrammar>, Arc<dyn SchemaGrammar>) {
    let prefix = config.prefix.clone();
    match kind {
        DriverKind::Sqlite => (
            Arc::new(
                SqliteGrammar::new()
                    .with_table_prefix(prefix.clone())
                    .with_parameter_style(style),
            ),
            Arc::new(
                SqliteSchemaGrammar::new()
                    .with_table_prefix(prefix)
                    .with_parameter_style(style),
            ),
        ),
        DriverKind::MySql => {
            let mut schema = MySqlSchemaGrammar::new()
                .with_table_prefix(prefix.clone())
                .with_parameter_style(style)
                .with_database(config.database.clone())
                .with_table_defaults(
                    config.engine.clone(),
                    config.charset.clone(),
                    config.collation.clone(),
                );
            if let Some(version) = &config.server_version {
                schema = schema.with_server_version(version);
            }
            (
                Arc::new(
                    MySqlGrammar::new()
                        .with_table_prefix(prefix)
                        .with_parameter_style(style),
                ),
                Arc::new(schema),
            )
        }
        DriverKind::Postgres => {
            let mut schema = PostgresSchemaGrammar::new()
                .with_table_prefix(prefix.clone())
                .with_parameter_style(style);
            if let Some(search) = &config.schema {
                schema = schema.with_schema(search.clone());
            }
            (
                Arc::new(
                    PostgresGrammar::new()
                        .with_table_prefix(prefix)
                        .with_parameter_style(style),
                ),
                Arc::new(schema),
            )
        }
    }
}

fn query_error(sql: &str, bindings: &[SqlValue], source: DriverError) -> Error {
    Error::Query {
        sql: sql.to_string(),
        bindings: bindings.to_vec(),
        source,
    }
}

fn round_ms(ms: f64) -> f64 {
    (ms * 100.0).round() / 100.0
}
