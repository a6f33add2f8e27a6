//! A driver that records statements instead of talking to a database.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quarry_core::connection::{
    Connector, Driver, DriverResult, ExecuteResult, Role,
};
use quarry_core::{Connection, ConnectionConfig, DriverError, Result, Row, SqlValue};

/// A statement seen by a scripted driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Seen {
    pub role: Role,
    pub sql: String,
    pub bindings: Vec<SqlValue>,
}

#[derive(Debug, Default)]
pub struct State {
    pub seen: Vec<Seen>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    pub closed: usize,
    pub rows: VecDeque<Vec<Row>>,
    pub failures: VecDeque<String>,
    pub fail_commit: bool,
}

/// Shared state of every driver opened from the same script.
#[derive(Debug, Clone, Default)]
pub struct Script(Arc<Mutex<State>>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.0.lock().unwrap()
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.state().rows.push_back(rows);
    }

    pub fn fail_next(&self, message: &str) {
        self.state().failures.push_back(message.to_string());
    }

    pub fn statements(&self) -> Vec<String> {
        self.state().seen.iter().map(|s| s.sql.clone()).collect()
    }

    pub fn driver(&self, role: Role) -> Box<dyn Driver> {
        Box::new(ScriptedDriver {
            script: self.clone(),
            role,
            open: true,
        })
    }
}

/// One row with a single column.
pub fn row(column: &str, value: SqlValue) -> Row {
    Row::new(vec![column.to_string()], vec![value])
}

#[derive(Debug)]
pub struct ScriptedDriver {
    script: Script,
    role: Role,
    open: bool,
}

impl ScriptedDriver {
    fn record(&self, sql: &str, bindings: &[SqlValue]) -> DriverResult<()> {
        if !self.open {
            return Err(DriverError::new("no connection to the server"));
        }
        let mut state = self.script.state();
        if let Some(message) = state.failures.pop_front() {
            return Err(DriverError::new(message));
        }
        state.seen.push(Seen {
            role: self.role,
            sql: sql.to_string(),
            bindings: bindings.to_vec(),
        });
        Ok(())
    }
}

#[async_trait]
impl Driver for ScriptedDriver {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn fetch_all(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<Vec<Row>> {
        self.record(sql, bindings)?;
        Ok(self.script.state().rows.pop_front().unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, bindings: &[SqlValue]) -> DriverResult<ExecuteResult> {
        self.record(sql, bindings)?;
        Ok(ExecuteResult {
            rows_affected: 1,
            last_insert_id: Some(7),
        })
    }

    async fn execute_unprepared(&mut self, sql: &str) -> DriverResult<u64> {
        self.record(sql, &[])?;
        Ok(0)
    }

    async fn begin(&mut self) -> DriverResult<()> {
        self.script.state().begins += 1;
        Ok(())
    }

    async fn commit(&mut self) -> DriverResult<()> {
        let mut state = self.script.state();
        if state.fail_commit {
            return Err(DriverError::new("commit refused"));
        }
        state.commits += 1;
        Ok(())
    }

    async fn rollback(&mut self) -> DriverResult<()> {
        self.script.state().rollbacks += 1;
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.open = false;
        self.script.state().closed += 1;
        Ok(())
    }
}

/// Opens scripted drivers and counts how often it was asked to.
#[derive(Debug, Default)]
pub struct ScriptedConnector {
    pub script: Script,
    pub connects: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            connects: AtomicUsize::new(0),
        }
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _config: &ConnectionConfig, role: Role) -> Result<Box<dyn Driver>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.script.driver(role))
    }
}

/// A connection over a fresh script.
pub fn connection(config: ConnectionConfig) -> (Connection, Script) {
    let script = Script::new();
    let connection = Connection::new("test", config, script.driver(Role::Write), None).unwrap();
    (connection, script)
}

/// A SQLite connection over a fresh script.
pub fn sqlite() -> (Connection, Script) {
    connection(ConnectionConfig::sqlite(":memory:"))
}
