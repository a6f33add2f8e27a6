//! Migration history tracking.
//!
//! The repository is a table with one row per applied migration and the
//! batch it ran in. Every `migrations:run` that applies something opens a
//! new batch; `migrations:rollback` reverts the latest one.

use std::sync::Arc;

use quarry_core::query::Direction;
use quarry_core::{record, Connection, DatabaseManager, SqlValue};
use tracing::debug;

use crate::error::Result;

/// Default repository table name.
pub const DEFAULT_TABLE: &str = "migrations";

/// A row of the repository table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration identifier.
    pub migration: String,
    /// Batch the migration ran in.
    pub batch: i64,
}

/// Reads and writes the repository table.
#[derive(Debug, Clone)]
pub struct MigrationRepository {
    manager: Arc<DatabaseManager>,
    table: String,
    source: Option<String>,
}

impl MigrationRepository {
    /// Creates a repository stored in `table` on the default connection.
    #[must_use]
    pub fn new(manager: Arc<DatabaseManager>, table: impl Into<String>) -> Self {
        Self {
            manager,
            table: table.into(),
            source: None,
        }
    }

    /// Repository table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Connection the repository lives on; `None` for the default one.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Selects the connection the repository lives on.
    pub fn set_source(&mut self, name: Option<String>) {
        self.source = name;
    }

    /// Opens the repository's connection.
    ///
    /// # Errors
    ///
    /// Returns configuration and connection failures.
    pub async fn connection(&self) -> Result<Arc<Connection>> {
        Ok(self.manager.connection(self.source.as_deref()).await?)
    }

    /// Identifiers of every applied migration, in identifier order.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn get_ran(&self) -> Result<Vec<String>> {
        let connection = self.connection().await?;
        let values = connection
            .table(&self.table)
            .order_by("migration", Direction::Asc)
            .lists("migration")
            .await?;
        Ok(values
            .into_iter()
            .filter_map(|value| value.as_str().map(String::from))
            .collect())
    }

    /// Every record, newest identifier first.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn get_all(&self) -> Result<Vec<MigrationRecord>> {
        let connection = self.connection().await?;
        let rows = connection
            .table(&self.table)
            .order_by("migration", Direction::Desc)
            .get()
            .await?;
        Ok(rows.iter().filter_map(to_record).collect())
    }

    /// Records of the latest batch, newest identifier first.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn get_last(&self) -> Result<Vec<MigrationRecord>> {
        let batch = self.get_last_batch_number().await?;
        let connection = self.connection().await?;
        let rows = connection
            .table(&self.table)
            .where_eq("batch", batch)
            .order_by("migration", Direction::Desc)
            .get()
            .await?;
        Ok(rows.iter().filter_map(to_record).collect())
    }

    /// Records `migration` as applied in `batch`.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn log(&self, migration: &str, batch: i64) -> Result<()> {
        let connection = self.connection().await?;
        connection
            .table(&self.table)
            .insert(record! { "migration" => migration, "batch" => batch })
            .await?;
        debug!(migration, batch, "Logged migration");
        Ok(())
    }

    /// Removes the record of a reverted migration.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn delete(&self, record: &MigrationRecord) -> Result<()> {
        let connection = self.connection().await?;
        connection
            .table(&self.table)
            .where_eq("migration", record.migration.as_str())
            .delete()
            .await?;
        Ok(())
    }

    /// The batch number the next run uses.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn get_next_batch_number(&self) -> Result<i64> {
        Ok(self.get_last_batch_number().await? + 1)
    }

    /// The highest batch number, 0 when nothing ran.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn get_last_batch_number(&self) -> Result<i64> {
        let connection = self.connection().await?;
        let max = connection.table(&self.table).max("batch").await?;
        Ok(max.as_ref().and_then(SqlValue::as_i64).unwrap_or(0))
    }

    /// Creates the repository table.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn create_repository(&self) -> Result<()> {
        let connection = self.connection().await?;
        connection
            .schema()
            .create(&self.table, |table| {
                table.string("migration");
                table.integer("batch");
            })
            .await?;
        Ok(())
    }

    /// Returns `true` when the repository table exists.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn repository_exists(&self) -> Result<bool> {
        let connection = self.connection().await?;
        Ok(connection.schema().has_table(&self.table).await?)
    }
}

fn to_record(row: &quarry_core::Row) -> Option<MigrationRecord> {
    Some(MigrationRecord {
        migration: row.get("migration")?.as_str()?.to_string(),
        batch: row.get("batch").and_then(SqlValue::as_i64).unwrap_or(0),
    })
}
