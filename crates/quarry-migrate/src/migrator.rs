//! Applies and reverts migrations in batches.

use std::path::Path;
use std::sync::Arc;

use quarry_core::{Connection, DatabaseManager, LoggedQuery};
use tracing::info;

use crate::error::Result;
use crate::files;
use crate::migration::{class_name, Migration, MigrationRegistry};
use crate::repository::{MigrationRecord, MigrationRepository};

/// Whether a discovered migration has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration identifier.
    pub migration: String,
    /// `true` once applied.
    pub ran: bool,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Up,
    Down,
}

/// Runs migrations from a directory against the repository.
///
/// Each operation replaces the notes of the previous one; read them with
/// [`Migrator::notes`].
#[derive(Debug)]
pub struct Migrator {
    repository: MigrationRepository,
    registry: MigrationRegistry,
    manager: Arc<DatabaseManager>,
    connection: Option<String>,
    notes: Vec<String>,
}

impl Migrator {
    /// Creates a migrator.
    #[must_use]
    pub fn new(
        repository: MigrationRepository,
        registry: MigrationRegistry,
        manager: Arc<DatabaseManager>,
    ) -> Self {
        Self {
            repository,
            registry,
            manager,
            connection: None,
            notes: Vec::new(),
        }
    }

    /// Targets connection `name` (the default one for `None`) for both the
    /// repository and migrations that do not name their own connection.
    pub fn set_connection(&mut self, name: Option<String>) {
        self.repository.set_source(name.clone());
        self.connection = name;
    }

    /// The repository.
    #[must_use]
    pub const fn repository(&self) -> &MigrationRepository {
        &self.repository
    }

    /// The registry migrations are resolved from.
    #[must_use]
    pub const fn registry(&self) -> &MigrationRegistry {
        &self.registry
    }

    /// Notes of the last operation.
    #[must_use]
    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    /// Returns `true` when the repository table exists.
    ///
    /// # Errors
    ///
    /// Returns query failures.
    pub async fn repository_exists(&self) -> Result<bool> {
        self.repository.repository_exists().await
    }

    /// Runs every pending migration in `path` as one new batch and returns
    /// how many ran. In pretend mode the statements are collected into the
    /// notes instead, nothing is logged and the count is 0.
    ///
    /// # Errors
    ///
    /// Returns discovery, resolution and query failures. Migrations applied
    /// before the failure stay logged.
    pub async fn run(&mut self, path: &Path, pretend: bool) -> Result<usize> {
        self.notes.clear();
        let files = files::discover(path)?;
        let ran = self.repository.get_ran().await?;
        let pending: Vec<String> = files.into_iter().filter(|f| !ran.contains(f)).collect();
        if pending.is_empty() {
            self.note("Nothing to migrate.");
            return Ok(0);
        }

        let batch = self.repository.get_next_batch_number().await?;
        for identifier in &pending {
            self.run_up(identifier, batch, pretend).await?;
        }
        Ok(if pretend { 0 } else { pending.len() })
    }

    async fn run_up(&mut self, identifier: &str, batch: i64, pretend: bool) -> Result<()> {
        let migration = self.registry.resolve(identifier)?;
        if pretend {
            return self.pretend_to_run(identifier, migration, Direction::Up).await;
        }
        self.apply(migration, Direction::Up).await?;
        self.repository.log(identifier, batch).await?;
        info!(migration = identifier, batch, "Migrated");
        self.note(format!("Migrated: {identifier}"));
        Ok(())
    }

    /// Reverts the latest batch and returns how many migrations were
    /// rolled back (0 in pretend mode).
    ///
    /// # Errors
    ///
    /// Returns resolution and query failures.
    pub async fn rollback(&mut self, pretend: bool) -> Result<usize> {
        self.notes.clear();
        let records = self.repository.get_last().await?;
        if records.is_empty() {
            self.note("Nothing to rollback.");
            return Ok(0);
        }
        for record in &records {
            self.run_down(record, pretend).await?;
        }
        Ok(if pretend { 0 } else { records.len() })
    }

    /// Reverts every applied migration, newest first, and returns how many
    /// were rolled back (0 in pretend mode).
    ///
    /// # Errors
    ///
    /// Returns resolution and query failures.
    pub async fn reset(&mut self, pretend: bool) -> Result<usize> {
        self.notes.clear();
        let records = self.repository.get_all().await?;
        if records.is_empty() {
            self.note("Nothing to rollback.");
            return Ok(0);
        }
        for record in &records {
            self.run_down(record, pretend).await?;
        }
        Ok(if pretend { 0 } else { records.len() })
    }

    /// Resets, then runs every migration in `path`. Returns how many ran;
    /// the notes cover both steps.
    ///
    /// # Errors
    ///
    /// Returns the failure of either step.
    pub async fn refresh(&mut self, path: &Path, pretend: bool) -> Result<usize> {
        self.reset(pretend).await?;
        let notes = std::mem::take(&mut self.notes);
        let ran = self.run(path, pretend).await;
        self.notes.splice(0..0, notes);
        ran
    }

    async fn run_down(&mut self, record: &MigrationRecord, pretend: bool) -> Result<()> {
        let identifier = record.migration.as_str();
        let migration = self.registry.resolve(identifier)?;
        if pretend {
            return self.pretend_to_run(identifier, migration, Direction::Down).await;
        }
        self.apply(migration, Direction::Down).await?;
        self.repository.delete(record).await?;
        info!(migration = identifier, batch = record.batch, "Rolled back");
        self.note(format!("Rolled back: {identifier}"));
        Ok(())
    }

    /// Lists every migration in `path` with whether it ran.
    ///
    /// # Errors
    ///
    /// Returns discovery and query failures.
    pub async fn status(&self, path: &Path) -> Result<Vec<MigrationStatus>> {
        let ran = self.repository.get_ran().await?;
        Ok(files::discover(path)?
            .into_iter()
            .map(|migration| MigrationStatus {
                ran: ran.contains(&migration),
                migration,
            })
            .collect())
    }

    async fn connection_for(&self, migration: &dyn Migration) -> Result<Arc<Connection>> {
        let name = migration.connection().or(self.connection.as_deref());
        Ok(self.manager.connection(name).await?)
    }

    async fn apply(&self, migration: Arc<dyn Migration>, direction: Direction) -> Result<()> {
        let connection = self.connection_for(migration.as_ref()).await?;
        if migration.transactional() {
            connection
                .transaction(move |c| {
                    Box::pin(async move { step(migration.as_ref(), c, direction).await })
                })
                .await?;
        } else {
            step(migration.as_ref(), &connection, direction).await?;
        }
        Ok(())
    }

    async fn pretend_to_run(
        &mut self,
        identifier: &str,
        migration: Arc<dyn Migration>,
        direction: Direction,
    ) -> Result<()> {
        let connection = self.connection_for(migration.as_ref()).await?;
        let queries = connection
            .pretend(move |c| {
                Box::pin(async move { step(migration.as_ref(), c, direction).await })
            })
            .await?;
        let class = class_name(identifier);
        for query in &queries {
            self.note(format!("{class}: {}", describe(query)));
        }
        Ok(())
    }

    fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }
}

async fn step(
    migration: &dyn Migration,
    connection: &Connection,
    direction: Direction,
) -> quarry_core::Result<()> {
    match direction {
        Direction::Up => migration.up(connection).await,
        Direction::Down => migration.down(connection).await,
    }
}

fn describe(query: &LoggedQuery) -> String {
    if query.bindings.is_empty() {
        return query.sql.clone();
    }
    let bindings: Vec<String> = query.bindings.iter().map(ToString::to_string).collect();
    format!("{} [{}]", query.sql, bindings.join(", "))
}
