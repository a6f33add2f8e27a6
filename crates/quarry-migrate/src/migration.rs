//! The migration trait and the registry that resolves migration files.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::Connection;

use crate::error::{MigrateError, Result};

/// A reversible schema change.
///
/// Each migration file in the migrations directory is backed by one type
/// implementing this trait, registered under the PascalCase name derived
/// from the file name (`2024_01_01_000000_create_users_table.rs` →
/// `CreateUsersTable`).
///
/// ```rust,ignore
/// pub struct CreateUsersTable;
///
/// #[async_trait]
/// impl Migration for CreateUsersTable {
///     async fn up(&self, connection: &Connection) -> quarry_core::Result<()> {
///         connection
///             .schema()
///             .create("users", |table| {
///                 table.increments("id");
///                 table.string("email").unique();
///                 table.timestamps();
///             })
///             .await
///     }
///
///     async fn down(&self, connection: &Connection) -> quarry_core::Result<()> {
///         connection.schema().drop("users").await
///     }
/// }
/// ```
#[async_trait]
pub trait Migration: Send + Sync {
    /// Applies the change.
    async fn up(&self, connection: &Connection) -> quarry_core::Result<()>;

    /// Reverts the change.
    async fn down(&self, connection: &Connection) -> quarry_core::Result<()>;

    /// Connection the migration runs on. `None` uses the migrator's.
    fn connection(&self) -> Option<&str> {
        None
    }

    /// Whether `up` and `down` run inside a transaction.
    fn transactional(&self) -> bool {
        true
    }
}

/// Migrations by class name.
#[derive(Clone, Default)]
pub struct MigrationRegistry {
    migrations: HashMap<String, Arc<dyn Migration>>,
}

impl fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.migrations.keys().collect();
        names.sort();
        f.debug_struct("MigrationRegistry")
            .field("migrations", &names)
            .finish()
    }
}

impl MigrationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `migration` under `class`, replacing any previous one.
    pub fn register(&mut self, class: impl Into<String>, migration: impl Migration + 'static) {
        self.migrations.insert(class.into(), Arc::new(migration));
    }

    /// Builder form of [`Self::register`].
    #[must_use]
    pub fn with(mut self, class: impl Into<String>, migration: impl Migration + 'static) -> Self {
        self.register(class, migration);
        self
    }

    /// Returns the migration registered as `class`.
    #[must_use]
    pub fn get(&self, class: &str) -> Option<Arc<dyn Migration>> {
        self.migrations.get(class).cloned()
    }

    /// Number of registered migrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Resolves the migration behind a file identifier.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Resolution`] when no migration is registered
    /// under the identifier's class name.
    pub fn resolve(&self, identifier: &str) -> Result<Arc<dyn Migration>> {
        let class = class_name(identifier);
        self.get(&class)
            .ok_or_else(|| MigrateError::Resolution {
                identifier: identifier.to_string(),
                class,
            })
    }
}

/// Derives the class name of a migration identifier: leading numeric
/// segments are dropped and the rest is PascalCased.
#[must_use]
pub fn class_name(identifier: &str) -> String {
    identifier
        .split('_')
        .skip_while(|segment| segment.chars().all(|c| c.is_ascii_digit()))
        .filter(|segment| !segment.is_empty())
        .map(|segment| {
            let mut chars = segment.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        })
        .collect()
}
