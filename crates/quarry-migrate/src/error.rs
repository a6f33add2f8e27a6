//! Error types for the migration system.

use std::path::PathBuf;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Database error raised while running a migration or the repository.
    #[error(transparent)]
    Database(#[from] quarry_core::Error),

    /// A migration file has no registered migration class.
    #[error("Migration '{identifier}' cannot be resolved: no migration registered as '{class}'")]
    Resolution {
        /// The migration identifier (file name without extension).
        identifier: String,
        /// The class name inferred from the identifier.
        class: String,
    },

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// A migration with the same class already exists.
    #[error("Migration already exists: {0}")]
    MigrationExists(PathBuf),

    /// Migration names must be snake_case identifiers.
    #[error("Invalid migration name '{0}': use lowercase letters, digits and underscores")]
    InvalidName(String),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
