//! Batch-tracked schema migrations for quarry.
//!
//! Migrations are Rust types implementing [`Migration`], registered in a
//! [`MigrationRegistry`] under the class name derived from their file name.
//! The [`Migrator`] discovers migration files in a directory, runs the
//! pending ones as a new batch, and records them in the repository table
//! so that `rollback` can revert the latest batch in reverse order.
//!
//! # CLI Usage
//!
//! ```bash
//! # Create the repository table
//! quarry migrations:install
//!
//! # Write a migration stub
//! quarry make:migration create_users_table --create users
//!
//! # Apply pending migrations, or print their SQL
//! quarry migrations:run
//! quarry migrations:run --pretend
//!
//! # Revert the last batch, everything, or everything then re-run
//! quarry migrations:rollback
//! quarry migrations:reset
//! quarry migrations:refresh
//!
//! quarry migrations:status
//! ```

pub mod cli;
pub mod creator;
pub mod error;
pub mod files;
pub mod migration;
pub mod migrator;
pub mod repository;

pub use creator::{MigrationCreator, Stub};
pub use error::{MigrateError, Result};
pub use migration::{class_name, Migration, MigrationRegistry};
pub use migrator::{MigrationStatus, Migrator};
pub use repository::{MigrationRecord, MigrationRepository, DEFAULT_TABLE};
