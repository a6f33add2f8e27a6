//! # quarry-sqlx
//!
//! sqlx-backed drivers for [`quarry_core::Connection`].
//!
//! Each driver owns one database session, so transactions opened through
//! the connection run on the session that executes the statements.
//! Backends are selected with the `sqlite`, `mysql` and `postgres` cargo
//! features (all enabled by default).
//!
//! ```rust,no_run
//! use quarry_core::ConnectionConfig;
//!
//! # async fn run() -> quarry_core::Result<()> {
//! let connection = quarry_sqlx::connect("main", ConnectionConfig::sqlite("app.db")).await?;
//! let users = connection.table("users").where_eq("active", true).get().await?;
//! # Ok(())
//! # }
//! ```

mod connector;
mod value;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use connector::{connect, manager, SqlxConnector};
