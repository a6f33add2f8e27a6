//! # quarry-core
//!
//! A dialect-aware SQL toolkit for SQLite, MySQL and PostgreSQL.
//!
//! This crate provides:
//! - A fluent query builder that compiles to parameterized SQL with its
//!   bindings in marker order
//! - Query grammars for each dialect (quoting, markers, limits, locks,
//!   inserts, updates and deletes with joins, truncation)
//! - Table blueprints and schema grammars emitting dialect DDL
//! - A connection facade with nested transactions, a query log, pretend
//!   mode and reconnection on lost connections
//!
//! Database drivers plug in through [`connection::Driver`] and
//! [`connection::Connector`].
//!
//! ## Building queries
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry_core::query::{Builder, Direction, MySqlGrammar};
//!
//! let (sql, bindings) = Builder::new(Arc::new(MySqlGrammar::new()))
//!     .from("users")
//!     .select(["id", "name"])
//!     .where_("votes", ">", 100)
//!     .order_by("name", Direction::Asc)
//!     .limit(10)
//!     .to_sql_with_bindings()
//!     .unwrap();
//!
//! assert_eq!(
//!     sql,
//!     "SELECT `id`, `name` FROM `users` WHERE `votes` > ? ORDER BY `name` ASC LIMIT 10"
//! );
//! assert_eq!(bindings.len(), 1);
//! ```

mod error;
mod expression;
pub mod grammar;
pub mod manager;
mod row;
mod value;

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{Connection, ConnectionConfig, DatabaseConfig, LoggedQuery};
pub use error::{DriverError, Error, Result};
pub use expression::{raw, Expression, Ident, Operand, Record};
pub use manager::DatabaseManager;
pub use query::Builder;
pub use row::Row;
pub use value::{SqlValue, ToSqlValue};
