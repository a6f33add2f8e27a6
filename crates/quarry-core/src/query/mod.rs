//! Query builder and query grammars.
//!
//! A [`Builder`] accumulates a [`Query`] plus its [`Bindings`]; a
//! [`QueryGrammar`] compiles the query for one database.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use quarry_core::query::{Builder, SqliteGrammar};
//!
//! let (sql, bindings) = Builder::new(Arc::new(SqliteGrammar::new()))
//!     .from("users")
//!     .where_("age", ">", 18)
//!     .or_where_in("role", ["admin", "owner"])
//!     .to_sql_with_bindings()
//!     .unwrap();
//!
//! assert_eq!(
//!     sql,
//!     r#"SELECT * FROM "users" WHERE "age" > ? OR "role" IN (?, ?)"#
//! );
//! assert_eq!(bindings.len(), 3);
//! ```

pub mod ast;
mod bindings;
mod builder;
pub mod grammar;
mod join;
mod pagination;

pub use ast::{
    Aggregate, Boolean, DatePart, Direction, Join, JoinCondition, JoinTarget, JoinType, Lock,
    Order, Query, Union, Where, WhereKind, Window,
};
pub use bindings::{BindingKind, Bindings};
pub use builder::Builder;
pub use grammar::{MySqlGrammar, PostgresGrammar, QueryGrammar, SqliteGrammar, Statements};
pub use join::JoinClause;
pub use pagination::{LengthAwarePaginator, Paginator};
