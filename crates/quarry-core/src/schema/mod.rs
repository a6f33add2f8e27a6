//! Schema blueprints, schema grammars and the schema builder.
//!
//! ```rust
//! use quarry_core::schema::{Blueprint, PostgresSchemaGrammar, SchemaContext};
//!
//! let mut table = Blueprint::new("users");
//! table.create();
//! table.increments("id");
//! table.string("email").unique();
//!
//! let statements = table
//!     .to_sql(&PostgresSchemaGrammar::new(), &SchemaContext::default())
//!     .unwrap();
//! assert_eq!(statements.len(), 2);
//! ```

mod blueprint;
mod builder;
mod column;
pub mod grammar;

pub use blueprint::{Blueprint, Command, ForeignKey, ForeignKeyBuilder, IndexCommand};
pub use builder::SchemaBuilder;
pub use column::{ColumnDefinition, ColumnType, DefaultValue, ForeignKeyAction};
pub use grammar::{
    ColumnInfo, Modifier, MySqlSchemaGrammar, PostgresSchemaGrammar, SchemaContext, SchemaGrammar,
    SqliteSchemaGrammar,
};
