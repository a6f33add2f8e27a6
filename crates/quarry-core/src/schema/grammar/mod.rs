//! Dialect-specific DDL generation.
//!
//! A [`SchemaGrammar`] compiles a prepared [`Blueprint`] into the ordered
//! list of statements that applies it. Commands compile one at a time, in
//! blueprint order; a column compiles to its wrapped name, its native type
//! and the dialect's modifiers in the dialect's fixed order.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlSchemaGrammar;
pub use postgres::PostgresSchemaGrammar;
pub use sqlite::SqliteSchemaGrammar;

use crate::error::Result;
use crate::grammar::Grammar;
use crate::row::Row;
use crate::value::SqlValue;

use super::blueprint::{Blueprint, Command, ForeignKey, IndexCommand};
use super::column::ColumnDefinition;

/// Column modifiers, in the order a dialect applies them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    /// `UNSIGNED`.
    Unsigned,
    /// `CHARACTER SET`.
    Charset,
    /// `COLLATE`.
    Collate,
    /// `NULL` / `NOT NULL`.
    Nullable,
    /// `DEFAULT`.
    Default,
    /// Auto-increment primary key.
    Increment,
    /// `COMMENT`.
    Comment,
    /// `AFTER`.
    After,
}

/// A column as reported by the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name.
    pub name: String,
    /// Declared type.
    pub type_name: String,
    /// Declared NOT NULL.
    pub not_null: bool,
    /// Default expression, as SQL.
    pub default: Option<String>,
    /// Part of the primary key.
    pub primary_key: bool,
}

impl ColumnInfo {
    /// Reads one row of SQLite's `PRAGMA table_info`.
    #[must_use]
    pub fn from_table_info(row: &Row) -> Option<Self> {
        let name = row.get("name")?.as_str()?.to_string();
        let type_name = row
            .get("type")
            .and_then(SqlValue::as_str)
            .unwrap_or_default()
            .to_string();
        let flag = |key: &str| row.get(key).and_then(SqlValue::as_i64).unwrap_or(0) != 0;
        let default = row
            .get("dflt_value")
            .filter(|v| !v.is_null())
            .map(|v| v.as_str().map_or_else(|| v.to_string(), String::from));
        Some(Self {
            name,
            type_name,
            not_null: flag("notnull"),
            default,
            primary_key: flag("pk"),
        })
    }
}

/// Database state some grammars need to compile a blueprint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaContext {
    /// Foreign key enforcement is currently on.
    pub foreign_keys: bool,
    /// Current columns of the blueprint's table.
    pub columns: Vec<ColumnInfo>,
}

/// Compiles blueprints into DDL.
pub trait SchemaGrammar: Grammar {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Compiles every command of a prepared blueprint.
    ///
    /// # Errors
    ///
    /// Returns an error when the dialect cannot express a command.
    fn compile(&self, blueprint: &Blueprint, context: &SchemaContext) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for command in blueprint.commands() {
            statements.extend(self.compile_command(blueprint, command, context)?);
        }
        Ok(statements)
    }

    /// Compiles one command.
    ///
    /// # Errors
    ///
    /// Returns an error when the dialect cannot express the command.
    fn compile_command(
        &self,
        blueprint: &Blueprint,
        command: &Command,
        context: &SchemaContext,
    ) -> Result<Vec<String>> {
        match command {
            Command::Create => Ok(vec![self.compile_create(blueprint)]),
            Command::Add => Ok(self.compile_add(blueprint)),
            Command::Change => self.compile_change(blueprint, context),
            Command::Drop => Ok(vec![format!("DROP TABLE {}", self.table(blueprint))]),
            Command::DropIfExists => Ok(vec![format!(
                "DROP TABLE IF EXISTS {}",
                self.table(blueprint)
            )]),
            Command::Rename { to } => Ok(vec![self.compile_rename(blueprint, to)]),
            Command::DropColumn { columns } => self.compile_drop_column(blueprint, columns, context),
            Command::RenameColumn { from, to } => {
                Ok(self.compile_rename_column(blueprint, from, to, context))
            }
            Command::Primary(index) => Ok(self.compile_primary(blueprint, index)),
            Command::Unique(index) => Ok(vec![self.compile_unique(blueprint, index)]),
            Command::Index(index) => Ok(vec![self.compile_index(blueprint, index)]),
            Command::Foreign(key) => Ok(self.compile_foreign(blueprint, key)),
            Command::DropPrimary { index } => self.compile_drop_primary(blueprint, index).map(|s| vec![s]),
            Command::DropUnique { index } => Ok(vec![self.compile_drop_unique(blueprint, index)]),
            Command::DropIndex { index } => Ok(vec![self.compile_drop_index(blueprint, index)]),
            Command::DropForeign { index } => self.compile_drop_foreign(blueprint, index).map(|s| vec![s]),
        }
    }

    /// Wraps the blueprint's table.
    fn table(&self, blueprint: &Blueprint) -> String {
        self.wrap_table_name(blueprint.table())
    }

    /// `CREATE TABLE`.
    fn compile_create(&self, blueprint: &Blueprint) -> String {
        format!(
            "CREATE TABLE {} ({})",
            self.table(blueprint),
            self.added_column_definitions(blueprint).join(", ")
        )
    }

    /// Adds the blueprint's new columns.
    fn compile_add(&self, blueprint: &Blueprint) -> Vec<String> {
        let columns = self
            .added_column_definitions(blueprint)
            .into_iter()
            .map(|c| format!("ADD COLUMN {c}"))
            .collect::<Vec<_>>();
        vec![format!(
            "ALTER TABLE {} {}",
            self.table(blueprint),
            columns.join(", ")
        )]
    }

    /// Changes existing columns.
    ///
    /// # Errors
    ///
    /// Returns an error when the dialect cannot change the columns.
    fn compile_change(&self, blueprint: &Blueprint, context: &SchemaContext) -> Result<Vec<String>>;

    /// Renames the table.
    fn compile_rename(&self, blueprint: &Blueprint, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.table(blueprint),
            self.wrap_table_name(to)
        )
    }

    /// Drops columns.
    ///
    /// # Errors
    ///
    /// Returns an error when the dialect cannot drop the columns.
    fn compile_drop_column(
        &self,
        blueprint: &Blueprint,
        columns: &[String],
        _context: &SchemaContext,
    ) -> Result<Vec<String>> {
        let drops = columns
            .iter()
            .map(|c| format!("DROP COLUMN {}", self.wrap_name(c)))
            .collect::<Vec<_>>();
        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.table(blueprint),
            drops.join(", ")
        )])
    }

    /// Renames a column.
    fn compile_rename_column(
        &self,
        blueprint: &Blueprint,
        from: &str,
        to: &str,
        _context: &SchemaContext,
    ) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.table(blueprint),
            self.wrap_name(from),
            self.wrap_name(to)
        )]
    }

    /// Adds a primary key.
    fn compile_primary(&self, blueprint: &Blueprint, index: &IndexCommand) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD PRIMARY KEY ({})",
            self.table(blueprint),
            self.columnize_names(&index.columns)
        )]
    }

    /// Adds a unique index.
    fn compile_unique(&self, blueprint: &Blueprint, index: &IndexCommand) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            self.table(blueprint),
            index.index,
            self.columnize_names(&index.columns)
        )
    }

    /// Adds a plain index.
    fn compile_index(&self, blueprint: &Blueprint, index: &IndexCommand) -> String {
        format!(
            "CREATE INDEX {} ON {} ({})",
            index.index,
            self.table(blueprint),
            self.columnize_names(&index.columns)
        )
    }

    /// Adds a foreign key.
    fn compile_foreign(&self, blueprint: &Blueprint, key: &ForeignKey) -> Vec<String> {
        vec![format!(
            "ALTER TABLE {} ADD CONSTRAINT {} {}",
            self.table(blueprint),
            key.index,
            self.foreign_key_clause(key)
        )]
    }

    /// `FOREIGN KEY (..) REFERENCES t (..) [ON DELETE ..] [ON UPDATE ..]`.
    fn foreign_key_clause(&self, key: &ForeignKey) -> String {
        let mut sql = format!(
            "FOREIGN KEY ({}) REFERENCES {} ({})",
            self.columnize_names(&key.columns),
            self.wrap_table_name(&key.on),
            self.columnize_names(&key.references)
        );
        if let Some(action) = key.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        if let Some(action) = key.on_update {
            sql.push_str(" ON UPDATE ");
            sql.push_str(action.as_sql());
        }
        sql
    }

    /// Drops the primary key.
    ///
    /// # Errors
    ///
    /// Returns an error when the dialect cannot drop primary keys.
    fn compile_drop_primary(&self, blueprint: &Blueprint, index: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {index}",
            self.table(blueprint)
        ))
    }

    /// Drops a unique index.
    fn compile_drop_unique(&self, blueprint: &Blueprint, index: &str) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {index}",
            self.table(blueprint)
        )
    }

    /// Drops a plain index.
    fn compile_drop_index(&self, _blueprint: &Blueprint, index: &str) -> String {
        format!("DROP INDEX {index}")
    }

    /// Drops a foreign key.
    ///
    /// # Errors
    ///
    /// Returns an error when the dialect cannot drop foreign keys.
    fn compile_drop_foreign(&self, blueprint: &Blueprint, index: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP CONSTRAINT {index}",
            self.table(blueprint)
        ))
    }

    /// Query (with bindings) returning a row when `table` exists.
    fn compile_table_exists(&self, table: &str) -> (String, Vec<SqlValue>);

    /// Query (with bindings) listing the columns of `table`.
    fn compile_column_listing(&self, table: &str) -> (String, Vec<SqlValue>);

    /// Result column holding the names from [`Self::compile_column_listing`].
    fn column_listing_key(&self) -> &'static str {
        "column_name"
    }

    /// Whether column names compare case-insensitively.
    fn case_insensitive_columns(&self) -> bool {
        true
    }

    /// Whether compiling `blueprint` needs a [`SchemaContext`] read from
    /// the database first.
    fn requires_introspection(&self, _blueprint: &Blueprint) -> bool {
        false
    }

    /// Query reporting whether foreign keys are enforced.
    fn compile_foreign_keys_enabled(&self) -> Option<&'static str> {
        None
    }

    /// Query describing the columns of `table` for a rebuild.
    fn compile_column_info(&self, _table: &str) -> Option<String> {
        None
    }

    /// Definitions of the columns the blueprint adds.
    fn added_column_definitions(&self, blueprint: &Blueprint) -> Vec<String> {
        blueprint
            .added_columns()
            .map(|c| self.column_definition(blueprint, c))
            .collect()
    }

    /// Wrapped name, native type and modifiers.
    fn column_definition(&self, blueprint: &Blueprint, column: &ColumnDefinition) -> String {
        let mut sql = format!("{} {}", self.wrap_name(&column.name), self.type_sql(column));
        for modifier in self.modifiers() {
            sql.push_str(&self.modifier_sql(*modifier, blueprint, column));
        }
        sql
    }

    /// Native type of a column.
    fn type_sql(&self, column: &ColumnDefinition) -> String;

    /// Modifiers this dialect supports, in emission order.
    fn modifiers(&self) -> &'static [Modifier];

    /// Text of one modifier, with a leading space, or empty.
    fn modifier_sql(&self, modifier: Modifier, _blueprint: &Blueprint, column: &ColumnDefinition) -> String {
        match modifier {
            Modifier::Nullable => {
                if column.nullable {
                    String::from(" NULL")
                } else {
                    String::from(" NOT NULL")
                }
            }
            Modifier::Default => column
                .default
                .as_ref()
                .map(|d| format!(" DEFAULT {}", d.to_sql()))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_info_from_pragma_row() {
        let row = Row::new(
            vec![
                "cid".into(),
                "name".into(),
                "type".into(),
                "notnull".into(),
                "dflt_value".into(),
                "pk".into(),
            ],
            vec![
                SqlValue::Int(0),
                SqlValue::Text("id".into()),
                SqlValue::Text("INTEGER".into()),
                SqlValue::Int(1),
                SqlValue::Null,
                SqlValue::Int(1),
            ],
        );
        let info = ColumnInfo::from_table_info(&row).unwrap();
        assert_eq!(info.name, "id");
        assert!(info.not_null && info.primary_key);
        assert_eq!(info.default, None);
    }
}
