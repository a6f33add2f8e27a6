//! SQLite schema grammar.
//!
//! SQLite cannot alter or drop most column properties in place. Dropping
//! or changing columns rebuilds the table through a temporary copy, using
//! the column list read from `PRAGMA table_info`.

use tracing::warn;

use crate::error::{Error, Result};
use crate::grammar::{Grammar, GrammarConfig, ParameterStyle};
use crate::schema::blueprint::{Blueprint, Command, ForeignKey, IndexCommand};
use crate::schema::column::{ColumnDefinition, ColumnType};
use crate::value::SqlValue;

use super::{ColumnInfo, Modifier, SchemaContext, SchemaGrammar};

const MODIFIERS: &[Modifier] = &[Modifier::Nullable, Modifier::Default, Modifier::Increment];

/// SQLite schema grammar.
#[derive(Debug, Clone, Default)]
pub struct SqliteSchemaGrammar {
    config: GrammarConfig,
}

impl SqliteSchemaGrammar {
    /// Creates the grammar.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the table prefix.
    #[must_use]
    pub fn with_table_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.table_prefix = prefix.into();
        self
    }

    /// Sets the parameter marker style.
    #[must_use]
    pub const fn with_parameter_style(mut self, style: ParameterStyle) -> Self {
        self.config.parameter_style = style;
        self
    }

    fn temp_table(&self, blueprint: &Blueprint) -> String {
        self.wrap_value(&format!("__temp__{}{}", self.table_prefix(), blueprint.table()))
    }

    fn existing_definition(&self, info: &ColumnInfo) -> String {
        let mut sql = self.wrap_name(&info.name);
        if !info.type_name.is_empty() {
            sql.push(' ');
            sql.push_str(&info.type_name);
        }
        if info.not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &info.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    /// Copies the table aside, recreates it from `definitions` and copies
    /// the `kept` columns back.
    fn rebuild(
        &self,
        blueprint: &Blueprint,
        definitions: Vec<String>,
        kept: &[String],
        context: &SchemaContext,
    ) -> Vec<String> {
        let table = self.table(blueprint);
        let temp = self.temp_table(blueprint);
        let columns = self.columnize_names(kept);
        let statements = vec![
            format!("CREATE TEMPORARY TABLE {temp} AS SELECT {columns} FROM {table}"),
            format!("DROP TABLE {table}"),
            format!("CREATE TABLE {table} ({})", definitions.join(", ")),
            format!("INSERT INTO {table} ({columns}) SELECT {columns} FROM {temp}"),
            format!("DROP TABLE {temp}"),
        ];
        with_foreign_keys_off(statements, context)
    }

    fn primary_key_clause(&self, columns: &[&ColumnInfo]) -> Option<String> {
        let keys: Vec<String> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        (!keys.is_empty()).then(|| format!("PRIMARY KEY ({})", self.columnize_names(&keys)))
    }
}

/// Brackets `statements` with `PRAGMA foreign_keys` OFF/ON when enforcement
/// is on.
fn with_foreign_keys_off(mut statements: Vec<String>, context: &SchemaContext) -> Vec<String> {
    if context.foreign_keys {
        statements.insert(0, String::from("PRAGMA foreign_keys = OFF"));
        statements.push(String::from("PRAGMA foreign_keys = ON"));
    }
    statements
}

impl Grammar for SqliteSchemaGrammar {
    fn config(&self) -> &GrammarConfig {
        &self.config
    }
}

impl SchemaGrammar for SqliteSchemaGrammar {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn compile_create(&self, blueprint: &Blueprint) -> String {
        let mut parts = self.added_column_definitions(blueprint);
        for command in blueprint.commands() {
            match command {
                Command::Primary(index) => parts.push(format!(
                    "PRIMARY KEY ({})",
                    self.columnize_names(&index.columns)
                )),
                Command::Foreign(key) => parts.push(self.foreign_key_clause(key)),
                _ => {}
            }
        }
        format!("CREATE TABLE {} ({})", self.table(blueprint), parts.join(", "))
    }

    fn compile_add(&self, blueprint: &Blueprint) -> Vec<String> {
        let table = self.table(blueprint);
        self.added_column_definitions(blueprint)
            .into_iter()
            .map(|c| format!("ALTER TABLE {table} ADD COLUMN {c}"))
            .collect()
    }

    fn compile_change(&self, blueprint: &Blueprint, context: &SchemaContext) -> Result<Vec<String>> {
        if context.columns.is_empty() {
            return Err(Error::invalid(format!(
                "cannot change columns of {}: table has no columns",
                blueprint.table()
            )));
        }
        let changed: Vec<&ColumnDefinition> = blueprint.changed_columns().collect();
        let mut definitions = Vec::new();
        let mut kept = Vec::new();
        for info in &context.columns {
            kept.push(info.name.clone());
            match changed.iter().find(|c| c.name == info.name) {
                Some(column) => definitions.push(self.column_definition(blueprint, column)),
                None => definitions.push(self.existing_definition(info)),
            }
        }
        let incrementing = changed.iter().any(|c| c.auto_increment && c.is_integer());
        if !incrementing {
            let columns: Vec<&ColumnInfo> = context.columns.iter().collect();
            definitions.extend(self.primary_key_clause(&columns));
        }
        Ok(self.rebuild(blueprint, definitions, &kept, context))
    }

    fn compile_drop_column(
        &self,
        blueprint: &Blueprint,
        columns: &[String],
        context: &SchemaContext,
    ) -> Result<Vec<String>> {
        if context.columns.is_empty() {
            let table = self.table(blueprint);
            return Ok(columns
                .iter()
                .map(|c| format!("ALTER TABLE {table} DROP COLUMN {}", self.wrap_name(c)))
                .collect());
        }
        let remaining: Vec<&ColumnInfo> = context
            .columns
            .iter()
            .filter(|c| !columns.contains(&c.name))
            .collect();
        let kept: Vec<String> = remaining.iter().map(|c| c.name.clone()).collect();
        let mut definitions: Vec<String> = remaining
            .iter()
            .map(|c| self.existing_definition(c))
            .collect();
        definitions.extend(self.primary_key_clause(&remaining));
        Ok(self.rebuild(blueprint, definitions, &kept, context))
    }

    fn compile_rename_column(
        &self,
        blueprint: &Blueprint,
        from: &str,
        to: &str,
        context: &SchemaContext,
    ) -> Vec<String> {
        let statement = format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.table(blueprint),
            self.wrap_name(from),
            self.wrap_name(to)
        );
        with_foreign_keys_off(vec![statement], context)
    }

    fn compile_primary(&self, blueprint: &Blueprint, _index: &IndexCommand) -> Vec<String> {
        if !blueprint.creating() {
            warn!(
                table = blueprint.table(),
                "SQLite cannot add a primary key to an existing table"
            );
        }
        Vec::new()
    }

    fn compile_unique(&self, blueprint: &Blueprint, index: &IndexCommand) -> String {
        format!(
            "CREATE UNIQUE INDEX {} ON {} ({})",
            index.index,
            self.table(blueprint),
            self.columnize_names(&index.columns)
        )
    }

    fn compile_foreign(&self, blueprint: &Blueprint, key: &ForeignKey) -> Vec<String> {
        if !blueprint.creating() {
            warn!(
                table = blueprint.table(),
                index = key.index.as_str(),
                "SQLite cannot add a foreign key to an existing table"
            );
        }
        Vec::new()
    }

    fn compile_drop_primary(&self, blueprint: &Blueprint, _index: &str) -> Result<String> {
        Err(Error::invalid(format!(
            "SQLite cannot drop the primary key of {}",
            blueprint.table()
        )))
    }

    fn compile_drop_unique(&self, _blueprint: &Blueprint, index: &str) -> String {
        format!("DROP INDEX {index}")
    }

    fn compile_drop_foreign(&self, blueprint: &Blueprint, index: &str) -> Result<String> {
        Err(Error::invalid(format!(
            "SQLite cannot drop foreign key {index} of {}",
            blueprint.table()
        )))
    }

    fn compile_table_exists(&self, table: &str) -> (String, Vec<SqlValue>) {
        (
            format!(
                "SELECT * FROM sqlite_master WHERE type = 'table' AND name = {}",
                self.parameter_marker()
            ),
            vec![SqlValue::Text(format!("{}{table}", self.table_prefix()))],
        )
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<SqlValue>) {
        (format!("PRAGMA table_info({})", self.wrap_table_name(table)), Vec::new())
    }

    fn column_listing_key(&self) -> &'static str {
        "name"
    }

    fn case_insensitive_columns(&self) -> bool {
        false
    }

    fn requires_introspection(&self, blueprint: &Blueprint) -> bool {
        blueprint.commands().iter().any(|c| {
            matches!(
                c,
                Command::Change | Command::DropColumn { .. } | Command::RenameColumn { .. }
            )
        })
    }

    fn compile_foreign_keys_enabled(&self) -> Option<&'static str> {
        Some("PRAGMA foreign_keys")
    }

    fn compile_column_info(&self, table: &str) -> Option<String> {
        Some(format!("PRAGMA table_info({})", self.wrap_table_name(table)))
    }

    fn type_sql(&self, column: &ColumnDefinition) -> String {
        let sql = match column.kind {
            ColumnType::Char | ColumnType::String | ColumnType::Enum => "VARCHAR",
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText | ColumnType::Json => {
                "TEXT"
            }
            ColumnType::Integer
            | ColumnType::BigInteger
            | ColumnType::MediumInteger
            | ColumnType::SmallInteger
            | ColumnType::TinyInteger => "INTEGER",
            ColumnType::Float | ColumnType::Double => "FLOAT",
            ColumnType::Decimal => "NUMERIC",
            ColumnType::Boolean => "TINYINT",
            ColumnType::Date => "DATE",
            ColumnType::DateTime => "DATETIME",
            ColumnType::Time => "TIME",
            ColumnType::Timestamp if column.use_current => "DATETIME DEFAULT CURRENT_TIMESTAMP",
            ColumnType::Timestamp => "DATETIME",
            ColumnType::Binary => "BLOB",
        };
        sql.to_string()
    }

    fn modifiers(&self) -> &'static [Modifier] {
        MODIFIERS
    }

    fn modifier_sql(&self, modifier: Modifier, _blueprint: &Blueprint, column: &ColumnDefinition) -> String {
        match modifier {
            Modifier::Nullable if column.nullable => String::from(" NULL"),
            Modifier::Nullable => String::from(" NOT NULL"),
            Modifier::Default => column
                .default
                .as_ref()
                .map(|d| format!(" DEFAULT {}", d.to_sql()))
                .unwrap_or_default(),
            Modifier::Increment if column.auto_increment && column.is_integer() => {
                String::from(" PRIMARY KEY AUTOINCREMENT")
            }
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::ForeignKeyAction;

    fn compile(blueprint: &mut Blueprint, context: &SchemaContext) -> Vec<String> {
        blueprint
            .to_sql(&SqliteSchemaGrammar::new(), context)
            .unwrap()
    }

    #[test]
    fn test_create_embeds_foreign_keys() {
        let mut table = Blueprint::new("posts");
        table.create();
        table.increments("id");
        table.unsigned_integer("user_id");
        table.string("title").unique();
        let _ = table
            .foreign(["user_id"], None)
            .references(["id"])
            .on("users")
            .on_delete(ForeignKeyAction::Cascade);

        let sql = compile(&mut table, &SchemaContext::default());
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE \"posts\" (\"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, \
                 \"user_id\" INTEGER NOT NULL, \"title\" VARCHAR NOT NULL, \
                 FOREIGN KEY (\"user_id\") REFERENCES \"users\" (\"id\") ON DELETE CASCADE)",
                "CREATE UNIQUE INDEX posts_title_unique ON \"posts\" (\"title\")",
            ]
        );
    }

    #[test]
    fn test_add_emits_one_statement_per_column() {
        let mut table = Blueprint::new("users");
        table.string("name").nullable();
        table.boolean("active").default(true);
        let sql = compile(&mut table, &SchemaContext::default());
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE \"users\" ADD COLUMN \"name\" VARCHAR NULL",
                "ALTER TABLE \"users\" ADD COLUMN \"active\" TINYINT NOT NULL DEFAULT '1'",
            ]
        );
    }

    #[test]
    fn test_rename_column_brackets_foreign_keys() {
        let mut table = Blueprint::new("users");
        table.rename_column("name", "full_name");
        let context = SchemaContext {
            foreign_keys: true,
            columns: Vec::new(),
        };
        assert_eq!(
            compile(&mut table, &context),
            vec![
                "PRAGMA foreign_keys = OFF",
                "ALTER TABLE \"users\" RENAME COLUMN \"name\" TO \"full_name\"",
                "PRAGMA foreign_keys = ON",
            ]
        );

        let mut table = Blueprint::new("users");
        table.rename_column("name", "full_name");
        assert_eq!(compile(&mut table, &SchemaContext::default()).len(), 1);
    }

    fn users_columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo {
                name: "id".into(),
                type_name: "INTEGER".into(),
                not_null: true,
                default: None,
                primary_key: true,
            },
            ColumnInfo {
                name: "name".into(),
                type_name: "VARCHAR".into(),
                not_null: true,
                default: None,
                primary_key: false,
            },
            ColumnInfo {
                name: "votes".into(),
                type_name: "INTEGER".into(),
                not_null: false,
                default: Some("0".into()),
                primary_key: false,
            },
        ]
    }

    #[test]
    fn test_drop_column_rebuilds_table() {
        let mut table = Blueprint::new("users");
        table.drop_column(["votes"]);
        let context = SchemaContext {
            foreign_keys: false,
            columns: users_columns(),
        };
        assert_eq!(
            compile(&mut table, &context),
            vec![
                "CREATE TEMPORARY TABLE \"__temp__users\" AS SELECT \"id\", \"name\" FROM \"users\"",
                "DROP TABLE \"users\"",
                "CREATE TABLE \"users\" (\"id\" INTEGER NOT NULL, \"name\" VARCHAR NOT NULL, \
                 PRIMARY KEY (\"id\"))",
                "INSERT INTO \"users\" (\"id\", \"name\") SELECT \"id\", \"name\" FROM \"__temp__users\"",
                "DROP TABLE \"__temp__users\"",
            ]
        );
    }

    #[test]
    fn test_drop_column_without_introspection_is_native() {
        let mut table = Blueprint::new("users");
        table.drop_column(["votes"]);
        assert_eq!(
            compile(&mut table, &SchemaContext::default()),
            vec!["ALTER TABLE \"users\" DROP COLUMN \"votes\""]
        );
    }

    #[test]
    fn test_change_replaces_definition() {
        let mut table = Blueprint::new("users");
        table.string("name").nullable().change();
        let context = SchemaContext {
            foreign_keys: true,
            columns: users_columns(),
        };
        let sql = compile(&mut table, &context);
        assert_eq!(sql.first().map(String::as_str), Some("PRAGMA foreign_keys = OFF"));
        assert_eq!(
            sql[3],
            "CREATE TABLE \"users\" (\"id\" INTEGER NOT NULL, \"name\" VARCHAR NULL, \
             \"votes\" INTEGER DEFAULT 0, PRIMARY KEY (\"id\"))"
        );
        assert_eq!(sql.last().map(String::as_str), Some("PRAGMA foreign_keys = ON"));

        let mut table = Blueprint::new("users");
        table.string("name").change();
        assert!(table
            .to_sql(&SqliteSchemaGrammar::new(), &SchemaContext::default())
            .is_err());
    }

    #[test]
    fn test_drop_foreign_is_unsupported() {
        let mut table = Blueprint::new("posts");
        table.drop_foreign("posts_user_id_foreign");
        assert!(table
            .to_sql(&SqliteSchemaGrammar::new(), &SchemaContext::default())
            .is_err());
    }

    #[test]
    fn test_introspection_queries() {
        let grammar = SqliteSchemaGrammar::new().with_table_prefix("app_");
        let (sql, bindings) = grammar.compile_table_exists("users");
        assert_eq!(
            sql,
            "SELECT * FROM sqlite_master WHERE type = 'table' AND name = ?"
        );
        assert_eq!(bindings, vec![SqlValue::Text("app_users".into())]);
        assert_eq!(
            grammar.compile_column_listing("users").0,
            "PRAGMA table_info(\"app_users\")"
        );
    }

    #[test]
    fn test_timestamp_use_current() {
        let mut table = Blueprint::new("logs");
        table.create();
        table.timestamps_use_current();
        let sql = compile(&mut table, &SchemaContext::default());
        assert_eq!(
            sql[0],
            "CREATE TABLE \"logs\" (\"created_at\" DATETIME DEFAULT CURRENT_TIMESTAMP NOT NULL, \
             \"updated_at\" DATETIME DEFAULT CURRENT_TIMESTAMP NOT NULL)"
        );
    }
}
