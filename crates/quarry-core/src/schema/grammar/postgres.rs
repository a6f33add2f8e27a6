//! PostgreSQL schema grammar.

use crate::error::Result;
use crate::grammar::{Grammar, GrammarConfig, ParameterStyle};
use crate::schema::blueprint::Blueprint;
use crate::schema::column::{ColumnDefinition, ColumnType};
use crate::value::SqlValue;

use super::{Modifier, SchemaContext, SchemaGrammar};

const MODIFIERS: &[Modifier] = &[Modifier::Increment, Modifier::Nullable, Modifier::Default];

/// PostgreSQL schema grammar.
#[derive(Debug, Clone)]
pub struct PostgresSchemaGrammar {
    config: GrammarConfig,
    schema: Option<String>,
}

impl Default for PostgresSchemaGrammar {
    fn default() -> Self {
        Self {
            config: GrammarConfig::with_style(ParameterStyle::Format),
            schema: None,
        }
    }
}

impl PostgresSchemaGrammar {
    /// Creates the grammar with `%s` markers.
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

    /// Restricts introspection queries to one schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Bare native type for `ALTER COLUMN .. TYPE`: no serial, no default,
    /// no check constraint.
    fn storage_type(&self, column: &ColumnDefinition) -> String {
        match column.kind {
            ColumnType::Enum => String::from("VARCHAR(255)"),
            ColumnType::Timestamp => String::from("TIMESTAMP(6) WITHOUT TIME ZONE"),
            _ if column.auto_increment => {
                let mut plain = column.clone();
                plain.auto_increment = false;
                self.type_sql(&plain)
            }
            _ => self.type_sql(column),
        }
    }

    fn enum_check(&self, column: &ColumnDefinition) -> String {
        let allowed = column
            .allowed
            .iter()
            .map(|v| format!("'{}'", v.replace('\'', "''")))
            .collect::<Vec<_>>();
        format!(
            "CHECK ({} IN ({}))",
            self.wrap_name(&column.name),
            allowed.join(", ")
        )
    }

    fn information_schema(&self, relation: &str, table: &str) -> (String, Vec<SqlValue>) {
        let marker = self.parameter_marker();
        let mut sql = format!("SELECT * FROM information_schema.{relation} WHERE table_name = {marker}");
        let mut bindings = vec![SqlValue::Text(format!("{}{table}", self.table_prefix()))];
        if let Some(schema) = &self.schema {
            sql.push_str(&format!(" AND table_schema = {marker}"));
            bindings.push(SqlValue::Text(schema.clone()));
        }
        (sql, bindings)
    }
}

impl Grammar for PostgresSchemaGrammar {
    fn config(&self) -> &GrammarConfig {
        &self.config
    }
}

impl SchemaGrammar for PostgresSchemaGrammar {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn compile_change(&self, blueprint: &Blueprint, _context: &SchemaContext) -> Result<Vec<String>> {
        let mut changes = Vec::new();
        for column in blueprint.changed_columns() {
            let name = self.wrap_name(&column.name);
            changes.push(format!(
                "ALTER COLUMN {name} TYPE {}",
                self.storage_type(column)
            ));
            if column.nullable {
                changes.push(format!("ALTER COLUMN {name} DROP NOT NULL"));
            } else {
                changes.push(format!("ALTER COLUMN {name} SET NOT NULL"));
            }
            match &column.default {
                Some(default) => {
                    changes.push(format!("ALTER COLUMN {name} SET DEFAULT {}", default.to_sql()));
                }
                None if column.use_current && column.kind == ColumnType::Timestamp => {
                    changes.push(format!(
                        "ALTER COLUMN {name} SET DEFAULT CURRENT_TIMESTAMP(6)"
                    ));
                }
                None => changes.push(format!("ALTER COLUMN {name} DROP DEFAULT")),
            }
            if column.kind == ColumnType::Enum {
                // Matches the name PostgreSQL gives the inline check on create.
                let constraint =
                    blueprint.create_index_name("check", std::slice::from_ref(&column.name));
                changes.push(format!("DROP CONSTRAINT IF EXISTS {constraint}"));
                changes.push(format!(
                    "ADD CONSTRAINT {constraint} {}",
                    self.enum_check(column)
                ));
            }
        }
        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.table(blueprint),
            changes.join(", ")
        )])
    }

    fn compile_table_exists(&self, table: &str) -> (String, Vec<SqlValue>) {
        self.information_schema("tables", table)
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<SqlValue>) {
        let (sql, bindings) = self.information_schema("columns", table);
        (
            format!(
                "{} ORDER BY ordinal_position",
                sql.replacen("SELECT *", "SELECT column_name", 1)
            ),
            bindings,
        )
    }

    fn type_sql(&self, column: &ColumnDefinition) -> String {
        let length = column.length.unwrap_or(255);
        let serial = column.auto_increment;
        match column.kind {
            ColumnType::Char => format!("CHAR({length})"),
            ColumnType::String => format!("VARCHAR({length})"),
            ColumnType::Text | ColumnType::MediumText | ColumnType::LongText => {
                String::from("TEXT")
            }
            ColumnType::Integer | ColumnType::MediumInteger if serial => String::from("SERIAL"),
            ColumnType::Integer | ColumnType::MediumInteger => String::from("INTEGER"),
            ColumnType::BigInteger if serial => String::from("BIGSERIAL"),
            ColumnType::BigInteger => String::from("BIGINT"),
            ColumnType::SmallInteger | ColumnType::TinyInteger if serial => {
                String::from("SMALLSERIAL")
            }
            ColumnType::SmallInteger | ColumnType::TinyInteger => String::from("SMALLINT"),
            ColumnType::Float => String::from("REAL"),
            ColumnType::Double => String::from("DOUBLE PRECISION"),
            ColumnType::Decimal => format!(
                "DECIMAL({}, {})",
                column.total.unwrap_or(8),
                column.places.unwrap_or(2)
            ),
            ColumnType::Boolean => String::from("BOOLEAN"),
            ColumnType::Enum => format!("VARCHAR(255) {}", self.enum_check(column)),
            ColumnType::Json => String::from("JSON"),
            ColumnType::Date => String::from("DATE"),
            ColumnType::DateTime => String::from("TIMESTAMP(6) WITHOUT TIME ZONE"),
            ColumnType::Time => String::from("TIME(6) WITHOUT TIME ZONE"),
            ColumnType::Timestamp if column.use_current => {
                String::from("TIMESTAMP(6) WITHOUT TIME ZONE DEFAULT CURRENT_TIMESTAMP(6)")
            }
            ColumnType::Timestamp => String::from("TIMESTAMP(6) WITHOUT TIME ZONE"),
            ColumnType::Binary => String::from("BYTEA"),
        }
    }

    fn modifiers(&self) -> &'static [Modifier] {
        MODIFIERS
    }

    fn modifier_sql(&self, modifier: Modifier, _blueprint: &Blueprint, column: &ColumnDefinition) -> String {
        match modifier {
            Modifier::Increment if column.auto_increment && column.is_integer() => {
                String::from(" PRIMARY KEY")
            }
            Modifier::Nullable if column.nullable => String::from(" NULL"),
            Modifier::Nullable => String::from(" NOT NULL"),
            Modifier::Default => column
                .default
                .as_ref()
                .map(|d| format!(" DEFAULT {}", d.to_sql()))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}
