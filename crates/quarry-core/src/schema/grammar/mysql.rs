//! MySQL schema grammar.

use crate::error::Result;
use crate::grammar::{Grammar, GrammarConfig, ParameterStyle};
use crate::schema::blueprint::{Blueprint, IndexCommand};
use crate::schema::column::{ColumnDefinition, ColumnType};
use crate::value::SqlValue;

use super::{Modifier, SchemaContext, SchemaGrammar};

const MODIFIERS: &[Modifier] = &[
    Modifier::Unsigned,
    Modifier::Charset,
    Modifier::Collate,
    Modifier::Nullable,
    Modifier::Default,
    Modifier::Increment,
    Modifier::Comment,
    Modifier::After,
];

/// MySQL schema grammar.
///
/// Knows the connection's database (for `information_schema` lookups),
/// its table defaults and the server version, which gates `JSON` (5.7) and
/// `DEFAULT CURRENT_TIMESTAMP` on timestamps (5.6).
#[derive(Debug, Clone, Default)]
pub struct MySqlSchemaGrammar {
    config: GrammarConfig,
    database: String,
    engine: Option<String>,
    charset: Option<String>,
    collation: Option<String>,
    server_version: Option<(u32, u32)>,
}

impl MySqlSchemaGrammar {
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

    /// Sets the database searched by introspection queries.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    /// Sets the default engine, charset and collation of created tables.
    #[must_use]
    pub fn with_table_defaults(
        mut self,
        engine: Option<String>,
        charset: Option<String>,
        collation: Option<String>,
    ) -> Self {
        self.engine = engine;
        self.charset = charset;
        self.collation = collation;
        self
    }

    /// Sets the server version, e.g. `"5.6.40"` or `"8.0.36-log"`.
    /// Unparseable versions are treated as current.
    #[must_use]
    pub fn with_server_version(mut self, version: &str) -> Self {
        self.server_version = parse_version(version);
        self
    }

    fn at_least(&self, major: u32, minor: u32) -> bool {
        self.server_version
            .map_or(true, |version| version >= (major, minor))
    }

    fn table_options(&self, blueprint: &Blueprint) -> String {
        let charset = blueprint.charset.as_ref().or(self.charset.as_ref());
        let collation = blueprint.collation.as_ref().or(self.collation.as_ref());
        let engine = blueprint.engine.as_ref().or(self.engine.as_ref());
        let mut sql = String::new();
        if let Some(charset) = charset {
            sql.push_str(&format!(" DEFAULT CHARACTER SET {charset}"));
        }
        if let Some(collation) = collation {
            sql.push_str(&format!(" COLLATE {collation}"));
        }
        if let Some(engine) = engine {
            sql.push_str(&format!(" ENGINE = {engine}"));
        }
        sql
    }

    fn precision(name: &str, column: &ColumnDefinition) -> String {
        match (column.total, column.places) {
            (Some(total), Some(places)) => format!("{name}({total}, {places})"),
            _ => name.to_string(),
        }
    }
}

fn parse_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.split(|c: char| !c.is_ascii_digit());
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    Some((major, minor))
}

impl Grammar for MySqlSchemaGrammar {
    fn config(&self) -> &GrammarConfig {
        &self.config
    }

    fn identifier_quote(&self) -> char {
        '`'
    }
}

impl SchemaGrammar for MySqlSchemaGrammar {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn compile_create(&self, blueprint: &Blueprint) -> String {
        format!(
            "CREATE TABLE {} ({}){}",
            self.table(blueprint),
            self.added_column_definitions(blueprint).join(", "),
            self.table_options(blueprint)
        )
    }

    fn compile_add(&self, blueprint: &Blueprint) -> Vec<String> {
        let columns = self
            .added_column_definitions(blueprint)
            .into_iter()
            .map(|c| format!("ADD {c}"))
            .collect::<Vec<_>>();
        vec![format!(
            "ALTER TABLE {} {}",
            self.table(blueprint),
            columns.join(", ")
        )]
    }

    fn compile_change(&self, blueprint: &Blueprint, _context: &SchemaContext) -> Result<Vec<String>> {
        let changes = blueprint
            .changed_columns()
            .map(|c| {
                format!(
                    "CHANGE {} {}",
                    self.wrap_name(&c.name),
                    self.column_definition(blueprint, c)
                )
            })
            .collect::<Vec<_>>();
        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.table(blueprint),
            changes.join(", ")
        )])
    }

    fn compile_rename(&self, blueprint: &Blueprint, to: &str) -> String {
        format!(
            "RENAME TABLE {} TO {}",
            self.table(blueprint),
            self.wrap_table_name(to)
        )
    }

    fn compile_drop_column(
        &self,
        blueprint: &Blueprint,
        columns: &[String],
        _context: &SchemaContext,
    ) -> Result<Vec<String>> {
        let drops = columns
            .iter()
            .map(|c| format!("DROP {}", self.wrap_name(c)))
            .collect::<Vec<_>>();
        Ok(vec![format!(
            "ALTER TABLE {} {}",
            self.table(blueprint),
            drops.join(", ")
        )])
    }

    fn compile_unique(&self, blueprint: &Blueprint, index: &IndexCommand) -> String {
        format!(
            "ALTER TABLE {} ADD UNIQUE {}({})",
            self.table(blueprint),
            index.index,
            self.columnize_names(&index.columns)
        )
    }

    fn compile_index(&self, blueprint: &Blueprint, index: &IndexCommand) -> String {
        format!(
            "ALTER TABLE {} ADD INDEX {}({})",
            self.table(blueprint),
            index.index,
            self.columnize_names(&index.columns)
        )
    }

    fn compile_drop_primary(&self, blueprint: &Blueprint, _index: &str) -> Result<String> {
        Ok(format!("ALTER TABLE {} DROP PRIMARY KEY", self.table(blueprint)))
    }

    fn compile_drop_unique(&self, blueprint: &Blueprint, index: &str) -> String {
        self.compile_drop_index(blueprint, index)
    }

    fn compile_drop_index(&self, blueprint: &Blueprint, index: &str) -> String {
        format!("ALTER TABLE {} DROP INDEX {index}", self.table(blueprint))
    }

    fn compile_drop_foreign(&self, blueprint: &Blueprint, index: &str) -> Result<String> {
        Ok(format!(
            "ALTER TABLE {} DROP FOREIGN KEY {index}",
            self.table(blueprint)
        ))
    }

    fn compile_table_exists(&self, table: &str) -> (String, Vec<SqlValue>) {
        let marker = self.parameter_marker();
        (
            format!(
                "SELECT * FROM information_schema.tables \
                 WHERE table_schema = {marker} AND table_name = {marker}"
            ),
            vec![
                SqlValue::Text(self.database.clone()),
                SqlValue::Text(format!("{}{table}", self.table_prefix())),
            ],
        )
    }

    fn compile_column_listing(&self, table: &str) -> (String, Vec<SqlValue>) {
        let marker = self.parameter_marker();
        (
            format!(
                "SELECT column_name AS column_name FROM information_schema.columns \
                 WHERE table_schema = {marker} AND table_name = {marker}"
            ),
            vec![
                SqlValue::Text(self.database.clone()),
                SqlValue::Text(format!("{}{table}", self.table_prefix())),
            ],
        )
    }

    fn type_sql(&self, column: &ColumnDefinition) -> String {
        let length = column.length.unwrap_or(255);
        match column.kind {
            ColumnType::Char => format!("CHAR({length})"),
            ColumnType::String => format!("VARCHAR({length})"),
            ColumnType::Text => String::from("TEXT"),
            ColumnType::MediumText => String::from("MEDIUMTEXT"),
            ColumnType::LongText => String::from("LONGTEXT"),
            ColumnType::Integer => String::from("INT"),
            ColumnType::BigInteger => String::from("BIGINT"),
            ColumnType::MediumInteger => String::from("MEDIUMINT"),
            ColumnType::SmallInteger => String::from("SMALLINT"),
            ColumnType::TinyInteger => String::from("TINYINT"),
            ColumnType::Float => Self::precision("FLOAT", column),
            ColumnType::Double => Self::precision("DOUBLE", column),
            ColumnType::Decimal => Self::precision("DECIMAL", column),
            ColumnType::Boolean => String::from("TINYINT(1)"),
            ColumnType::Enum => {
                let allowed = column
                    .allowed
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect::<Vec<_>>();
                format!("ENUM({})", allowed.join(", "))
            }
            ColumnType::Json if self.at_least(5, 7) => String::from("JSON"),
            ColumnType::Json => String::from("TEXT"),
            ColumnType::Date => String::from("DATE"),
            ColumnType::DateTime => String::from("DATETIME"),
            ColumnType::Time => String::from("TIME"),
            ColumnType::Timestamp if column.use_current && self.at_least(5, 6) => {
                String::from("TIMESTAMP DEFAULT CURRENT_TIMESTAMP")
            }
            ColumnType::Timestamp if column.use_current => String::from("TIMESTAMP DEFAULT 0"),
            ColumnType::Timestamp => String::from("TIMESTAMP"),
            ColumnType::Binary => String::from("BLOB"),
        }
    }

    fn modifiers(&self) -> &'static [Modifier] {
        MODIFIERS
    }

    fn modifier_sql(&self, modifier: Modifier, _blueprint: &Blueprint, column: &ColumnDefinition) -> String {
        match modifier {
            Modifier::Unsigned if column.unsigned && column.is_integer() => String::from(" UNSIGNED"),
            Modifier::Charset => column
                .charset
                .as_ref()
                .map(|c| format!(" CHARACTER SET {c}"))
                .unwrap_or_default(),
            Modifier::Collate => column
                .collation
                .as_ref()
                .map(|c| format!(" COLLATE {c}"))
                .unwrap_or_default(),
            Modifier::Nullable if column.nullable => String::from(" NULL"),
            Modifier::Nullable => String::from(" NOT NULL"),
            Modifier::Default => column
                .default
                .as_ref()
                .map(|d| format!(" DEFAULT {}", d.to_sql()))
                .unwrap_or_default(),
            Modifier::Increment if column.auto_increment && column.is_integer() => {
                String::from(" AUTO_INCREMENT PRIMARY KEY")
            }
            Modifier::Comment => column
                .comment
                .as_ref()
                .map(|c| format!(" COMMENT '{}'", c.replace('\'', "''")))
                .unwrap_or_default(),
            Modifier::After => column
                .after
                .as_ref()
                .map(|c| format!(" AFTER {}", self.wrap_name(c)))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::column::ForeignKeyAction;

    fn compile(grammar: &MySqlSchemaGrammar, blueprint: &mut Blueprint) -> Vec<String> {
        blueprint.to_sql(grammar, &SchemaContext::default()).unwrap()
    }

    #[test]
    fn test_create_with_table_options() {
        let grammar = MySqlSchemaGrammar::new().with_table_defaults(
            Some("InnoDB".into()),
            Some("utf8mb4".into()),
            Some("utf8mb4_unicode_ci".into()),
        );
        let mut table = Blueprint::new("users");
        table.create();
        table.increments("id");
        table.string("email").unique();
        let sql = compile(&grammar, &mut table);
        assert_eq!(
            sql,
            vec![
                "CREATE TABLE `users` (`id` INT UNSIGNED NOT NULL AUTO_INCREMENT PRIMARY KEY, \
                 `email` VARCHAR(255) NOT NULL) DEFAULT CHARACTER SET utf8mb4 \
                 COLLATE utf8mb4_unicode_ci ENGINE = InnoDB",
                "ALTER TABLE `users` ADD UNIQUE users_email_unique(`email`)",
            ]
        );
    }

    #[test]
    fn test_modifier_order() {
        let mut table = Blueprint::new("users");
        table
            .string("name")
            .charset("utf8")
            .collation("utf8_bin")
            .nullable()
            .default("x")
            .comment("it's")
            .after("id");
        assert_eq!(
            compile(&MySqlSchemaGrammar::new(), &mut table),
            vec![
                "ALTER TABLE `users` ADD `name` VARCHAR(255) CHARACTER SET utf8 COLLATE utf8_bin \
                 NULL DEFAULT 'x' COMMENT 'it''s' AFTER `id`"
            ]
        );
    }

    #[test]
    fn test_version_gates() {
        let old = MySqlSchemaGrammar::new().with_server_version("5.5.62");
        let mut json = ColumnDefinition::new(ColumnType::Json, "meta");
        assert_eq!(old.type_sql(&json), "TEXT");
        assert_eq!(MySqlSchemaGrammar::new().type_sql(&json), "JSON");
        json.kind = ColumnType::Timestamp;
        json.use_current();
        assert_eq!(old.type_sql(&json), "TIMESTAMP DEFAULT 0");
        let modern = MySqlSchemaGrammar::new().with_server_version("8.0.36-log");
        assert_eq!(modern.type_sql(&json), "TIMESTAMP DEFAULT CURRENT_TIMESTAMP");
    }

    #[test]
    fn test_alterations() {
        let grammar = MySqlSchemaGrammar::new();
        let mut table = Blueprint::new("posts");
        table.integer("votes").change();
        table.drop_column(["body", "slug"]);
        table.rename_column("title", "headline");
        table.drop_primary(None);
        table.drop_unique("posts_slug_unique");
        table.drop_foreign("posts_user_id_foreign");
        let _ = table
            .foreign(["user_id"], None)
            .references(["id"])
            .on("users")
            .on_update(ForeignKeyAction::Restrict);
        table.rename("articles");
        assert_eq!(
            compile(&grammar, &mut table),
            vec![
                "ALTER TABLE `posts` CHANGE `votes` `votes` INT NOT NULL",
                "ALTER TABLE `posts` DROP `body`, DROP `slug`",
                "ALTER TABLE `posts` RENAME COLUMN `title` TO `headline`",
                "ALTER TABLE `posts` DROP PRIMARY KEY",
                "ALTER TABLE `posts` DROP INDEX posts_slug_unique",
                "ALTER TABLE `posts` DROP FOREIGN KEY posts_user_id_foreign",
                "ALTER TABLE `posts` ADD CONSTRAINT posts_user_id_foreign FOREIGN KEY (`user_id`) \
                 REFERENCES `users` (`id`) ON UPDATE RESTRICT",
                "RENAME TABLE `posts` TO `articles`",
            ]
        );
    }

    #[test]
    fn test_enum_and_introspection() {
        let grammar = MySqlSchemaGrammar::new().with_database("app");
        let mut column = ColumnDefinition::new(ColumnType::Enum, "role");
        column.allowed = vec!["admin".into(), "user".into()];
        assert_eq!(grammar.type_sql(&column), "ENUM('admin', 'user')");

        let (sql, bindings) = grammar.compile_column_listing("users");
        assert!(sql.contains("column_name AS column_name"));
        assert_eq!(
            bindings,
            vec![SqlValue::Text("app".into()), SqlValue::Text("users".into())]
        );
    }
}
