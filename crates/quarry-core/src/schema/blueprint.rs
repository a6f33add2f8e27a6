//! Table blueprints.
//!
//! A [`Blueprint`] records the columns and commands of one table operation.
//! Column additions and changes imply `add`/`change` commands, and fluent
//! index flags imply index commands; [`Blueprint::prepare`] materializes
//! them before a grammar compiles the blueprint.

use crate::error::Result;

use super::column::{ColumnDefinition, ColumnType, ForeignKeyAction};
use super::grammar::{SchemaContext, SchemaGrammar};

/// An index-creating command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCommand {
    /// Index name.
    pub index: String,
    /// Indexed columns.
    pub columns: Vec<String>,
}

/// A foreign key constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    /// Constraint name.
    pub index: String,
    /// Local columns.
    pub columns: Vec<String>,
    /// Referenced columns.
    pub references: Vec<String>,
    /// Referenced table.
    pub on: String,
    /// Action on delete.
    pub on_delete: Option<ForeignKeyAction>,
    /// Action on update.
    pub on_update: Option<ForeignKeyAction>,
}

/// A schema command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the table.
    Create,
    /// Add the blueprint's new columns.
    Add,
    /// Change the blueprint's changed columns.
    Change,
    /// Drop the table.
    Drop,
    /// Drop the table when it exists.
    DropIfExists,
    /// Rename the table.
    Rename { to: String },
    /// Drop columns.
    DropColumn { columns: Vec<String> },
    /// Rename a column.
    RenameColumn { from: String, to: String },
    /// Add a primary key.
    Primary(IndexCommand),
    /// Add a unique index.
    Unique(IndexCommand),
    /// Add a plain index.
    Index(IndexCommand),
    /// Add a foreign key.
    Foreign(ForeignKey),
    /// Drop the primary key.
    DropPrimary { index: String },
    /// Drop a unique index.
    DropUnique { index: String },
    /// Drop a plain index.
    DropIndex { index: String },
    /// Drop a foreign key.
    DropForeign { index: String },
}

impl Command {
    /// Returns the command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Add => "add",
            Self::Change => "change",
            Self::Drop => "drop",
            Self::DropIfExists => "drop_if_exists",
            Self::Rename { .. } => "rename",
            Self::DropColumn { .. } => "drop_column",
            Self::RenameColumn { .. } => "rename_column",
            Self::Primary(_) => "primary",
            Self::Unique(_) => "unique",
            Self::Index(_) => "index",
            Self::Foreign(_) => "foreign",
            Self::DropPrimary { .. } => "drop_primary",
            Self::DropUnique { .. } => "drop_unique",
            Self::DropIndex { .. } => "drop_index",
            Self::DropForeign { .. } => "drop_foreign",
        }
    }
}

/// Describes the schema changes to one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Blueprint {
    table: String,
    prefix: String,
    columns: Vec<ColumnDefinition>,
    commands: Vec<Command>,
    /// Storage engine (MySQL).
    pub engine: Option<String>,
    /// Default character set (MySQL).
    pub charset: Option<String>,
    /// Default collation (MySQL).
    pub collation: Option<String>,
}

impl Blueprint {
    /// Creates an empty blueprint for `table`.
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            prefix: String::new(),
            columns: Vec::new(),
            commands: Vec::new(),
            engine: None,
            charset: None,
            collation: None,
        }
    }

    /// Sets the table prefix used in generated index names.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Table name, without prefix.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column definitions in declaration order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    /// Commands in declaration order.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Columns to add.
    pub fn added_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| !c.change)
    }

    /// Columns to change.
    pub fn changed_columns(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.columns.iter().filter(|c| c.change)
    }

    /// Returns `true` when the blueprint creates its table.
    #[must_use]
    pub fn creating(&self) -> bool {
        self.commands.iter().any(|c| matches!(c, Command::Create))
    }

    /// Returns `true` when a command of the given name is present.
    #[must_use]
    pub fn has_command(&self, name: &str) -> bool {
        self.commands.iter().any(|c| c.name() == name)
    }

    /// Adds the implied `add`/`change` commands and the commands of fluent
    /// index flags. Calling it twice has no further effect.
    pub fn prepare(&mut self) {
        let mut implied = Vec::new();
        if !self.creating() {
            if self.added_columns().next().is_some() && !self.has_command("add") {
                implied.push(Command::Add);
            }
            if self.changed_columns().next().is_some() && !self.has_command("change") {
                implied.push(Command::Change);
            }
        }
        implied.append(&mut self.commands);
        self.commands = implied;

        let mut fluent = Vec::new();
        for column in &self.columns {
            let columns = vec![column.name.clone()];
            if column.primary {
                fluent.push(Command::Primary(self.index_command("primary", columns.clone(), None)));
            }
            if column.unique {
                fluent.push(Command::Unique(self.index_command("unique", columns.clone(), None)));
            }
            if column.index {
                fluent.push(Command::Index(self.index_command("index", columns, None)));
            }
        }
        for command in fluent {
            if !self.commands.contains(&command) {
                self.commands.push(command);
            }
        }
        for column in &mut self.columns {
            column.primary = false;
            column.unique = false;
            column.index = false;
        }
    }

    /// Prepares the blueprint and compiles it with `grammar`.
    ///
    /// # Errors
    ///
    /// Returns an error when the grammar cannot express a command.
    pub fn to_sql(&mut self, grammar: &dyn SchemaGrammar, context: &SchemaContext) -> Result<Vec<String>> {
        self.prepare();
        grammar.compile(self, context)
    }

    /// Builds `<prefix><table>_<columns>_<kind>`, lowercased, with `-` and
    /// `.` replaced by `_`.
    #[must_use]
    pub fn create_index_name(&self, kind: &str, columns: &[String]) -> String {
        format!("{}{}_{}_{kind}", self.prefix, self.table, columns.join("_"))
            .to_lowercase()
            .replace(['-', '.'], "_")
    }

    fn index_command(&self, kind: &str, columns: Vec<String>, name: Option<&str>) -> IndexCommand {
        let index = name.map_or_else(|| self.create_index_name(kind, &columns), String::from);
        IndexCommand { index, columns }
    }

    // ----- table commands -----

    /// Creates the table.
    pub fn create(&mut self) -> &mut Self {
        self.commands.push(Command::Create);
        self
    }

    /// Drops the table.
    pub fn drop(&mut self) -> &mut Self {
        self.commands.push(Command::Drop);
        self
    }

    /// Drops the table if it exists.
    pub fn drop_if_exists(&mut self) -> &mut Self {
        self.commands.push(Command::DropIfExists);
        self
    }

    /// Renames the table.
    pub fn rename(&mut self, to: impl Into<String>) -> &mut Self {
        self.commands.push(Command::Rename { to: to.into() });
        self
    }

    /// Drops columns.
    pub fn drop_column<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.commands.push(Command::DropColumn {
            columns: columns.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Renames a column.
    pub fn rename_column(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.commands.push(Command::RenameColumn {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// Drops `created_at` and `updated_at`.
    pub fn drop_timestamps(&mut self) -> &mut Self {
        self.drop_column(["created_at", "updated_at"])
    }

    /// Drops `deleted_at`.
    pub fn drop_soft_deletes(&mut self) -> &mut Self {
        self.drop_column(["deleted_at"])
    }

    // ----- index commands -----

    fn names<I, S>(columns: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        columns.into_iter().map(Into::into).collect()
    }

    /// Adds a primary key.
    pub fn primary<I, S>(&mut self, columns: I, name: Option<&str>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.index_command("primary", Self::names(columns), name);
        self.commands.push(Command::Primary(command));
        self
    }

    /// Adds a unique index.
    pub fn unique<I, S>(&mut self, columns: I, name: Option<&str>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.index_command("unique", Self::names(columns), name);
        self.commands.push(Command::Unique(command));
        self
    }

    /// Adds a plain index.
    pub fn index<I, S>(&mut self, columns: I, name: Option<&str>) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let command = self.index_command("index", Self::names(columns), name);
        self.commands.push(Command::Index(command));
        self
    }

    /// Starts a foreign key on `columns`.
    pub fn foreign<I, S>(&mut self, columns: I, name: Option<&str>) -> ForeignKeyBuilder<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let columns = Self::names(columns);
        let index = name.map_or_else(|| self.create_index_name("foreign", &columns), String::from);
        self.commands.push(Command::Foreign(ForeignKey {
            index,
            columns,
            references: Vec::new(),
            on: String::new(),
            on_delete: None,
            on_update: None,
        }));
        let position = self.commands.len() - 1;
        ForeignKeyBuilder {
            blueprint: self,
            position,
        }
    }

    /// Drops the primary key. PostgreSQL defaults the name to `<table>_pkey`.
    pub fn drop_primary(&mut self, name: Option<&str>) -> &mut Self {
        let index = name.map_or_else(
            || format!("{}{}_pkey", self.prefix, self.table),
            String::from,
        );
        self.commands.push(Command::DropPrimary { index });
        self
    }

    /// Drops a unique index by name.
    pub fn drop_unique(&mut self, index: impl Into<String>) -> &mut Self {
        self.commands.push(Command::DropUnique {
            index: index.into(),
        });
        self
    }

    /// Drops a plain index by name.
    pub fn drop_index(&mut self, index: impl Into<String>) -> &mut Self {
        self.commands.push(Command::DropIndex {
            index: index.into(),
        });
        self
    }

    /// Drops a foreign key by name.
    pub fn drop_foreign(&mut self, index: impl Into<String>) -> &mut Self {
        self.commands.push(Command::DropForeign {
            index: index.into(),
        });
        self
    }

    // ----- columns -----

    /// Adds a column of any type.
    pub fn add_column(&mut self, kind: ColumnType, name: impl Into<String>) -> &mut ColumnDefinition {
        self.columns.push(ColumnDefinition::new(kind, name));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    /// Auto-incrementing unsigned integer primary key.
    pub fn increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Integer, name)
            .unsigned()
            .auto_increment()
    }

    /// Auto-incrementing unsigned big integer primary key.
    pub fn big_increments(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::BigInteger, name)
            .unsigned()
            .auto_increment()
    }

    /// Fixed-length string.
    pub fn char(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Char, name).length(length)
    }

    /// Variable-length string of 255 characters.
    pub fn string(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.string_with_length(name, 255)
    }

    /// Variable-length string.
    pub fn string_with_length(&mut self, name: impl Into<String>, length: u32) -> &mut ColumnDefinition {
        self.add_column(ColumnType::String, name).length(length)
    }

    /// Text.
    pub fn text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Text, name)
    }

    /// Medium text.
    pub fn medium_text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::MediumText, name)
    }

    /// Long text.
    pub fn long_text(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::LongText, name)
    }

    /// 32-bit integer.
    pub fn integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Integer, name)
    }

    /// 64-bit integer.
    pub fn big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::BigInteger, name)
    }

    /// 24-bit integer.
    pub fn medium_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::MediumInteger, name)
    }

    /// 16-bit integer.
    pub fn small_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::SmallInteger, name)
    }

    /// 8-bit integer.
    pub fn tiny_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::TinyInteger, name)
    }

    /// Unsigned 32-bit integer.
    pub fn unsigned_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.integer(name).unsigned()
    }

    /// Unsigned 64-bit integer.
    pub fn unsigned_big_integer(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.big_integer(name).unsigned()
    }

    /// Float with 8 digits, 2 after the point.
    pub fn float(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.float_with(name, 8, 2)
    }

    /// Float with explicit precision.
    pub fn float_with(&mut self, name: impl Into<String>, total: u32, places: u32) -> &mut ColumnDefinition {
        let column = self.add_column(ColumnType::Float, name);
        column.total = Some(total);
        column.places = Some(places);
        column
    }

    /// Double without explicit precision.
    pub fn double(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Double, name)
    }

    /// Double with explicit precision.
    pub fn double_with(&mut self, name: impl Into<String>, total: u32, places: u32) -> &mut ColumnDefinition {
        let column = self.add_column(ColumnType::Double, name);
        column.total = Some(total);
        column.places = Some(places);
        column
    }

    /// Decimal with 8 digits, 2 after the point.
    pub fn decimal(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.decimal_with(name, 8, 2)
    }

    /// Decimal with explicit precision.
    pub fn decimal_with(&mut self, name: impl Into<String>, total: u32, places: u32) -> &mut ColumnDefinition {
        let column = self.add_column(ColumnType::Decimal, name);
        column.total = Some(total);
        column.places = Some(places);
        column
    }

    /// Boolean.
    pub fn boolean(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Boolean, name)
    }

    /// One of `allowed`.
    pub fn enumeration<I, S>(&mut self, name: impl Into<String>, allowed: I) -> &mut ColumnDefinition
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let column = self.add_column(ColumnType::Enum, name);
        column.allowed = allowed.into_iter().map(Into::into).collect();
        column
    }

    /// JSON document.
    pub fn json(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Json, name)
    }

    /// Date.
    pub fn date(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Date, name)
    }

    /// Date and time.
    pub fn datetime(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::DateTime, name)
    }

    /// Time.
    pub fn time(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Time, name)
    }

    /// Timestamp.
    pub fn timestamp(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Timestamp, name)
    }

    /// `created_at` and `updated_at` timestamps.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at");
        self.timestamp("updated_at");
    }

    /// `created_at` and `updated_at` timestamps defaulting to now.
    pub fn timestamps_use_current(&mut self) {
        self.timestamp("created_at").use_current();
        self.timestamp("updated_at").use_current();
    }

    /// `created_at` and `updated_at` nullable timestamps.
    pub fn nullable_timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    /// Nullable `deleted_at` timestamp.
    pub fn soft_deletes(&mut self) -> &mut ColumnDefinition {
        self.timestamp("deleted_at").nullable()
    }

    /// Binary data.
    pub fn binary(&mut self, name: impl Into<String>) -> &mut ColumnDefinition {
        self.add_column(ColumnType::Binary, name)
    }

    /// `<name>_id` and `<name>_type` columns with a composite index.
    pub fn morphs(&mut self, name: &str) {
        self.unsigned_integer(format!("{name}_id"));
        self.string(format!("{name}_type"));
        self.index([format!("{name}_id"), format!("{name}_type")], None);
    }
}

/// Completes a foreign key started by [`Blueprint::foreign`].
#[derive(Debug)]
pub struct ForeignKeyBuilder<'a> {
    blueprint: &'a mut Blueprint,
    position: usize,
}

impl ForeignKeyBuilder<'_> {
    fn key(&mut self) -> Option<&mut ForeignKey> {
        match self.blueprint.commands.get_mut(self.position) {
            Some(Command::Foreign(key)) => Some(key),
            _ => None,
        }
    }

    /// Sets the referenced columns.
    #[must_use]
    pub fn references<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(key) = self.key() {
            key.references = columns.into_iter().map(Into::into).collect();
        }
        self
    }

    /// Sets the referenced table.
    #[must_use]
    pub fn on(mut self, table: impl Into<String>) -> Self {
        if let Some(key) = self.key() {
            key.on = table.into();
        }
        self
    }

    /// Sets the delete action.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        if let Some(key) = self.key() {
            key.on_delete = Some(action);
        }
        self
    }

    /// Sets the update action.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        if let Some(key) = self.key() {
            key.on_update = Some(action);
        }
        self
    }
}
