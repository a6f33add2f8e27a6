//! Column definitions for blueprints.
//!
//! Column methods on [`super::Blueprint`] return a `&mut ColumnDefinition`
//! so modifiers can be chained:
//!
//! ```rust
//! use quarry_core::schema::Blueprint;
//!
//! let mut table = Blueprint::new("users");
//! table.string("email").unique();
//! table.integer("votes").unsigned().default(0).comment("vote count");
//! assert_eq!(table.columns().len(), 2);
//! ```

use crate::expression::Expression;

/// Logical column types. Each grammar maps them to native types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// Fixed-length string.
    Char,
    /// Variable-length string.
    String,
    /// Text.
    Text,
    /// Medium text.
    MediumText,
    /// Long text.
    LongText,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInteger,
    /// 24-bit integer (MySQL).
    MediumInteger,
    /// 16-bit integer.
    SmallInteger,
    /// 8-bit integer.
    TinyInteger,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Fixed-point decimal.
    Decimal,
    /// Boolean.
    Boolean,
    /// One of a fixed set of strings.
    Enum,
    /// JSON document.
    Json,
    /// Date.
    Date,
    /// Date and time.
    DateTime,
    /// Time.
    Time,
    /// Timestamp.
    Timestamp,
    /// Binary data.
    Binary,
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyAction {
    /// No action.
    NoAction,
    /// Restrict deletion/update.
    Restrict,
    /// Cascade the operation.
    Cascade,
    /// Set to NULL.
    SetNull,
    /// Set to default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of the action.
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Default value of a column.
#[derive(Debug, Clone, PartialEq)]
pub enum DefaultValue {
    /// NULL default.
    Null,
    /// Boolean default.
    Boolean(bool),
    /// Integer default.
    Integer(i64),
    /// Float default.
    Float(f64),
    /// String default.
    String(String),
    /// Raw SQL expression (e.g. `CURRENT_TIMESTAMP`).
    Expression(String),
}

impl DefaultValue {
    /// Returns the quoted SQL literal. Expressions are emitted verbatim.
    #[must_use]
    pub fn to_sql(&self) -> String {
        match self {
            Self::Null => String::from("NULL"),
            Self::Boolean(b) => format!("'{}'", u8::from(*b)),
            Self::Integer(i) => format!("'{i}'"),
            Self::Float(f) => format!("'{f}'"),
            Self::String(s) => format!("'{}'", s.replace('\'', "''")),
            Self::Expression(expr) => expr.clone(),
        }
    }
}

impl From<bool> for DefaultValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i32> for DefaultValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<i64> for DefaultValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for DefaultValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for DefaultValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefaultValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Expression> for DefaultValue {
    fn from(value: Expression) -> Self {
        Self::Expression(value.value().to_string())
    }
}

/// A column to add or change, with its modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Logical type.
    pub kind: ColumnType,
    /// Column name.
    pub name: String,
    /// Length for string types.
    pub length: Option<u32>,
    /// Total digits for float and decimal types.
    pub total: Option<u32>,
    /// Digits after the point for float and decimal types.
    pub places: Option<u32>,
    /// Allowed values for enums.
    pub allowed: Vec<String>,
    /// Accepts NULL.
    pub nullable: bool,
    /// Default value.
    pub default: Option<DefaultValue>,
    /// Unsigned integer (MySQL).
    pub unsigned: bool,
    /// Auto-incrementing primary key.
    pub auto_increment: bool,
    /// Position after another column (MySQL).
    pub after: Option<String>,
    /// Column comment (MySQL).
    pub comment: Option<String>,
    /// Character set (MySQL).
    pub charset: Option<String>,
    /// Collation (MySQL).
    pub collation: Option<String>,
    /// Timestamp defaults to the current time.
    pub use_current: bool,
    /// The definition changes an existing column.
    pub change: bool,
    /// Fluent primary key.
    pub primary: bool,
    /// Fluent unique index.
    pub unique: bool,
    /// Fluent plain index.
    pub index: bool,
}

impl ColumnDefinition {
    /// Creates a NOT NULL column with no modifiers.
    #[must_use]
    pub fn new(kind: ColumnType, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            length: None,
            total: None,
            places: None,
            allowed: Vec::new(),
            nullable: false,
            default: None,
            unsigned: false,
            auto_increment: false,
            after: None,
            comment: None,
            charset: None,
            collation: None,
            use_current: false,
            change: false,
            primary: false,
            unique: false,
            index: false,
        }
    }

    /// Allows NULL.
    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    /// Sets the default value.
    pub fn default(&mut self, value: impl Into<DefaultValue>) -> &mut Self {
        self.default = Some(value.into());
        self
    }

    /// Marks an integer unsigned.
    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    /// Marks the column auto-incrementing.
    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self
    }

    /// Places the column after another one (MySQL).
    pub fn after(&mut self, column: impl Into<String>) -> &mut Self {
        self.after = Some(column.into());
        self
    }

    /// Sets a comment (MySQL).
    pub fn comment(&mut self, comment: impl Into<String>) -> &mut Self {
        self.comment = Some(comment.into());
        self
    }

    /// Sets the character set (MySQL).
    pub fn charset(&mut self, charset: impl Into<String>) -> &mut Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the collation (MySQL).
    pub fn collation(&mut self, collation: impl Into<String>) -> &mut Self {
        self.collation = Some(collation.into());
        self
    }

    /// Defaults a timestamp to the current time.
    pub fn use_current(&mut self) -> &mut Self {
        self.use_current = true;
        self
    }

    /// Turns the definition into a change of an existing column.
    pub fn change(&mut self) -> &mut Self {
        self.change = true;
        self
    }

    /// Adds a primary key on this column.
    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    /// Adds a unique index on this column.
    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    /// Adds a plain index on this column.
    pub fn index(&mut self) -> &mut Self {
        self.index = true;
        self
    }

    /// Sets the length of a string column.
    pub fn length(&mut self, length: u32) -> &mut Self {
        self.length = Some(length);
        self
    }

    /// Returns `true` for integer types.
    #[must_use]
    pub const fn is_integer(&self) -> bool {
        matches!(
            self.kind,
            ColumnType::Integer
                | ColumnType::BigInteger
                | ColumnType::MediumInteger
                | ColumnType::SmallInteger
                | ColumnType::TinyInteger
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::raw;

    #[test]
    fn test_modifiers_chain() {
        let mut column = ColumnDefinition::new(ColumnType::Integer, "votes");
        column.unsigned().nullable().default(5).after("name");
        assert!(column.unsigned && column.nullable);
        assert_eq!(column.default, Some(DefaultValue::Integer(5)));
        assert_eq!(column.after.as_deref(), Some("name"));
        assert!(column.is_integer());
    }

    #[test]
    fn test_default_literals() {
        assert_eq!(DefaultValue::from(true).to_sql(), "'1'");
        assert_eq!(DefaultValue::from("it's").to_sql(), "'it''s'");
        assert_eq!(DefaultValue::from(raw("CURRENT_TIMESTAMP")).to_sql(), "CURRENT_TIMESTAMP");
        assert_eq!(ForeignKeyAction::SetNull.as_sql(), "SET NULL");
    }
}
