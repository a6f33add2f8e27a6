//! Raw SQL fragments, identifiers, operands and records.
//!
//! An [`Expression`] is emitted verbatim and never produces a binding. Every
//! other value written into a query travels as an [`Operand::Value`] and ends
//! up in exactly one binding bucket.

use std::fmt;

use crate::value::{SqlValue, ToSqlValue};

/// A SQL fragment emitted verbatim, never parameterized.
///
/// **Warning**: Only use this for SQL fragments that don't contain user input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Expression(String);

impl Expression {
    /// Wraps a SQL fragment.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    /// Returns the wrapped SQL.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Creates a raw expression.
#[must_use]
pub fn raw(sql: impl Into<String>) -> Expression {
    Expression::new(sql)
}

/// A column or table reference: a (possibly dotted, possibly aliased) name
/// that the grammar wraps, or a raw expression it leaves alone.
#[derive(Debug, Clone, PartialEq)]
pub enum Ident {
    /// A name such as `users.id` or `users as u`.
    Name(String),
    /// A verbatim fragment.
    Raw(Expression),
}

impl Ident {
    /// Returns the name, or the raw SQL for raw identifiers.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Name(name) => name,
            Self::Raw(expr) => expr.value(),
        }
    }
}

impl From<&str> for Ident {
    fn from(name: &str) -> Self {
        Self::Name(String::from(name))
    }
}

impl From<String> for Ident {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for Ident {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<Expression> for Ident {
    fn from(expr: Expression) -> Self {
        Self::Raw(expr)
    }
}

/// The right-hand side of a predicate or assignment.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A bound parameter.
    Value(SqlValue),
    /// A verbatim fragment (no binding).
    Raw(Expression),
}

impl Operand {
    /// Returns the bound value, if this operand produces a binding.
    #[must_use]
    pub const fn binding(&self) -> Option<&SqlValue> {
        match self {
            Self::Value(v) => Some(v),
            Self::Raw(_) => None,
        }
    }

    /// Returns `true` when the operand is a bound NULL.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Value(SqlValue::Null))
    }
}

impl<T: ToSqlValue> From<T> for Operand {
    fn from(value: T) -> Self {
        Self::Value(value.to_sql_value())
    }
}

impl From<Expression> for Operand {
    fn from(expr: Expression) -> Self {
        Self::Raw(expr)
    }
}

/// An ordered column → operand mapping used by insert and update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    entries: Vec<(String, Operand)>,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets a column, replacing a previous value for the same column.
    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<Operand>) -> Self {
        self.insert(column, value);
        self
    }

    /// Sets a column in place.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Operand>) {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    /// Returns the operand stored for `column`.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Operand> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Operand)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    /// Iterates over the column names in insertion order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(c, _)| c.as_str())
    }

    /// Returns the bindings the record produces, in column order.
    #[must_use]
    pub fn bindings(&self) -> Vec<SqlValue> {
        self.entries
            .iter()
            .filter_map(|(_, v)| v.binding().cloned())
            .collect()
    }

    /// Returns a copy ordered by column name.
    #[must_use]
    pub fn sorted(&self) -> Self {
        let mut entries = self.entries.clone();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }

    /// Appends the entries of `other`, overriding duplicates.
    pub fn merge(&mut self, other: Self) {
        for (column, value) in other.entries {
            self.insert(column, value);
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no column is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Operand>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (column, value) in iter {
            record.insert(column, value);
        }
        record
    }
}

/// Builds a [`Record`] from `column => value` pairs.
///
/// ```rust
/// use quarry_core::{record, raw};
///
/// let rec = record! { "name" => "john", "votes" => raw("votes + 1") };
/// assert_eq!(rec.len(), 2);
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {
        $crate::Record::new()$(.set($column, $value))+
    };
}
