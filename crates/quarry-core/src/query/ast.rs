//! Query description consumed by the grammars.
//!
//! The builder fills a [`Query`]; grammars read it and never mutate it.
//! Bindings are tracked separately in [`super::Bindings`].

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::expression::{Ident, Operand};

/// How a predicate is chained to the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Boolean {
    /// `AND`
    #[default]
    And,
    /// `OR`
    Or,
}

impl Boolean {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

/// Join kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// INNER JOIN
    Inner,
    /// LEFT JOIN
    Left,
    /// RIGHT JOIN
    Right,
    /// CROSS JOIN
    Cross,
}

impl JoinType {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Cross => "CROSS",
        }
    }
}

/// Right-hand side of a join condition.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinTarget {
    /// Another column (`ON a.x = b.y`).
    Column(Ident),
    /// A bound value (`ON a.x = ?`).
    Value(Operand),
}

/// A single `ON` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    /// Left column.
    pub first: Ident,
    /// Comparison operator.
    pub operator: String,
    /// Right column or value.
    pub second: JoinTarget,
    /// Chaining keyword.
    pub boolean: Boolean,
}

/// A join against another table.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    /// Join kind.
    pub kind: JoinType,
    /// Joined table.
    pub table: Ident,
    /// `ON` conditions.
    pub conditions: Vec<JoinCondition>,
}

/// Date component compared by a date predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatePart {
    /// The whole date.
    Date,
    /// Day of month.
    Day,
    /// Month.
    Month,
    /// Year.
    Year,
}

/// The shape of a single predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereKind {
    /// `col op value`
    Basic {
        column: Ident,
        operator: String,
        value: Operand,
    },
    /// `first op second`, both columns.
    Column {
        first: Ident,
        operator: String,
        second: Ident,
    },
    /// Parenthesized group of predicates.
    Nested { query: Box<Query> },
    /// `col op (subquery)`
    Sub {
        column: Ident,
        operator: String,
        query: Box<Query>,
    },
    /// `col IN (values)`
    In { column: Ident, values: Vec<Operand> },
    /// `col NOT IN (values)`
    NotIn { column: Ident, values: Vec<Operand> },
    /// `col IN (subquery)`
    InSub { column: Ident, query: Box<Query> },
    /// `col NOT IN (subquery)`
    NotInSub { column: Ident, query: Box<Query> },
    /// `col IS NULL`
    Null { column: Ident },
    /// `col IS NOT NULL`
    NotNull { column: Ident },
    /// `col [NOT] BETWEEN low AND high`
    Between {
        column: Ident,
        low: Operand,
        high: Operand,
        not: bool,
    },
    /// `EXISTS (subquery)`
    Exists { query: Box<Query> },
    /// `NOT EXISTS (subquery)`
    NotExists { query: Box<Query> },
    /// Date component comparison.
    Date {
        part: DatePart,
        column: Ident,
        operator: String,
        value: Operand,
    },
    /// Verbatim SQL.
    Raw { sql: String },
}

/// A predicate with its chaining keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Where {
    /// Chaining keyword.
    pub boolean: Boolean,
    /// Predicate shape.
    pub kind: WhereKind,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl Direction {
    /// Returns the SQL keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(Error::invalid(format!("invalid order direction: {s}"))),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An `ORDER BY` item.
#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    /// Column and direction.
    Column { column: Ident, direction: Direction },
    /// Verbatim SQL.
    Raw(String),
}

/// Aggregate projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    /// Function name (`count`, `max`, ...).
    pub function: String,
    /// Aggregated columns.
    pub columns: Vec<Ident>,
}

/// Row locking clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lock {
    /// Shared lock.
    Shared,
    /// Exclusive lock.
    ForUpdate,
    /// Verbatim lock clause.
    Raw(String),
}

impl From<bool> for Lock {
    fn from(update: bool) -> Self {
        if update {
            Self::ForUpdate
        } else {
            Self::Shared
        }
    }
}

impl From<&str> for Lock {
    fn from(sql: &str) -> Self {
        Self::Raw(sql.to_string())
    }
}

/// A union branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Union {
    /// The branch query.
    pub query: Box<Query>,
    /// `UNION ALL` when true.
    pub all: bool,
}

/// Ordering and row window. Kept apart so pagination can swap it out and
/// back as a unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Window {
    /// `ORDER BY` items.
    pub orders: Vec<Order>,
    /// Row limit.
    pub limit: Option<u64>,
    /// Row offset.
    pub offset: Option<u64>,
}

impl Window {
    /// Returns `true` when no ordering, limit or offset is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty() && self.limit.is_none() && self.offset.is_none()
    }
}

/// Everything a grammar needs to compile a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    /// Projection; empty means `*`.
    pub columns: Vec<Ident>,
    /// `SELECT DISTINCT`.
    pub distinct: bool,
    /// Target table.
    pub from: Option<Ident>,
    /// Joins.
    pub joins: Vec<Join>,
    /// Where predicates.
    pub wheres: Vec<Where>,
    /// `GROUP BY` columns.
    pub groups: Vec<Ident>,
    /// Having predicates.
    pub havings: Vec<Where>,
    /// Ordering, limit and offset of the main select.
    pub window: Window,
    /// Union branches.
    pub unions: Vec<Union>,
    /// Ordering, limit and offset applied after the unions.
    pub union_window: Window,
    /// Locking clause.
    pub lock: Option<Lock>,
    /// Aggregate projection replacing the columns.
    pub aggregate: Option<Aggregate>,
}

impl Query {
    /// Creates a query against `table`.
    #[must_use]
    pub fn from_table(table: impl Into<Ident>) -> Self {
        Self {
            from: Some(table.into()),
            ..Self::default()
        }
    }
}
