//! Join clause builder.

use crate::expression::{Ident, Operand};
use crate::value::SqlValue;

use super::ast::{Boolean, Join, JoinCondition, JoinTarget, JoinType};

/// Collects the `ON` conditions of one join.
///
/// ```rust
/// use quarry_core::query::{JoinClause, JoinType};
///
/// let join = JoinClause::new(JoinType::Left, "contacts")
///     .on("users.id", "=", "contacts.user_id")
///     .where_("contacts.active", "=", true);
/// assert_eq!(join.bindings().len(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    join: Join,
    bindings: Vec<SqlValue>,
}

impl JoinClause {
    /// Starts a join against `table`.
    #[must_use]
    pub fn new(kind: JoinType, table: impl Into<Ident>) -> Self {
        Self {
            join: Join {
                kind,
                table: table.into(),
                conditions: Vec::new(),
            },
            bindings: Vec::new(),
        }
    }

    /// Adds a column-to-column condition.
    #[must_use]
    pub fn on(self, first: impl Into<Ident>, operator: &str, second: impl Into<Ident>) -> Self {
        self.push(
            first.into(),
            operator,
            JoinTarget::Column(second.into()),
            Boolean::And,
        )
    }

    /// Adds a column-to-column condition chained with OR.
    #[must_use]
    pub fn or_on(self, first: impl Into<Ident>, operator: &str, second: impl Into<Ident>) -> Self {
        self.push(
            first.into(),
            operator,
            JoinTarget::Column(second.into()),
            Boolean::Or,
        )
    }

    /// Adds a condition against a bound value.
    #[must_use]
    pub fn where_(self, first: impl Into<Ident>, operator: &str, value: impl Into<Operand>) -> Self {
        self.push(
            first.into(),
            operator,
            JoinTarget::Value(value.into()),
            Boolean::And,
        )
    }

    /// Adds a condition against a bound value chained with OR.
    #[must_use]
    pub fn or_where(
        self,
        first: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.push(
            first.into(),
            operator,
            JoinTarget::Value(value.into()),
            Boolean::Or,
        )
    }

    fn push(mut self, first: Ident, operator: &str, second: JoinTarget, boolean: Boolean) -> Self {
        if let JoinTarget::Value(value) = &second {
            if let Some(binding) = value.binding() {
                self.bindings.push(binding.clone());
            }
        }
        self.join.conditions.push(JoinCondition {
            first,
            operator: operator.to_string(),
            second,
            boolean,
        });
        self
    }

    /// Returns the conditions' bindings in lexical order.
    #[must_use]
    pub fn bindings(&self) -> &[SqlValue] {
        &self.bindings
    }

    /// Returns the join description.
    #[must_use]
    pub const fn join(&self) -> &Join {
        &self.join
    }

    pub(crate) fn into_parts(self) -> (Join, Vec<SqlValue>) {
        (self.join, self.bindings)
    }
}
