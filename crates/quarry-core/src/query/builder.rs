//! Fluent query builder.
//!
//! Builder methods consume and return the builder. Argument errors (an
//! unknown operator, a negative limit, a NULL compared with `>`) do not
//! break the chain; the first one is kept and returned by the next terminal
//! operation.

use std::sync::Arc;

use futures::stream::{self, Stream};
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::expression::{raw, Expression, Ident, Operand, Record};
use crate::row::Row;
use crate::value::{SqlValue, ToSqlValue};

use super::ast::{
    Aggregate, Boolean, DatePart, Direction, JoinType, Lock, Order, Query, Union, Where,
    WhereKind, Window,
};
use super::bindings::{BindingKind, Bindings};
use super::grammar::QueryGrammar;
use super::join::JoinClause;
use super::pagination::{LengthAwarePaginator, Paginator};

/// Builds and runs a single query.
#[derive(Debug, Clone)]
pub struct Builder<'c> {
    connection: Option<&'c Connection>,
    grammar: Arc<dyn QueryGrammar>,
    query: Query,
    bindings: Bindings,
    error: Option<String>,
}

impl Builder<'static> {
    /// Creates a builder that only compiles SQL.
    #[must_use]
    pub fn new(grammar: Arc<dyn QueryGrammar>) -> Self {
        Self {
            connection: None,
            grammar,
            query: Query::default(),
            bindings: Bindings::new(),
            error: None,
        }
    }
}

impl<'c> Builder<'c> {
    /// Creates a builder bound to a connection.
    #[must_use]
    pub fn on_connection(connection: &'c Connection) -> Self {
        Self {
            connection: Some(connection),
            grammar: Arc::clone(connection.query_grammar()),
            query: Query::default(),
            bindings: Bindings::new(),
            error: None,
        }
    }

    /// Returns a fresh builder sharing this builder's connection and grammar.
    #[must_use]
    pub fn new_query(&self) -> Self {
        Self {
            connection: self.connection,
            grammar: Arc::clone(&self.grammar),
            query: Query::default(),
            bindings: Bindings::new(),
            error: None,
        }
    }

    fn for_nested_where(&self) -> Self {
        let mut nested = self.new_query();
        nested.query.from = self.query.from.clone();
        nested
    }

    /// Returns the query description.
    #[must_use]
    pub const fn query(&self) -> &Query {
        &self.query
    }

    /// Returns the grammar.
    #[must_use]
    pub const fn grammar(&self) -> &Arc<dyn QueryGrammar> {
        &self.grammar
    }

    /// Returns the bound connection.
    #[must_use]
    pub const fn connection(&self) -> Option<&'c Connection> {
        self.connection
    }

    /// Returns the binding buckets.
    #[must_use]
    pub const fn raw_bindings(&self) -> &Bindings {
        &self.bindings
    }

    /// Returns every binding in select-emission order.
    #[must_use]
    pub fn get_bindings(&self) -> Vec<SqlValue> {
        self.bindings.flatten()
    }

    /// Replaces the named binding bucket.
    #[must_use]
    pub fn set_bindings(mut self, values: Vec<SqlValue>, bucket: &str) -> Self {
        match bucket.parse::<BindingKind>() {
            Ok(kind) => {
                self.bindings.set(kind, values);
                self
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    /// Appends a value to the named binding bucket.
    #[must_use]
    pub fn add_binding(mut self, value: impl ToSqlValue, bucket: &str) -> Self {
        match bucket.parse::<BindingKind>() {
            Ok(kind) => {
                self.bindings.add(kind, value.to_sql_value());
                self
            }
            Err(err) => self.fail(err.to_string()),
        }
    }

    /// Appends every bucket of `other` to this builder's buckets.
    #[must_use]
    pub fn merge_bindings(mut self, other: &Builder<'_>) -> Self {
        self.bindings.merge(&other.bindings);
        self
    }

    /// Appends predicates and their where-bindings.
    #[must_use]
    pub fn merge_wheres(mut self, wheres: Vec<Where>, bindings: Vec<SqlValue>) -> Self {
        self.query.wheres.extend(wheres);
        self.bindings.extend(BindingKind::Where, bindings);
        self
    }

    /// Creates a raw expression.
    #[must_use]
    pub fn raw(&self, sql: impl Into<String>) -> Expression {
        raw(sql)
    }

    fn fail(mut self, message: impl Into<String>) -> Self {
        if self.error.is_none() {
            self.error = Some(message.into());
        }
        self
    }

    fn absorb(&mut self, other: &Builder<'_>) {
        if self.error.is_none() {
            self.error.clone_from(&other.error);
        }
    }

    fn check(&self) -> Result<()> {
        match &self.error {
            Some(message) => Err(Error::invalid(message.clone())),
            None => Ok(()),
        }
    }

    fn valid_operator(&self, operator: &str) -> bool {
        self.grammar.is_valid_operator(operator)
    }

    // ----- projection -----

    /// Sets the selected columns.
    #[must_use]
    pub fn select<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Ident>,
    {
        self.query.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Adds selected columns.
    #[must_use]
    pub fn add_select<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Ident>,
    {
        self.query.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Adds a raw select expression with its bindings.
    #[must_use]
    pub fn select_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.query.columns.push(Ident::Raw(raw(sql)));
        self.bindings.extend(BindingKind::Select, bindings);
        self
    }

    /// Selects a sub-query under an alias.
    #[must_use]
    pub fn select_sub(mut self, sub: Builder<'_>, alias: &str) -> Self {
        self.absorb(&sub);
        let sql = format!(
            "({}) AS {}",
            self.grammar.compile_select(&sub.query),
            self.grammar.wrap_value(alias)
        );
        self.query.columns.push(Ident::Raw(raw(sql)));
        self.bindings.extend(BindingKind::Select, sub.get_bindings());
        self
    }

    /// Makes the select DISTINCT.
    #[must_use]
    pub fn distinct(mut self) -> Self {
        self.query.distinct = true;
        self
    }

    /// Sets the target table.
    #[must_use]
    pub fn from(mut self, table: impl Into<Ident>) -> Self {
        self.query.from = Some(table.into());
        self
    }

    // ----- joins -----

    /// Adds an inner join on two columns.
    #[must_use]
    pub fn join(
        self,
        table: impl Into<Ident>,
        first: impl Into<Ident>,
        operator: &str,
        second: impl Into<Ident>,
    ) -> Self {
        self.join_with(table, JoinType::Inner, |j| j.on(first, operator, second))
    }

    /// Adds a left join on two columns.
    #[must_use]
    pub fn left_join(
        self,
        table: impl Into<Ident>,
        first: impl Into<Ident>,
        operator: &str,
        second: impl Into<Ident>,
    ) -> Self {
        self.join_with(table, JoinType::Left, |j| j.on(first, operator, second))
    }

    /// Adds a right join on two columns.
    #[must_use]
    pub fn right_join(
        self,
        table: impl Into<Ident>,
        first: impl Into<Ident>,
        operator: &str,
        second: impl Into<Ident>,
    ) -> Self {
        self.join_with(table, JoinType::Right, |j| j.on(first, operator, second))
    }

    /// Adds an inner join whose condition compares against a bound value.
    #[must_use]
    pub fn join_where(
        self,
        table: impl Into<Ident>,
        first: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.join_with(table, JoinType::Inner, |j| j.where_(first, operator, value))
    }

    /// Adds a left join whose condition compares against a bound value.
    #[must_use]
    pub fn left_join_where(
        self,
        table: impl Into<Ident>,
        first: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.join_with(table, JoinType::Left, |j| j.where_(first, operator, value))
    }

    /// Adds a cross join.
    #[must_use]
    pub fn cross_join(self, table: impl Into<Ident>) -> Self {
        self.join_with(table, JoinType::Cross, |j| j)
    }

    /// Adds a join built by `build`.
    #[must_use]
    pub fn join_with<F>(mut self, table: impl Into<Ident>, kind: JoinType, build: F) -> Self
    where
        F: FnOnce(JoinClause) -> JoinClause,
    {
        let (join, bindings) = build(JoinClause::new(kind, table)).into_parts();
        if kind != JoinType::Cross && join.conditions.is_empty() {
            return self.fail("join requires at least one condition");
        }
        for condition in &join.conditions {
            if condition.first.as_str().is_empty() {
                return self.fail("join condition is missing its column");
            }
            if !self.valid_operator(&condition.operator) {
                return self.fail(format!("invalid operator: {}", condition.operator));
            }
        }
        self.bindings.extend(BindingKind::Join, bindings);
        self.query.joins.push(join);
        self
    }

    // ----- where -----

    fn push_where(mut self, boolean: Boolean, kind: WhereKind) -> Self {
        self.query.wheres.push(Where { boolean, kind });
        self
    }

    fn bind_where(&mut self, operand: &Operand) {
        if let Some(value) = operand.binding() {
            self.bindings.add(BindingKind::Where, value.clone());
        }
    }

    fn add_basic_where(
        mut self,
        column: Ident,
        operator: &str,
        value: Operand,
        boolean: Boolean,
    ) -> Self {
        if value.is_null() {
            return match operator {
                "=" => self.push_where(boolean, WhereKind::Null { column }),
                "!=" | "<>" => self.push_where(boolean, WhereKind::NotNull { column }),
                _ => self.fail(format!(
                    "illegal operator and value combination: {operator} NULL"
                )),
            };
        }
        if !self.valid_operator(operator) {
            return self.fail(format!("invalid operator: {operator}"));
        }
        self.bind_where(&value);
        self.push_where(
            boolean,
            WhereKind::Basic {
                column,
                operator: operator.to_string(),
                value,
            },
        )
    }

    /// Adds `column operator value`. A NULL value with `=` becomes
    /// `IS NULL`, with `!=` or `<>` becomes `IS NOT NULL`.
    #[must_use]
    pub fn where_(self, column: impl Into<Ident>, operator: &str, value: impl Into<Operand>) -> Self {
        self.add_basic_where(column.into(), operator, value.into(), Boolean::And)
    }

    /// OR variant of [`Self::where_`].
    #[must_use]
    pub fn or_where(
        self,
        column: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.add_basic_where(column.into(), operator, value.into(), Boolean::Or)
    }

    /// Adds `column = value`.
    #[must_use]
    pub fn where_eq(self, column: impl Into<Ident>, value: impl Into<Operand>) -> Self {
        self.where_(column, "=", value)
    }

    /// OR variant of [`Self::where_eq`].
    #[must_use]
    pub fn or_where_eq(self, column: impl Into<Ident>, value: impl Into<Operand>) -> Self {
        self.or_where(column, "=", value)
    }

    /// Adds a nested group of equalities, one per record entry.
    #[must_use]
    pub fn where_map(self, record: Record) -> Self {
        self.where_nested(move |mut q| {
            for (column, value) in record.iter() {
                q = q.where_eq(column, value.clone());
            }
            q
        })
    }

    /// Adds a nested group of `(column, operator, value)` conditions.
    #[must_use]
    pub fn where_list<I, C, O, V>(self, conditions: I) -> Self
    where
        I: IntoIterator<Item = (C, O, V)>,
        C: Into<Ident>,
        O: AsRef<str>,
        V: Into<Operand>,
    {
        self.where_nested(move |mut q| {
            for (column, operator, value) in conditions {
                q = q.where_(column, operator.as_ref(), value);
            }
            q
        })
    }

    /// Adds a parenthesized group built by `build`.
    #[must_use]
    pub fn where_nested<F>(self, build: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let nested = build(self.for_nested_where());
        self.add_nested_where_query(nested, Boolean::And)
    }

    /// OR variant of [`Self::where_nested`].
    #[must_use]
    pub fn or_where_nested<F>(self, build: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let nested = build(self.for_nested_where());
        self.add_nested_where_query(nested, Boolean::Or)
    }

    /// Adds the predicates of `nested` as a parenthesized group, merging its
    /// where-bindings.
    #[must_use]
    pub fn add_nested_where_query(mut self, nested: Builder<'_>, boolean: Boolean) -> Self {
        self.absorb(&nested);
        if nested.query.wheres.is_empty() {
            return self;
        }
        self.bindings.extend(
            BindingKind::Where,
            nested.bindings.get(BindingKind::Where).iter().cloned(),
        );
        let query = Query {
            wheres: nested.query.wheres,
            ..Query::default()
        };
        self.push_where(
            boolean,
            WhereKind::Nested {
                query: Box::new(query),
            },
        )
    }

    fn add_sub_where(
        mut self,
        column: Ident,
        operator: &str,
        sub: Builder<'_>,
        boolean: Boolean,
    ) -> Self {
        if !self.valid_operator(operator) {
            return self.fail(format!("invalid operator: {operator}"));
        }
        self.absorb(&sub);
        self.bindings.extend(BindingKind::Where, sub.get_bindings());
        self.push_where(
            boolean,
            WhereKind::Sub {
                column,
                operator: operator.to_string(),
                query: Box::new(sub.query),
            },
        )
    }

    /// Compares a column with a scalar sub-query.
    #[must_use]
    pub fn where_sub(self, column: impl Into<Ident>, operator: &str, sub: Builder<'_>) -> Self {
        self.add_sub_where(column.into(), operator, sub, Boolean::And)
    }

    /// OR variant of [`Self::where_sub`].
    #[must_use]
    pub fn or_where_sub(self, column: impl Into<Ident>, operator: &str, sub: Builder<'_>) -> Self {
        self.add_sub_where(column.into(), operator, sub, Boolean::Or)
    }

    fn add_column_where(
        self,
        first: Ident,
        operator: &str,
        second: Ident,
        boolean: Boolean,
    ) -> Self {
        if !self.valid_operator(operator) {
            return self.fail(format!("invalid operator: {operator}"));
        }
        self.push_where(
            boolean,
            WhereKind::Column {
                first,
                operator: operator.to_string(),
                second,
            },
        )
    }

    /// Compares two columns.
    #[must_use]
    pub fn where_column(
        self,
        first: impl Into<Ident>,
        operator: &str,
        second: impl Into<Ident>,
    ) -> Self {
        self.add_column_where(first.into(), operator, second.into(), Boolean::And)
    }

    /// OR variant of [`Self::where_column`].
    #[must_use]
    pub fn or_where_column(
        self,
        first: impl Into<Ident>,
        operator: &str,
        second: impl Into<Ident>,
    ) -> Self {
        self.add_column_where(first.into(), operator, second.into(), Boolean::Or)
    }

    fn add_in_where(mut self, column: Ident, values: Vec<Operand>, boolean: Boolean, not: bool) -> Self {
        for value in &values {
            self.bind_where(value);
        }
        let kind = if not {
            WhereKind::NotIn { column, values }
        } else {
            WhereKind::In { column, values }
        };
        self.push_where(boolean, kind)
    }

    /// Adds `column IN (values)`. An empty list never matches.
    #[must_use]
    pub fn where_in<I, V>(self, column: impl Into<Ident>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.add_in_where(column.into(), values, Boolean::And, false)
    }

    /// OR variant of [`Self::where_in`].
    #[must_use]
    pub fn or_where_in<I, V>(self, column: impl Into<Ident>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.add_in_where(column.into(), values, Boolean::Or, false)
    }

    /// Adds `column NOT IN (values)`. An empty list always matches.
    #[must_use]
    pub fn where_not_in<I, V>(self, column: impl Into<Ident>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.add_in_where(column.into(), values, Boolean::And, true)
    }

    /// OR variant of [`Self::where_not_in`].
    #[must_use]
    pub fn or_where_not_in<I, V>(self, column: impl Into<Ident>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        let values = values.into_iter().map(Into::into).collect();
        self.add_in_where(column.into(), values, Boolean::Or, true)
    }

    fn add_in_sub_where(mut self, column: Ident, sub: Builder<'_>, boolean: Boolean, not: bool) -> Self {
        self.absorb(&sub);
        self.bindings.extend(BindingKind::Where, sub.get_bindings());
        let query = Box::new(sub.query);
        let kind = if not {
            WhereKind::NotInSub { column, query }
        } else {
            WhereKind::InSub { column, query }
        };
        self.push_where(boolean, kind)
    }

    /// Adds `column IN (sub-query)`.
    #[must_use]
    pub fn where_in_sub(self, column: impl Into<Ident>, sub: Builder<'_>) -> Self {
        self.add_in_sub_where(column.into(), sub, Boolean::And, false)
    }

    /// OR variant of [`Self::where_in_sub`].
    #[must_use]
    pub fn or_where_in_sub(self, column: impl Into<Ident>, sub: Builder<'_>) -> Self {
        self.add_in_sub_where(column.into(), sub, Boolean::Or, false)
    }

    /// Adds `column NOT IN (sub-query)`.
    #[must_use]
    pub fn where_not_in_sub(self, column: impl Into<Ident>, sub: Builder<'_>) -> Self {
        self.add_in_sub_where(column.into(), sub, Boolean::And, true)
    }

    /// OR variant of [`Self::where_not_in_sub`].
    #[must_use]
    pub fn or_where_not_in_sub(self, column: impl Into<Ident>, sub: Builder<'_>) -> Self {
        self.add_in_sub_where(column.into(), sub, Boolean::Or, true)
    }

    /// Adds `column IS NULL`.
    #[must_use]
    pub fn where_null(self, column: impl Into<Ident>) -> Self {
        self.push_where(Boolean::And, WhereKind::Null { column: column.into() })
    }

    /// OR variant of [`Self::where_null`].
    #[must_use]
    pub fn or_where_null(self, column: impl Into<Ident>) -> Self {
        self.push_where(Boolean::Or, WhereKind::Null { column: column.into() })
    }

    /// Adds `column IS NOT NULL`.
    #[must_use]
    pub fn where_not_null(self, column: impl Into<Ident>) -> Self {
        self.push_where(Boolean::And, WhereKind::NotNull { column: column.into() })
    }

    /// OR variant of [`Self::where_not_null`].
    #[must_use]
    pub fn or_where_not_null(self, column: impl Into<Ident>) -> Self {
        self.push_where(Boolean::Or, WhereKind::NotNull { column: column.into() })
    }

    fn add_between_where(
        mut self,
        column: Ident,
        low: Operand,
        high: Operand,
        boolean: Boolean,
        not: bool,
    ) -> Self {
        self.bind_where(&low);
        self.bind_where(&high);
        self.push_where(
            boolean,
            WhereKind::Between {
                column,
                low,
                high,
                not,
            },
        )
    }

    /// Adds `column BETWEEN low AND high`.
    #[must_use]
    pub fn where_between(
        self,
        column: impl Into<Ident>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        self.add_between_where(column.into(), low.into(), high.into(), Boolean::And, false)
    }

    /// OR variant of [`Self::where_between`].
    #[must_use]
    pub fn or_where_between(
        self,
        column: impl Into<Ident>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        self.add_between_where(column.into(), low.into(), high.into(), Boolean::Or, false)
    }

    /// Adds `column NOT BETWEEN low AND high`.
    #[must_use]
    pub fn where_not_between(
        self,
        column: impl Into<Ident>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        self.add_between_where(column.into(), low.into(), high.into(), Boolean::And, true)
    }

    /// OR variant of [`Self::where_not_between`].
    #[must_use]
    pub fn or_where_not_between(
        self,
        column: impl Into<Ident>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        self.add_between_where(column.into(), low.into(), high.into(), Boolean::Or, true)
    }

    fn add_exists_where(mut self, sub: Builder<'_>, boolean: Boolean, not: bool) -> Self {
        self.absorb(&sub);
        self.bindings.extend(BindingKind::Where, sub.get_bindings());
        let query = Box::new(sub.query);
        let kind = if not {
            WhereKind::NotExists { query }
        } else {
            WhereKind::Exists { query }
        };
        self.push_where(boolean, kind)
    }

    /// Adds `EXISTS (sub-query)`.
    #[must_use]
    pub fn where_exists(self, sub: Builder<'_>) -> Self {
        self.add_exists_where(sub, Boolean::And, false)
    }

    /// OR variant of [`Self::where_exists`].
    #[must_use]
    pub fn or_where_exists(self, sub: Builder<'_>) -> Self {
        self.add_exists_where(sub, Boolean::Or, false)
    }

    /// Adds `NOT EXISTS (sub-query)`.
    #[must_use]
    pub fn where_not_exists(self, sub: Builder<'_>) -> Self {
        self.add_exists_where(sub, Boolean::And, true)
    }

    /// OR variant of [`Self::where_not_exists`].
    #[must_use]
    pub fn or_where_not_exists(self, sub: Builder<'_>) -> Self {
        self.add_exists_where(sub, Boolean::Or, true)
    }

    fn add_date_where(
        mut self,
        part: DatePart,
        column: Ident,
        operator: &str,
        value: Operand,
        boolean: Boolean,
    ) -> Self {
        if !self.valid_operator(operator) {
            return self.fail(format!("invalid operator: {operator}"));
        }
        let value = match value {
            Operand::Value(v) => Operand::Value(self.grammar.date_part_binding(part, v)),
            raw @ Operand::Raw(_) => raw,
        };
        self.bind_where(&value);
        self.push_where(
            boolean,
            WhereKind::Date {
                part,
                column,
                operator: operator.to_string(),
                value,
            },
        )
    }

    /// Compares the date part of a column.
    #[must_use]
    pub fn where_date(self, column: impl Into<Ident>, operator: &str, value: impl Into<Operand>) -> Self {
        self.add_date_where(DatePart::Date, column.into(), operator, value.into(), Boolean::And)
    }

    /// OR variant of [`Self::where_date`].
    #[must_use]
    pub fn or_where_date(
        self,
        column: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.add_date_where(DatePart::Date, column.into(), operator, value.into(), Boolean::Or)
    }

    /// Compares the day of month of a column.
    #[must_use]
    pub fn where_day(self, column: impl Into<Ident>, operator: &str, value: impl Into<Operand>) -> Self {
        self.add_date_where(DatePart::Day, column.into(), operator, value.into(), Boolean::And)
    }

    /// OR variant of [`Self::where_day`].
    #[must_use]
    pub fn or_where_day(
        self,
        column: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.add_date_where(DatePart::Day, column.into(), operator, value.into(), Boolean::Or)
    }

    /// Compares the month of a column.
    #[must_use]
    pub fn where_month(
        self,
        column: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.add_date_where(DatePart::Month, column.into(), operator, value.into(), Boolean::And)
    }

    /// OR variant of [`Self::where_month`].
    #[must_use]
    pub fn or_where_month(
        self,
        column: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.add_date_where(DatePart::Month, column.into(), operator, value.into(), Boolean::Or)
    }

    /// Compares the year of a column.
    #[must_use]
    pub fn where_year(self, column: impl Into<Ident>, operator: &str, value: impl Into<Operand>) -> Self {
        self.add_date_where(DatePart::Year, column.into(), operator, value.into(), Boolean::And)
    }

    /// OR variant of [`Self::where_year`].
    #[must_use]
    pub fn or_where_year(
        self,
        column: impl Into<Ident>,
        operator: &str,
        value: impl Into<Operand>,
    ) -> Self {
        self.add_date_where(DatePart::Year, column.into(), operator, value.into(), Boolean::Or)
    }

    /// Adds a raw predicate with its bindings.
    #[must_use]
    pub fn where_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.bindings.extend(BindingKind::Where, bindings);
        self.push_where(Boolean::And, WhereKind::Raw { sql: sql.to_string() })
    }

    /// OR variant of [`Self::where_raw`].
    #[must_use]
    pub fn or_where_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.bindings.extend(BindingKind::Where, bindings);
        self.push_where(Boolean::Or, WhereKind::Raw { sql: sql.to_string() })
    }

    /// Runs `scope` and wraps any predicates it added in their own group.
    #[must_use]
    pub fn apply_scope<F>(self, scope: F) -> Self
    where
        F: FnOnce(Self) -> Self,
    {
        let before = self.query.wheres.len();
        let mut scoped = scope(self);
        if before > 0 && scoped.query.wheres.len() > before {
            let tail = scoped.query.wheres.split_off(before);
            let boolean = tail[0].boolean;
            let query = Query {
                wheres: tail,
                ..Query::default()
            };
            scoped.query.wheres.push(Where {
                boolean,
                kind: WhereKind::Nested {
                    query: Box::new(query),
                },
            });
        }
        scoped
    }

    // ----- grouping -----

    /// Adds GROUP BY columns.
    #[must_use]
    pub fn group_by<I, C>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Ident>,
    {
        self.query.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    fn add_having(mut self, column: Ident, operator: &str, value: Operand, boolean: Boolean) -> Self {
        if !self.valid_operator(operator) {
            return self.fail(format!("invalid operator: {operator}"));
        }
        if let Some(v) = value.binding() {
            self.bindings.add(BindingKind::Having, v.clone());
        }
        self.query.havings.push(Where {
            boolean,
            kind: WhereKind::Basic {
                column,
                operator: operator.to_string(),
                value,
            },
        });
        self
    }

    /// Adds `HAVING column operator value`.
    #[must_use]
    pub fn having(self, column: impl Into<Ident>, operator: &str, value: impl Into<Operand>) -> Self {
        self.add_having(column.into(), operator, value.into(), Boolean::And)
    }

    /// OR variant of [`Self::having`].
    #[must_use]
    pub fn or_having(self, column: impl Into<Ident>, operator: &str, value: impl Into<Operand>) -> Self {
        self.add_having(column.into(), operator, value.into(), Boolean::Or)
    }

    /// Adds a raw HAVING predicate.
    #[must_use]
    pub fn having_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.bindings.extend(BindingKind::Having, bindings);
        self.query.havings.push(Where {
            boolean: Boolean::And,
            kind: WhereKind::Raw { sql: sql.to_string() },
        });
        self
    }

    /// OR variant of [`Self::having_raw`].
    #[must_use]
    pub fn or_having_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        self.bindings.extend(BindingKind::Having, bindings);
        self.query.havings.push(Where {
            boolean: Boolean::Or,
            kind: WhereKind::Raw { sql: sql.to_string() },
        });
        self
    }

    // ----- ordering and window -----

    // Once unions exist, ordering and window apply to the whole union.
    fn window_mut(&mut self) -> &mut Window {
        if self.query.unions.is_empty() {
            &mut self.query.window
        } else {
            &mut self.query.union_window
        }
    }

    /// Adds an ORDER BY column.
    #[must_use]
    pub fn order_by(mut self, column: impl Into<Ident>, direction: Direction) -> Self {
        self.window_mut().orders.push(Order::Column {
            column: column.into(),
            direction,
        });
        self
    }

    /// Adds a descending ORDER BY column.
    #[must_use]
    pub fn order_by_desc(self, column: impl Into<Ident>) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Adds a raw ORDER BY item with its bindings.
    #[must_use]
    pub fn order_by_raw(mut self, sql: &str, bindings: Vec<SqlValue>) -> Self {
        let kind = if self.query.unions.is_empty() {
            BindingKind::Order
        } else {
            BindingKind::Union
        };
        self.bindings.extend(kind, bindings);
        self.window_mut().orders.push(Order::Raw(sql.to_string()));
        self
    }

    /// Newest first by `created_at`.
    #[must_use]
    pub fn latest(self) -> Self {
        self.order_by("created_at", Direction::Desc)
    }

    /// Newest first by `column`.
    #[must_use]
    pub fn latest_by(self, column: impl Into<Ident>) -> Self {
        self.order_by(column, Direction::Desc)
    }

    /// Oldest first by `created_at`.
    #[must_use]
    pub fn oldest(self) -> Self {
        self.order_by("created_at", Direction::Asc)
    }

    /// Oldest first by `column`.
    #[must_use]
    pub fn oldest_by(self, column: impl Into<Ident>) -> Self {
        self.order_by(column, Direction::Asc)
    }

    /// Sets the row limit. Negative values are rejected.
    #[must_use]
    pub fn limit(mut self, value: i64) -> Self {
        match u64::try_from(value) {
            Ok(limit) => {
                self.window_mut().limit = Some(limit);
                self
            }
            Err(_) => self.fail(format!("limit must not be negative, got {value}")),
        }
    }

    /// Sets the row offset. Negative values are clamped to zero.
    #[must_use]
    pub fn offset(mut self, value: i64) -> Self {
        self.window_mut().offset = Some(value.max(0).unsigned_abs());
        self
    }

    /// Alias of [`Self::limit`].
    #[must_use]
    pub fn take(self, value: i64) -> Self {
        self.limit(value)
    }

    /// Alias of [`Self::offset`].
    #[must_use]
    pub fn skip(self, value: i64) -> Self {
        self.offset(value)
    }

    /// Selects the 1-based `page` of `per_page` rows.
    #[must_use]
    pub fn for_page(mut self, page: u64, per_page: u64) -> Self {
        let window = self.window_mut();
        window.offset = Some(page.saturating_sub(1).saturating_mul(per_page));
        window.limit = Some(per_page);
        self
    }

    // ----- unions and locks -----

    fn add_union(mut self, other: Builder<'_>, all: bool) -> Self {
        self.absorb(&other);
        self.bindings.extend(BindingKind::Union, other.get_bindings());
        self.query.unions.push(Union {
            query: Box::new(other.query),
            all,
        });
        self
    }

    /// Appends a UNION branch.
    #[must_use]
    pub fn union(self, other: Builder<'_>) -> Self {
        self.add_union(other, false)
    }

    /// Appends a UNION ALL branch.
    #[must_use]
    pub fn union_all(self, other: Builder<'_>) -> Self {
        self.add_union(other, true)
    }

    /// Sets the lock: `true` for update, `false` for shared, or raw SQL.
    #[must_use]
    pub fn lock(mut self, lock: impl Into<Lock>) -> Self {
        self.query.lock = Some(lock.into());
        self
    }

    /// Locks the selected rows for update.
    #[must_use]
    pub fn lock_for_update(self) -> Self {
        self.lock(Lock::ForUpdate)
    }

    /// Takes a shared lock on the selected rows.
    #[must_use]
    pub fn shared_lock(self) -> Self {
        self.lock(Lock::Shared)
    }

    // ----- compilation -----

    /// Compiles the SELECT.
    ///
    /// # Errors
    ///
    /// Returns the first argument error recorded while building.
    pub fn to_sql(&self) -> Result<String> {
        self.check()?;
        Ok(self.grammar.compile_select(&self.query))
    }

    /// Compiles the SELECT and returns it with its flattened bindings.
    ///
    /// # Errors
    ///
    /// Returns the first argument error recorded while building.
    pub fn to_sql_with_bindings(&self) -> Result<(String, Vec<SqlValue>)> {
        Ok((self.to_sql()?, self.get_bindings()))
    }

    fn require_connection(&self) -> Result<&'c Connection> {
        self.connection
            .ok_or_else(|| Error::invalid("query builder is not bound to a connection"))
    }

    // ----- reads -----

    /// Runs the SELECT.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn get(&self) -> Result<Vec<Row>> {
        let (sql, bindings) = self.to_sql_with_bindings()?;
        self.require_connection()?.select(&sql, &bindings).await
    }

    /// Runs the SELECT with `columns` when none were selected.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn get_columns<I, C>(&self, columns: I) -> Result<Vec<Row>>
    where
        I: IntoIterator<Item = C>,
        C: Into<Ident>,
    {
        if self.query.columns.is_empty() {
            self.clone().select(columns).get().await
        } else {
            self.get().await
        }
    }

    /// Returns the first row.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn first(&self) -> Result<Option<Row>> {
        Ok(self.clone().take(1).get().await?.into_iter().next())
    }

    /// Returns the row whose `id` equals `id`.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn find(&self, id: impl Into<Operand>) -> Result<Option<Row>> {
        self.clone().where_eq("id", id).first().await
    }

    /// Returns one column of the first row.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn pluck(&self, column: impl Into<Ident>) -> Result<Option<SqlValue>> {
        let row = self.clone().select([column]).first().await?;
        Ok(row.and_then(|row| row.into_values().into_iter().next()))
    }

    /// Same as [`Self::pluck`].
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn value(&self, column: impl Into<Ident>) -> Result<Option<SqlValue>> {
        self.pluck(column).await
    }

    /// Returns one column of every row.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn lists(&self, column: impl Into<Ident>) -> Result<Vec<SqlValue>> {
        let rows = self.clone().select([column]).get().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.into_values().into_iter().next())
            .collect())
    }

    /// Returns `(key, value)` pairs of two columns of every row.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn lists_keyed(
        &self,
        column: impl Into<Ident>,
        key: impl Into<Ident>,
    ) -> Result<Vec<(SqlValue, SqlValue)>> {
        let rows = self
            .clone()
            .select([column.into(), key.into()])
            .get()
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut values = row.into_values().into_iter();
                let value = values.next().unwrap_or(SqlValue::Null);
                let key = values.next().unwrap_or(SqlValue::Null);
                (key, value)
            })
            .collect())
    }

    /// Concatenates one column of every row.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn implode(&self, column: impl Into<Ident>, glue: &str) -> Result<String> {
        let values = self.lists(column).await?;
        Ok(values
            .iter()
            .map(|value| match value {
                SqlValue::Text(s) => s.clone(),
                SqlValue::Null => String::new(),
                other => other.to_sql_inline(),
            })
            .collect::<Vec<_>>()
            .join(glue))
    }

    /// Returns `true` when the query matches at least one row.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn exists(&self) -> Result<bool> {
        self.check()?;
        let sql = self.grammar.compile_exists(&self.query);
        let rows = self
            .require_connection()?
            .select(&sql, &self.get_bindings())
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .and_then(SqlValue::as_i64)
            .is_some_and(|n| n != 0))
    }

    // ----- aggregates -----

    /// Runs an aggregate function and returns its value (NULL as `None`).
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn aggregate(&self, function: &str, columns: &[&str]) -> Result<Option<SqlValue>> {
        let mut query = self.clone();
        query.query.columns.clear();
        query.bindings.set(BindingKind::Select, Vec::new());
        query.query.aggregate = Some(Aggregate {
            function: function.to_string(),
            columns: columns.iter().map(|c| Ident::from(*c)).collect(),
        });
        let rows = query.get().await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_values().into_iter().next())
            .filter(|value| !value.is_null()))
    }

    /// Counts matching rows.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn count(&self) -> Result<i64> {
        self.count_column("*").await
    }

    /// Counts non-NULL values of a column.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn count_column(&self, column: &str) -> Result<i64> {
        let value = self.aggregate("count", &[column]).await?;
        Ok(value.as_ref().and_then(SqlValue::as_i64).unwrap_or(0))
    }

    /// Smallest value of a column.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn min(&self, column: &str) -> Result<Option<SqlValue>> {
        self.aggregate("min", &[column]).await
    }

    /// Largest value of a column.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn max(&self, column: &str) -> Result<Option<SqlValue>> {
        self.aggregate("max", &[column]).await
    }

    /// Sum of a column, zero when no rows match.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn sum(&self, column: &str) -> Result<SqlValue> {
        Ok(self
            .aggregate("sum", &[column])
            .await?
            .unwrap_or(SqlValue::Int(0)))
    }

    /// Average of a column.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn avg(&self, column: &str) -> Result<Option<f64>> {
        Ok(self
            .aggregate("avg", &[column])
            .await?
            .as_ref()
            .and_then(SqlValue::as_f64))
    }

    // ----- pagination -----

    /// Counts the rows the query would return without its ordering, limit
    /// and offset. Those are restored afterwards, even on failure.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn get_count_for_pagination(&mut self) -> Result<i64> {
        let window = std::mem::take(&mut self.query.window);
        let order_bindings = self.bindings.take(BindingKind::Order);
        let total = if self.query.groups.is_empty() {
            self.count().await
        } else {
            self.count_groups().await
        };
        self.query.window = window;
        self.bindings.set(BindingKind::Order, order_bindings);
        total
    }

    async fn count_groups(&self) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) AS aggregate FROM ({}) AS {}",
            self.to_sql()?,
            self.grammar.wrap_value("aggregate_table")
        );
        let rows = self
            .require_connection()?
            .select(&sql, &self.get_bindings())
            .await?;
        Ok(rows
            .first()
            .and_then(|row| row.get_index(0))
            .and_then(SqlValue::as_i64)
            .unwrap_or(0))
    }

    /// Returns one page together with the total row count.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn paginate(mut self, per_page: u64, page: u64) -> Result<LengthAwarePaginator> {
        let total = self.get_count_for_pagination().await?;
        let total = u64::try_from(total).unwrap_or(0);
        let items = if total == 0 {
            Vec::new()
        } else {
            self.for_page(page, per_page).get().await?
        };
        Ok(LengthAwarePaginator::new(items, total, per_page, page))
    }

    /// Returns one page and whether another one follows, without counting.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn simple_paginate(self, per_page: u64, page: u64) -> Result<Paginator> {
        let mut query = self.for_page(page, per_page);
        query.window_mut().limit = Some(per_page.saturating_add(1));
        let items = query.get().await?;
        Ok(Paginator::new(items, per_page, page))
    }

    /// Streams the results page by page, `size` rows at a time.
    pub fn chunk(self, size: u64) -> impl Stream<Item = Result<Vec<Row>>> + 'c {
        stream::try_unfold((self, 1_u64, false), move |(builder, page, done)| async move {
            if done || size == 0 {
                return Ok(None);
            }
            let rows = builder.clone().for_page(page, size).get().await?;
            if rows.is_empty() {
                return Ok(None);
            }
            let last = (rows.len() as u64) < size;
            debug!(page, rows = rows.len(), "fetched chunk");
            Ok::<_, Error>(Some((rows, (builder, page + 1, last))))
        })
    }

    // ----- writes -----

    /// Inserts one record.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn insert(&self, record: Record) -> Result<bool> {
        self.insert_many(vec![record]).await
    }

    /// Inserts several records. Columns are ordered by name.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn insert_many(&self, records: Vec<Record>) -> Result<bool> {
        self.check()?;
        if records.is_empty() {
            return Ok(true);
        }
        let records: Vec<Record> = records.iter().map(Record::sorted).collect();
        let sql = self.grammar.compile_insert(&self.query, &records)?;
        let bindings: Vec<SqlValue> = records.iter().flat_map(Record::bindings).collect();
        self.require_connection()?.insert(&sql, &bindings).await
    }

    /// Inserts a record and returns its new primary key.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn insert_get_id(&self, record: Record, sequence: Option<&str>) -> Result<i64> {
        self.check()?;
        let record = record.sorted();
        let sql = self
            .grammar
            .compile_insert_get_id(&self.query, &record, sequence.unwrap_or("id"))?;
        let bindings = record.bindings();
        let connection = self.require_connection()?;
        if self.grammar.returns_inserted_id() {
            let rows = connection.select_from_write(&sql, &bindings).await?;
            Ok(rows
                .first()
                .and_then(|row| row.get_index(0))
                .and_then(SqlValue::as_i64)
                .unwrap_or(0))
        } else {
            connection.insert_get_id(&sql, &bindings).await
        }
    }

    /// Updates matching rows and returns how many were affected.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn update(&self, values: Record) -> Result<u64> {
        self.check()?;
        let sql = self.grammar.compile_update(&self.query, &values)?;
        let bindings = self
            .grammar
            .update_bindings(&self.query, &self.bindings, &values);
        self.require_connection()?.update(&sql, &bindings).await
    }

    /// Adds `amount` to a column.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn increment(&self, column: &str, amount: i64) -> Result<u64> {
        self.increment_with(column, amount, Record::new()).await
    }

    /// Adds `amount` to a column and sets `extra` columns in the same update.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn increment_with(&self, column: &str, amount: i64, extra: Record) -> Result<u64> {
        self.step(column, '+', amount, extra).await
    }

    /// Subtracts `amount` from a column.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn decrement(&self, column: &str, amount: i64) -> Result<u64> {
        self.decrement_with(column, amount, Record::new()).await
    }

    /// Subtracts `amount` from a column and sets `extra` columns.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn decrement_with(&self, column: &str, amount: i64, extra: Record) -> Result<u64> {
        self.step(column, '-', amount, extra).await
    }

    async fn step(&self, column: &str, sign: char, amount: i64, extra: Record) -> Result<u64> {
        let wrapped = self.grammar.wrap_name(column);
        let mut values = Record::new().set(column, raw(format!("{wrapped} {sign} {amount}")));
        values.merge(extra);
        self.update(values).await
    }

    /// Deletes matching rows and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn delete(&self) -> Result<u64> {
        self.check()?;
        let sql = self.grammar.compile_delete(&self.query)?;
        let bindings = self.grammar.delete_bindings(&self.query, &self.bindings);
        self.require_connection()?.delete(&sql, &bindings).await
    }

    /// Deletes the row whose `id` equals `id`.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn delete_id(&self, id: impl Into<Operand>) -> Result<u64> {
        self.clone().where_eq("id", id).delete().await
    }

    /// Empties the table.
    ///
    /// # Errors
    ///
    /// Returns argument errors and query failures.
    pub async fn truncate(&self) -> Result<()> {
        self.check()?;
        let connection = self.require_connection()?;
        for (sql, bindings) in self.grammar.compile_truncate(&self.query)? {
            connection.statement(&sql, &bindings).await?;
        }
        Ok(())
    }
}
