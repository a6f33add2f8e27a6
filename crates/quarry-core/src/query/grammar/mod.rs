//! Query grammars.
//!
//! A grammar turns a [`Query`] into SQL text for one database. The trait
//! carries the generic compilation; dialects override the pieces that differ
//! (quoting, limits, locks, date functions, update/delete with joins).

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;
pub use sqlite::SqliteGrammar;

use crate::error::{Error, Result};
use crate::expression::{Ident, Record};
use crate::grammar::{concatenate, Grammar};
use crate::value::SqlValue;

use super::ast::{
    Aggregate, DatePart, Join, JoinTarget, JoinType, Lock, Order, Query, Where, WhereKind, Window,
};
use super::bindings::{BindingKind, Bindings};

/// Comparison operators understood by every dialect.
pub const BASE_OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "like", "like binary", "not like", "between", "ilike",
    "&", "|", "^", "<<", ">>", "rlike", "regexp", "not regexp", "~", "~*", "!~", "!~*",
    "similar to", "not similar to",
];

/// A truncate compiles to one or more statements, each with its bindings.
pub type Statements = Vec<(String, Vec<SqlValue>)>;

/// Dialect-specific compilation of queries.
pub trait QueryGrammar: Grammar {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the operators this dialect accepts.
    fn operators(&self) -> &'static [&'static str] {
        BASE_OPERATORS
    }

    /// Checks an operator against the allow-list (case-insensitive).
    fn is_valid_operator(&self, operator: &str) -> bool {
        let operator = operator.to_ascii_lowercase();
        self.operators().contains(&operator.as_str())
    }

    /// Compiles a SELECT.
    fn compile_select(&self, query: &Query) -> String {
        let mut sql = concatenate(&[
            self.compile_projection(query),
            self.compile_from(query),
            self.compile_joins(&query.joins),
            self.compile_wheres(&query.wheres),
            self.compile_groups(&query.groups),
            self.compile_havings(&query.havings),
            self.compile_orders(&query.window.orders),
            self.compile_limit(&query.window),
            self.compile_offset(&query.window),
        ]);
        if !query.unions.is_empty() {
            sql = concatenate(&[self.wrap_union(sql), self.compile_unions(query)]);
        }
        if let Some(lock) = &query.lock {
            sql = concatenate(&[sql, self.compile_lock(lock)]);
        }
        sql
    }

    /// Compiles `SELECT EXISTS(...)`.
    fn compile_exists(&self, query: &Query) -> String {
        format!(
            "SELECT EXISTS({}) AS {}",
            self.compile_select(query),
            self.wrap_value("exists")
        )
    }

    /// Compiles the projection: the aggregate when set, otherwise the columns.
    fn compile_projection(&self, query: &Query) -> String {
        match &query.aggregate {
            Some(aggregate) => self.compile_aggregate(query, aggregate),
            None => self.compile_columns(query),
        }
    }

    /// Compiles `SELECT FUNC(col) AS aggregate`.
    fn compile_aggregate(&self, query: &Query, aggregate: &Aggregate) -> String {
        let mut column = self.columnize(&aggregate.columns);
        if column.is_empty() {
            column = String::from("*");
        }
        if query.distinct && column != "*" {
            column = format!("DISTINCT {column}");
        }
        format!(
            "SELECT {}({column}) AS aggregate",
            aggregate.function.to_ascii_uppercase()
        )
    }

    /// Compiles the select list.
    fn compile_columns(&self, query: &Query) -> String {
        let select = if query.distinct {
            "SELECT DISTINCT"
        } else {
            "SELECT"
        };
        if query.columns.is_empty() {
            format!("{select} *")
        } else {
            format!("{select} {}", self.columnize(&query.columns))
        }
    }

    /// Compiles `FROM table`.
    fn compile_from(&self, query: &Query) -> String {
        query
            .from
            .as_ref()
            .map_or_else(String::new, |table| format!("FROM {}", self.wrap_table(table)))
    }

    /// Compiles the join clauses.
    fn compile_joins(&self, joins: &[Join]) -> String {
        joins
            .iter()
            .map(|join| {
                let table = self.wrap_table(&join.table);
                if join.kind == JoinType::Cross && join.conditions.is_empty() {
                    format!("CROSS JOIN {table}")
                } else {
                    format!(
                        "{} JOIN {table} ON {}",
                        join.kind.as_str(),
                        self.compile_join_conditions(join)
                    )
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Compiles the `ON` conditions of a join, without a leading keyword.
    fn compile_join_conditions(&self, join: &Join) -> String {
        join.conditions
            .iter()
            .enumerate()
            .map(|(i, condition)| {
                let second = match &condition.second {
                    JoinTarget::Column(column) => self.wrap(column),
                    JoinTarget::Value(value) => self.parameter(value),
                };
                let clause = format!(
                    "{} {} {second}",
                    self.wrap(&condition.first),
                    condition.operator
                );
                if i == 0 {
                    clause
                } else {
                    format!("{} {clause}", condition.boolean.as_str())
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Compiles `WHERE ...`, or nothing when there are no predicates.
    fn compile_wheres(&self, wheres: &[Where]) -> String {
        if wheres.is_empty() {
            return String::new();
        }
        format!("WHERE {}", self.compile_where_list(wheres))
    }

    /// Compiles predicates joined by their booleans, leading boolean removed.
    fn compile_where_list(&self, wheres: &[Where]) -> String {
        wheres
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let clause = self.compile_where(&w.kind);
                if i == 0 {
                    clause
                } else {
                    format!("{} {clause}", w.boolean.as_str())
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Compiles a single predicate.
    fn compile_where(&self, kind: &WhereKind) -> String {
        match kind {
            WhereKind::Basic {
                column,
                operator,
                value,
            } => format!("{} {operator} {}", self.wrap(column), self.parameter(value)),
            WhereKind::Column {
                first,
                operator,
                second,
            } => format!("{} {operator} {}", self.wrap(first), self.wrap(second)),
            WhereKind::Nested { query } => {
                format!("({})", self.compile_where_list(&query.wheres))
            }
            WhereKind::Sub {
                column,
                operator,
                query,
            } => format!(
                "{} {operator} ({})",
                self.wrap(column),
                self.compile_select(query)
            ),
            WhereKind::In { column, values } => {
                if values.is_empty() {
                    String::from("0 = 1")
                } else {
                    format!("{} IN ({})", self.wrap(column), self.parameterize(values))
                }
            }
            WhereKind::NotIn { column, values } => {
                if values.is_empty() {
                    String::from("1 = 1")
                } else {
                    format!(
                        "{} NOT IN ({})",
                        self.wrap(column),
                        self.parameterize(values)
                    )
                }
            }
            WhereKind::InSub { column, query } => {
                format!("{} IN ({})", self.wrap(column), self.compile_select(query))
            }
            WhereKind::NotInSub { column, query } => format!(
                "{} NOT IN ({})",
                self.wrap(column),
                self.compile_select(query)
            ),
            WhereKind::Null { column } => format!("{} IS NULL", self.wrap(column)),
            WhereKind::NotNull { column } => format!("{} IS NOT NULL", self.wrap(column)),
            WhereKind::Between {
                column,
                low,
                high,
                not,
            } => format!(
                "{} {}BETWEEN {} AND {}",
                self.wrap(column),
                if *not { "NOT " } else { "" },
                self.parameter(low),
                self.parameter(high)
            ),
            WhereKind::Exists { query } => format!("EXISTS ({})", self.compile_select(query)),
            WhereKind::NotExists { query } => {
                format!("NOT EXISTS ({})", self.compile_select(query))
            }
            WhereKind::Date {
                part,
                column,
                operator,
                value,
            } => format!(
                "{} {operator} {}",
                self.compile_date_part(*part, &self.wrap(column)),
                self.parameter(value)
            ),
            WhereKind::Raw { sql } => sql.clone(),
        }
    }

    /// Extracts a date component from an already wrapped column.
    fn compile_date_part(&self, part: DatePart, column: &str) -> String {
        let function = match part {
            DatePart::Date => "DATE",
            DatePart::Day => "DAY",
            DatePart::Month => "MONTH",
            DatePart::Year => "YEAR",
        };
        format!("{function}({column})")
    }

    /// Adjusts a value bound against a date component.
    fn date_part_binding(&self, _part: DatePart, value: SqlValue) -> SqlValue {
        value
    }

    /// Compiles `GROUP BY`.
    fn compile_groups(&self, groups: &[Ident]) -> String {
        if groups.is_empty() {
            return String::new();
        }
        format!("GROUP BY {}", self.columnize(groups))
    }

    /// Compiles `HAVING`.
    fn compile_havings(&self, havings: &[Where]) -> String {
        if havings.is_empty() {
            return String::new();
        }
        format!("HAVING {}", self.compile_where_list(havings))
    }

    /// Compiles `ORDER BY`.
    fn compile_orders(&self, orders: &[Order]) -> String {
        if orders.is_empty() {
            return String::new();
        }
        let items: Vec<String> = orders
            .iter()
            .map(|order| match order {
                Order::Column { column, direction } => {
                    format!("{} {}", self.wrap(column), direction.as_str())
                }
                Order::Raw(sql) => sql.clone(),
            })
            .collect();
        format!("ORDER BY {}", items.join(", "))
    }

    /// Compiles `LIMIT`.
    fn compile_limit(&self, window: &Window) -> String {
        window
            .limit
            .map_or_else(String::new, |limit| format!("LIMIT {limit}"))
    }

    /// Compiles `OFFSET`.
    fn compile_offset(&self, window: &Window) -> String {
        window
            .offset
            .map_or_else(String::new, |offset| format!("OFFSET {offset}"))
    }

    /// Wraps one branch of a union.
    fn wrap_union(&self, sql: String) -> String {
        sql
    }

    /// Compiles the union branches and the union-level window.
    fn compile_unions(&self, query: &Query) -> String {
        let mut parts: Vec<String> = query
            .unions
            .iter()
            .map(|union| {
                let keyword = if union.all { "UNION ALL" } else { "UNION" };
                format!(
                    "{keyword} {}",
                    self.wrap_union(self.compile_select(&union.query))
                )
            })
            .collect();
        parts.push(self.compile_orders(&query.union_window.orders));
        parts.push(self.compile_limit(&query.union_window));
        parts.push(self.compile_offset(&query.union_window));
        concatenate(&parts)
    }

    /// Compiles a lock clause. Dialects without row locks emit nothing.
    fn compile_lock(&self, lock: &Lock) -> String {
        match lock {
            Lock::Raw(sql) => sql.clone(),
            Lock::Shared | Lock::ForUpdate => String::new(),
        }
    }

    /// Returns the wrapped target table or an error when none is set.
    fn table_of(&self, query: &Query) -> Result<String> {
        query
            .from
            .as_ref()
            .map(|table| self.wrap_table(table))
            .ok_or_else(|| Error::invalid("no table selected"))
    }

    /// Compiles an INSERT of one or more records sharing the same columns.
    fn compile_insert(&self, query: &Query, records: &[Record]) -> Result<String> {
        let table = self.table_of(query)?;
        let columns = insert_columns(records)?;
        if columns.is_empty() {
            return Ok(self.compile_insert_default(&table));
        }
        let values: Vec<String> = records
            .iter()
            .map(|record| format!("({})", self.record_parameters(record)))
            .collect();
        Ok(format!(
            "INSERT INTO {table} ({}) VALUES {}",
            self.columnize_names(&columns),
            values.join(", ")
        ))
    }

    /// Compiles an INSERT of a row made only of defaults.
    fn compile_insert_default(&self, table: &str) -> String {
        format!("INSERT INTO {table} DEFAULT VALUES")
    }

    /// Joins the parameters of a record in column order.
    fn record_parameters(&self, record: &Record) -> String {
        record
            .iter()
            .map(|(_, value)| self.parameter(value))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns `true` when the insert statement itself yields the new id.
    fn returns_inserted_id(&self) -> bool {
        false
    }

    /// Compiles an INSERT whose new primary key is read back.
    fn compile_insert_get_id(&self, query: &Query, record: &Record, _sequence: &str) -> Result<String> {
        self.compile_insert(query, std::slice::from_ref(record))
    }

    /// Compiles `col = ?` assignments.
    fn compile_assignments(&self, values: &Record) -> String {
        values
            .iter()
            .map(|(column, value)| format!("{} = {}", self.wrap_name(column), self.parameter(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Compiles an UPDATE.
    fn compile_update(&self, query: &Query, values: &Record) -> Result<String> {
        let table = self.table_of(query)?;
        if values.is_empty() {
            return Err(Error::invalid("update requires at least one column"));
        }
        if !query.joins.is_empty() {
            return Err(Error::invalid(format!(
                "{} does not support joins in UPDATE",
                self.name()
            )));
        }
        Ok(concatenate(&[
            format!("UPDATE {table} SET {}", self.compile_assignments(values)),
            self.compile_wheres(&query.wheres),
        ]))
    }

    /// Orders the bindings of an UPDATE to match [`Self::compile_update`].
    fn update_bindings(&self, _query: &Query, bindings: &Bindings, values: &Record) -> Vec<SqlValue> {
        let mut out = values.bindings();
        out.extend(bindings.collect(&[BindingKind::Join, BindingKind::Where]));
        out
    }

    /// Compiles a DELETE.
    fn compile_delete(&self, query: &Query) -> Result<String> {
        let table = self.table_of(query)?;
        if !query.joins.is_empty() {
            return Err(Error::invalid(format!(
                "{} does not support joins in DELETE",
                self.name()
            )));
        }
        Ok(concatenate(&[
            format!("DELETE FROM {table}"),
            self.compile_wheres(&query.wheres),
        ]))
    }

    /// Orders the bindings of a DELETE to match [`Self::compile_delete`].
    fn delete_bindings(&self, _query: &Query, bindings: &Bindings) -> Vec<SqlValue> {
        bindings.collect(&[BindingKind::Join, BindingKind::Where])
    }

    /// Compiles the statements that empty a table.
    fn compile_truncate(&self, query: &Query) -> Result<Statements> {
        Ok(vec![(format!("TRUNCATE {}", self.table_of(query)?), vec![])])
    }
}

/// Returns the shared column list of a batch of records.
fn insert_columns(records: &[Record]) -> Result<Vec<String>> {
    let first = records
        .first()
        .ok_or_else(|| Error::invalid("insert requires at least one record"))?;
    let columns: Vec<String> = first.columns().map(String::from).collect();
    for record in &records[1..] {
        if !record.columns().eq(columns.iter().map(String::as_str)) {
            return Err(Error::invalid("every inserted record must have the same columns"));
        }
    }
    Ok(columns)
}

/// Join tables and conditions rendered for `UPDATE ... FROM` and
/// `DELETE ... USING`.
pub(crate) fn join_tables_and_conditions<G: QueryGrammar + ?Sized>(
    grammar: &G,
    joins: &[Join],
) -> (String, String) {
    let tables = joins
        .iter()
        .map(|join| grammar.wrap_table(&join.table))
        .collect::<Vec<_>>()
        .join(", ");
    let conditions = joins
        .iter()
        .filter(|join| !join.conditions.is_empty())
        .map(|join| grammar.compile_join_conditions(join))
        .collect::<Vec<_>>()
        .join(" AND ");
    (tables, conditions)
}

/// Appends the user wheres to join conditions for joined updates/deletes.
pub(crate) fn join_where_clause<G: QueryGrammar + ?Sized>(
    grammar: &G,
    conditions: &str,
    wheres: &[Where],
) -> String {
    match (conditions.is_empty(), wheres.is_empty()) {
        (true, true) => String::new(),
        (true, false) => grammar.compile_wheres(wheres),
        (false, true) => format!("WHERE {conditions}"),
        (false, false) => format!(
            "WHERE {conditions} AND ({})",
            grammar.compile_where_list(wheres)
        ),
    }
}
