//! PostgreSQL query grammar.

use crate::error::{Error, Result};
use crate::expression::Record;
use crate::grammar::{concatenate, Grammar, GrammarConfig, ParameterStyle};
use crate::query::ast::{DatePart, Lock, Query};
use crate::value::SqlValue;

use super::{join_tables_and_conditions, join_where_clause, QueryGrammar, Statements};

const OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "between", "ilike", "not ilike",
    "~~*", "!~~*", "&", "|", "#", "<<", ">>", "@>", "<@", "&&", "~", "~*", "!~", "!~*",
    "similar to", "not similar to",
];

/// PostgreSQL grammar: double-quoted identifiers, `%s` markers unless
/// configured for `?`.
#[derive(Debug, Clone)]
pub struct PostgresGrammar {
    config: GrammarConfig,
}

impl Default for PostgresGrammar {
    fn default() -> Self {
        Self {
            config: GrammarConfig::with_style(ParameterStyle::Format),
        }
    }
}

impl PostgresGrammar {
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
}

impl Grammar for PostgresGrammar {
    fn config(&self) -> &GrammarConfig {
        &self.config
    }
}

impl QueryGrammar for PostgresGrammar {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn operators(&self) -> &'static [&'static str] {
        OPERATORS
    }

    fn compile_lock(&self, lock: &Lock) -> String {
        match lock {
            Lock::ForUpdate => String::from("FOR UPDATE"),
            Lock::Shared => String::from("FOR SHARE"),
            Lock::Raw(sql) => sql.clone(),
        }
    }

    fn compile_date_part(&self, part: DatePart, column: &str) -> String {
        match part {
            DatePart::Date => format!("{column}::date"),
            DatePart::Day => format!("extract(day from {column})"),
            DatePart::Month => format!("extract(month from {column})"),
            DatePart::Year => format!("extract(year from {column})"),
        }
    }

    fn returns_inserted_id(&self) -> bool {
        true
    }

    fn compile_insert_get_id(&self, query: &Query, record: &Record, sequence: &str) -> Result<String> {
        let insert = self.compile_insert(query, std::slice::from_ref(record))?;
        Ok(format!("{insert} RETURNING {}", self.wrap_name(sequence)))
    }

    fn compile_update(&self, query: &Query, values: &Record) -> Result<String> {
        let table = self.table_of(query)?;
        if values.is_empty() {
            return Err(Error::invalid("update requires at least one column"));
        }
        let set = format!("UPDATE {table} SET {}", self.compile_assignments(values));
        if query.joins.is_empty() {
            return Ok(concatenate(&[set, self.compile_wheres(&query.wheres)]));
        }
        let (tables, conditions) = join_tables_and_conditions(self, &query.joins);
        Ok(concatenate(&[
            set,
            format!("FROM {tables}"),
            join_where_clause(self, &conditions, &query.wheres),
        ]))
    }

    fn compile_delete(&self, query: &Query) -> Result<String> {
        let table = self.table_of(query)?;
        if query.joins.is_empty() {
            return Ok(concatenate(&[
                format!("DELETE FROM {table}"),
                self.compile_wheres(&query.wheres),
            ]));
        }
        let (tables, conditions) = join_tables_and_conditions(self, &query.joins);
        Ok(concatenate(&[
            format!("DELETE FROM {table} USING {tables}"),
            join_where_clause(self, &conditions, &query.wheres),
        ]))
    }

    fn compile_truncate(&self, query: &Query) -> Result<Statements> {
        Ok(vec![(
            format!("TRUNCATE {} RESTART IDENTITY", self.table_of(query)?),
            Vec::<SqlValue>::new(),
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Ident, Operand};
    use crate::query::ast::{Boolean, Join, JoinCondition, JoinTarget, JoinType, Where, WhereKind};

    fn joined_users() -> Query {
        let mut q = Query::from_table("users");
        q.joins.push(Join {
            kind: JoinType::Inner,
            table: Ident::from("contacts"),
            conditions: vec![JoinCondition {
                first: Ident::from("users.id"),
                operator: "=".into(),
                second: JoinTarget::Column(Ident::from("contacts.user_id")),
                boolean: Boolean::And,
            }],
        });
        q.wheres.push(Where {
            boolean: Boolean::And,
            kind: WhereKind::Basic {
                column: Ident::from("users.id"),
                operator: "=".into(),
                value: Operand::from(1),
            },
        });
        q
    }

    #[test]
    fn test_default_markers_are_format_style() {
        let q = joined_users();
        assert_eq!(
            PostgresGrammar::new().compile_select(&q),
            "SELECT * FROM \"users\" INNER JOIN \"contacts\" ON \"users\".\"id\" = \"contacts\".\"user_id\" WHERE \"users\".\"id\" = %s"
        );
    }

    #[test]
    fn test_update_from_joins() {
        let q = joined_users();
        let values = Record::new().set("email", "x");
        assert_eq!(
            PostgresGrammar::new()
                .with_parameter_style(ParameterStyle::Qmark)
                .compile_update(&q, &values)
                .unwrap(),
            "UPDATE \"users\" SET \"email\" = ? FROM \"contacts\" WHERE \"users\".\"id\" = \"contacts\".\"user_id\" AND (\"users\".\"id\" = ?)"
        );
    }

    #[test]
    fn test_delete_using_joins() {
        let q = joined_users();
        assert_eq!(
            PostgresGrammar::new().compile_delete(&q).unwrap(),
            "DELETE FROM \"users\" USING \"contacts\" WHERE \"users\".\"id\" = \"contacts\".\"user_id\" AND (\"users\".\"id\" = %s)"
        );
    }

    #[test]
    fn test_insert_get_id_returns_sequence() {
        let q = Query::from_table("users");
        let record = Record::new().set("email", "a@b.c");
        assert_eq!(
            PostgresGrammar::new()
                .compile_insert_get_id(&q, &record, "id")
                .unwrap(),
            "INSERT INTO \"users\" (\"email\") VALUES (%s) RETURNING \"id\""
        );
    }

    #[test]
    fn test_date_extract_and_locks() {
        let g = PostgresGrammar::new();
        assert_eq!(
            g.compile_date_part(DatePart::Day, "\"created_at\""),
            "extract(day from \"created_at\")"
        );
        assert_eq!(g.compile_date_part(DatePart::Date, "\"c\""), "\"c\"::date");
        assert_eq!(g.compile_lock(&Lock::Shared), "FOR SHARE");
    }

    #[test]
    fn test_truncate_restarts_identity() {
        let statements = PostgresGrammar::new()
            .compile_truncate(&Query::from_table("users"))
            .unwrap();
        assert_eq!(statements[0].0, "TRUNCATE \"users\" RESTART IDENTITY");
    }
}
