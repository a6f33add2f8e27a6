//! SQLite query grammar.

use crate::error::Result;
use crate::expression::Record;
use crate::grammar::{Grammar, GrammarConfig, ParameterStyle};
use crate::query::ast::{DatePart, Query, Window};
use crate::value::SqlValue;

use super::{insert_columns, QueryGrammar, Statements};

const OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "like", "not like", "between", "ilike", "&", "|",
    "<<", ">>", "glob", "not glob",
];

/// SQLite grammar: double-quoted identifiers, `?` markers.
#[derive(Debug, Clone, Default)]
pub struct SqliteGrammar {
    config: GrammarConfig,
}

impl SqliteGrammar {
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

impl Grammar for SqliteGrammar {
    fn config(&self) -> &GrammarConfig {
        &self.config
    }
}

impl QueryGrammar for SqliteGrammar {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn operators(&self) -> &'static [&'static str] {
        OPERATORS
    }

    fn compile_limit(&self, window: &Window) -> String {
        match (window.limit, window.offset) {
            (Some(limit), _) => format!("LIMIT {limit}"),
            (None, Some(_)) => String::from("LIMIT -1"),
            (None, None) => String::new(),
        }
    }

    fn compile_date_part(&self, part: DatePart, column: &str) -> String {
        let format = match part {
            DatePart::Date => "%Y-%m-%d",
            DatePart::Day => "%d",
            DatePart::Month => "%m",
            DatePart::Year => "%Y",
        };
        format!("strftime('{format}', {column})")
    }

    // strftime returns zero-padded text.
    fn date_part_binding(&self, part: DatePart, value: SqlValue) -> SqlValue {
        let width = match part {
            DatePart::Date => return value,
            DatePart::Day | DatePart::Month => 2,
            DatePart::Year => 4,
        };
        match value.as_i64() {
            Some(n) => SqlValue::Text(format!("{n:0width$}")),
            None => value,
        }
    }

    fn compile_insert(&self, query: &Query, records: &[Record]) -> Result<String> {
        let table = self.table_of(query)?;
        let columns = insert_columns(records)?;
        if columns.is_empty() {
            return Ok(self.compile_insert_default(&table));
        }
        if records.len() == 1 {
            return Ok(format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                self.columnize_names(&columns),
                self.record_parameters(&records[0])
            ));
        }
        let selects: Vec<String> = records
            .iter()
            .map(|record| {
                let values: Vec<String> = record
                    .iter()
                    .map(|(column, value)| {
                        format!("{} AS {}", self.parameter(value), self.wrap_value(column))
                    })
                    .collect();
                format!("SELECT {}", values.join(", "))
            })
            .collect();
        Ok(format!(
            "INSERT INTO {table} ({}) {}",
            self.columnize_names(&columns),
            selects.join(" UNION ALL ")
        ))
    }

    fn compile_truncate(&self, query: &Query) -> Result<Statements> {
        let table = self.table_of(query)?;
        let name = query.from.as_ref().map_or("", |t| t.as_str());
        Ok(vec![
            (
                format!(
                    "DELETE FROM sqlite_sequence WHERE name = {}",
                    self.parameter_marker()
                ),
                vec![SqlValue::Text(format!("{}{name}", self.table_prefix()))],
            ),
            (format!("DELETE FROM {table}"), vec![]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Ident, Operand};
    use crate::query::ast::{Lock, Where, WhereKind};

    fn date_where(part: DatePart) -> Query {
        let mut q = Query::from_table("users");
        q.wheres.push(Where {
            boolean: crate::query::ast::Boolean::And,
            kind: WhereKind::Date {
                part,
                column: Ident::from("created_at"),
                operator: "=".into(),
                value: Operand::from(1),
            },
        });
        q
    }

    #[test]
    fn test_offset_without_limit() {
        let mut q = Query::from_table("users");
        q.window.offset = Some(5);
        assert_eq!(
            SqliteGrammar::new().compile_select(&q),
            "SELECT * FROM \"users\" LIMIT -1 OFFSET 5"
        );
    }

    #[test]
    fn test_date_parts_use_strftime() {
        let g = SqliteGrammar::new();
        assert_eq!(
            g.compile_select(&date_where(DatePart::Month)),
            "SELECT * FROM \"users\" WHERE strftime('%m', \"created_at\") = ?"
        );
        assert_eq!(
            g.date_part_binding(DatePart::Day, SqlValue::Int(3)),
            SqlValue::Text("03".into())
        );
        assert_eq!(
            g.date_part_binding(DatePart::Year, SqlValue::Int(2016)),
            SqlValue::Text("2016".into())
        );
    }

    #[test]
    fn test_lock_is_ignored() {
        let mut q = Query::from_table("users");
        q.lock = Some(Lock::ForUpdate);
        assert_eq!(SqliteGrammar::new().compile_select(&q), "SELECT * FROM \"users\"");
    }

    #[test]
    fn test_truncate_resets_sequence() {
        let g = SqliteGrammar::new().with_table_prefix("p_");
        let statements = g.compile_truncate(&Query::from_table("users")).unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].0, "DELETE FROM sqlite_sequence WHERE name = ?");
        assert_eq!(statements[0].1, vec![SqlValue::Text("p_users".into())]);
        assert_eq!(statements[1].0, "DELETE FROM \"p_users\"");
    }

    #[test]
    fn test_update_with_join_is_rejected() {
        let mut q = Query::from_table("users");
        q.joins.push(crate::query::ast::Join {
            kind: crate::query::ast::JoinType::Inner,
            table: Ident::from("posts"),
            conditions: vec![],
        });
        let values = Record::new().set("a", 1);
        assert!(SqliteGrammar::new().compile_update(&q, &values).is_err());
        assert!(SqliteGrammar::new().compile_delete(&q).is_err());
    }
}
