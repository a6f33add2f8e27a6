//! MySQL query grammar.

use crate::error::Result;
use crate::expression::{Ident, Record};
use crate::grammar::{concatenate, Grammar, GrammarConfig, ParameterStyle};
use crate::query::ast::{Lock, Query, Window};
use crate::query::bindings::{BindingKind, Bindings};
use crate::value::SqlValue;

use super::QueryGrammar;

const OPERATORS: &[&str] = &[
    "=", "<", ">", "<=", ">=", "<>", "!=", "<=>", "like", "like binary", "not like", "between",
    "&", "|", "^", "<<", ">>", "rlike", "regexp", "not regexp", "sounds like",
];

/// MySQL grammar: backtick identifiers, `?` markers unless configured for
/// `%s`.
#[derive(Debug, Clone, Default)]
pub struct MySqlGrammar {
    config: GrammarConfig,
}

impl MySqlGrammar {
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

    // The target of a multi-table DELETE is the alias when one is given.
    fn delete_target(&self, table: &Ident) -> String {
        let name = table.as_str();
        let lower = name.to_ascii_lowercase();
        match lower.find(" as ") {
            Some(pos) if matches!(table, Ident::Name(_)) => self.wrap_value(&format!(
                "{}{}",
                self.table_prefix(),
                name[pos + 4..].trim()
            )),
            _ => self.wrap_table(table),
        }
    }
}

impl Grammar for MySqlGrammar {
    fn config(&self) -> &GrammarConfig {
        &self.config
    }

    fn identifier_quote(&self) -> char {
        '`'
    }
}

impl QueryGrammar for MySqlGrammar {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn operators(&self) -> &'static [&'static str] {
        OPERATORS
    }

    fn compile_limit(&self, window: &Window) -> String {
        match (window.limit, window.offset) {
            (Some(limit), _) => format!("LIMIT {limit}"),
            (None, Some(_)) => String::from("LIMIT 18446744073709551615"),
            (None, None) => String::new(),
        }
    }

    fn wrap_union(&self, sql: String) -> String {
        format!("({sql})")
    }

    fn compile_lock(&self, lock: &Lock) -> String {
        match lock {
            Lock::ForUpdate => String::from("FOR UPDATE"),
            Lock::Shared => String::from("LOCK IN SHARE MODE"),
            Lock::Raw(sql) => sql.clone(),
        }
    }

    fn compile_insert_default(&self, table: &str) -> String {
        format!("INSERT INTO {table} () VALUES ()")
    }

    fn compile_update(&self, query: &Query, values: &Record) -> Result<String> {
        let table = self.table_of(query)?;
        if values.is_empty() {
            return Err(crate::error::Error::invalid(
                "update requires at least one column",
            ));
        }
        let joined = !query.joins.is_empty();
        Ok(concatenate(&[
            format!("UPDATE {table}"),
            self.compile_joins(&query.joins),
            format!("SET {}", self.compile_assignments(values)),
            self.compile_wheres(&query.wheres),
            if joined {
                String::new()
            } else {
                self.compile_orders(&query.window.orders)
            },
            if joined {
                String::new()
            } else {
                self.compile_limit(&query.window)
            },
        ]))
    }

    fn update_bindings(&self, query: &Query, bindings: &Bindings, values: &Record) -> Vec<SqlValue> {
        let mut out = bindings.get(BindingKind::Join).to_vec();
        out.extend(values.bindings());
        out.extend(bindings.get(BindingKind::Where).iter().cloned());
        if query.joins.is_empty() {
            out.extend(bindings.get(BindingKind::Order).iter().cloned());
        }
        out
    }

    fn compile_delete(&self, query: &Query) -> Result<String> {
        let table = self.table_of(query)?;
        if query.joins.is_empty() {
            return Ok(concatenate(&[
                format!("DELETE FROM {table}"),
                self.compile_wheres(&query.wheres),
                self.compile_orders(&query.window.orders),
                self.compile_limit(&query.window),
            ]));
        }
        let target = query
            .from
            .as_ref()
            .map_or_else(|| table.clone(), |from| self.delete_target(from));
        Ok(concatenate(&[
            format!("DELETE {target} FROM {table}"),
            self.compile_joins(&query.joins),
            self.compile_wheres(&query.wheres),
        ]))
    }

    fn delete_bindings(&self, query: &Query, bindings: &Bindings) -> Vec<SqlValue> {
        if query.joins.is_empty() {
            bindings.collect(&[BindingKind::Join, BindingKind::Where, BindingKind::Order])
        } else {
            bindings.collect(&[BindingKind::Join, BindingKind::Where])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Operand;
    use crate::query::ast::{
        Boolean, DatePart, Join, JoinCondition, JoinTarget, JoinType, Union, Where, WhereKind,
    };

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
    fn test_offset_without_limit_uses_max_limit() {
        let mut q = Query::from_table("users");
        q.window.offset = Some(10);
        assert_eq!(
            MySqlGrammar::new().compile_select(&q),
            "SELECT * FROM `users` LIMIT 18446744073709551615 OFFSET 10"
        );
    }

    #[test]
    fn test_unions_are_parenthesized() {
        let mut q = Query::from_table("a");
        q.unions.push(Union {
            query: Box::new(Query::from_table("b")),
            all: true,
        });
        assert_eq!(
            MySqlGrammar::new().compile_select(&q),
            "(SELECT * FROM `a`) UNION ALL (SELECT * FROM `b`)"
        );
    }

    #[test]
    fn test_locks() {
        let g = MySqlGrammar::new();
        let mut q = Query::from_table("users");
        q.lock = Some(Lock::Shared);
        assert_eq!(g.compile_select(&q), "SELECT * FROM `users` LOCK IN SHARE MODE");
        q.lock = Some(Lock::ForUpdate);
        assert_eq!(g.compile_select(&q), "SELECT * FROM `users` FOR UPDATE");
    }

    #[test]
    fn test_date_functions() {
        let mut q = Query::from_table("users");
        q.wheres.push(Where {
            boolean: Boolean::And,
            kind: WhereKind::Date {
                part: DatePart::Year,
                column: Ident::from("created_at"),
                operator: "=".into(),
                value: Operand::from(2016),
            },
        });
        assert_eq!(
            MySqlGrammar::new().compile_select(&q),
            "SELECT * FROM `users` WHERE YEAR(`created_at`) = ?"
        );
    }

    #[test]
    fn test_update_with_join() {
        let q = joined_users();
        let values = Record::new().set("email", "foo");
        assert_eq!(
            MySqlGrammar::new().compile_update(&q, &values).unwrap(),
            "UPDATE `users` INNER JOIN `contacts` ON `users`.`id` = `contacts`.`user_id` SET `email` = ? WHERE `users`.`id` = ?"
        );
    }

    #[test]
    fn test_delete_with_join() {
        let q = joined_users();
        assert_eq!(
            MySqlGrammar::new().compile_delete(&q).unwrap(),
            "DELETE `users` FROM `users` INNER JOIN `contacts` ON `users`.`id` = `contacts`.`user_id` WHERE `users`.`id` = ?"
        );
    }

    #[test]
    fn test_multi_row_insert() {
        let q = Query::from_table("users");
        let rows = vec![
            Record::new().set("a", 1).set("b", 2),
            Record::new().set("a", 3).set("b", 4),
        ];
        assert_eq!(
            MySqlGrammar::new().compile_insert(&q, &rows).unwrap(),
            "INSERT INTO `users` (`a`, `b`) VALUES (?, ?), (?, ?)"
        );
    }

    #[test]
    fn test_format_markers() {
        let g = MySqlGrammar::new().with_parameter_style(ParameterStyle::Format);
        let q = joined_users();
        assert!(g.compile_select(&q).ends_with("= %s"));
    }
}
