//! Grammar base shared by the query and schema grammars.
//!
//! Different databases quote identifiers and mark parameters differently.
//! This module holds the wrapping rules every dialect builds on.

use std::fmt;

use crate::expression::{Ident, Operand};

/// How bound parameters are marked in emitted SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterStyle {
    /// `?` markers.
    #[default]
    Qmark,
    /// `%s` markers (format style).
    Format,
}

impl ParameterStyle {
    /// Returns the marker text.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Qmark => "?",
            Self::Format => "%s",
        }
    }
}

/// Settings shared by every grammar of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GrammarConfig {
    /// Prefix prepended to every table name.
    pub table_prefix: String,
    /// Parameter marker style.
    pub parameter_style: ParameterStyle,
}

impl GrammarConfig {
    /// Creates a config with the given marker style and no prefix.
    #[must_use]
    pub const fn with_style(parameter_style: ParameterStyle) -> Self {
        Self {
            table_prefix: String::new(),
            parameter_style,
        }
    }
}

/// Identifier wrapping and parameter formatting.
pub trait Grammar: Send + Sync + fmt::Debug {
    /// Returns the shared settings.
    fn config(&self) -> &GrammarConfig;

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Returns the table prefix.
    fn table_prefix(&self) -> &str {
        &self.config().table_prefix
    }

    /// Returns the parameter marker.
    fn parameter_marker(&self) -> &'static str {
        self.config().parameter_style.marker()
    }

    /// Quotes a single identifier segment. `*` passes through.
    fn wrap_value(&self, value: &str) -> String {
        if value == "*" {
            return String::from("*");
        }
        let q = self.identifier_quote();
        let escaped = value.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Wraps a column reference. Dotted names get the table prefix on the
    /// first segment; `x as y` becomes `"x" AS "y"`.
    fn wrap_name(&self, name: &str) -> String {
        if let Some((base, alias)) = split_alias(name) {
            return format!("{} AS {}", self.wrap_name(base), self.wrap_value(alias));
        }
        let segments: Vec<&str> = name.split('.').collect();
        let last = segments.len() - 1;
        segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                if i == 0 && last > 0 {
                    self.wrap_value(&format!("{}{segment}", self.table_prefix()))
                } else {
                    self.wrap_value(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Wraps a table name, prefixing the table (and its alias).
    fn wrap_table_name(&self, name: &str) -> String {
        let prefix = self.table_prefix();
        if let Some((base, alias)) = split_alias(name) {
            return format!(
                "{} AS {}",
                self.wrap_table_name(base),
                self.wrap_value(&format!("{prefix}{alias}"))
            );
        }
        match name.rsplit_once('.') {
            Some((schema, table)) => format!(
                "{}.{}",
                self.wrap_value(schema),
                self.wrap_value(&format!("{prefix}{table}"))
            ),
            None => self.wrap_value(&format!("{prefix}{name}")),
        }
    }

    /// Wraps a column identifier.
    fn wrap(&self, ident: &Ident) -> String {
        match ident {
            Ident::Name(name) => self.wrap_name(name),
            Ident::Raw(expr) => expr.value().to_string(),
        }
    }

    /// Wraps a table identifier.
    fn wrap_table(&self, ident: &Ident) -> String {
        match ident {
            Ident::Name(name) => self.wrap_table_name(name),
            Ident::Raw(expr) => expr.value().to_string(),
        }
    }

    /// Wraps and joins a column list.
    fn columnize(&self, columns: &[Ident]) -> String {
        columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Wraps and joins plain column names.
    fn columnize_names(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.wrap_name(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns the marker for a bound operand, or the raw SQL.
    fn parameter(&self, operand: &Operand) -> String {
        match operand {
            Operand::Value(_) => self.parameter_marker().to_string(),
            Operand::Raw(expr) => expr.value().to_string(),
        }
    }

    /// Returns comma separated parameters.
    fn parameterize(&self, operands: &[Operand]) -> String {
        operands
            .iter()
            .map(|o| self.parameter(o))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Splits `name as alias` (case-insensitive) into its parts.
fn split_alias(name: &str) -> Option<(&str, &str)> {
    let lower = name.to_ascii_lowercase();
    let pos = lower.find(" as ")?;
    Some((name[..pos].trim(), name[pos + 4..].trim()))
}

/// Joins the non-empty parts of a statement with single spaces.
pub(crate) fn concatenate(parts: &[String]) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::raw;

    #[derive(Debug)]
    struct Plain(GrammarConfig, char);

    impl Grammar for Plain {
        fn config(&self) -> &GrammarConfig {
            &self.0
        }

        fn identifier_quote(&self) -> char {
            self.1
        }
    }

    fn plain(prefix: &str) -> Plain {
        Plain(
            GrammarConfig {
                table_prefix: prefix.into(),
                parameter_style: ParameterStyle::Qmark,
            },
            '"',
        )
    }

    #[test]
    fn test_wrap_value_passes_star_through() {
        assert_eq!(plain("").wrap_name("*"), "*");
        assert_eq!(plain("").wrap_name("users.*"), "\"users\".*");
    }

    #[test]
    fn test_wrap_dotted_column_prefixes_table_segment() {
        assert_eq!(plain("p_").wrap_name("users.id"), "\"p_users\".\"id\"");
        assert_eq!(plain("p_").wrap_name("id"), "\"id\"");
    }

    #[test]
    fn test_wrap_alias() {
        assert_eq!(plain("").wrap_name("name AS n"), "\"name\" AS \"n\"");
        assert_eq!(
            plain("p_").wrap_table_name("users as u"),
            "\"p_users\" AS \"p_u\""
        );
    }

    #[test]
    fn test_wrap_escapes_quote() {
        assert_eq!(plain("").wrap_value("we\"ird"), "\"we\"\"ird\"");
        let backtick = Plain(GrammarConfig::default(), '`');
        assert_eq!(backtick.wrap_value("a`b"), "`a``b`");
    }

    #[test]
    fn test_raw_ident_is_verbatim() {
        assert_eq!(plain("p_").wrap(&Ident::Raw(raw("count(*)"))), "count(*)");
    }

    #[test]
    fn test_parameter_styles() {
        let g = Plain(GrammarConfig::with_style(ParameterStyle::Format), '"');
        assert_eq!(
            g.parameterize(&[Operand::from(1), Operand::from(raw("NOW()"))]),
            "%s, NOW()"
        );
    }

    #[test]
    fn test_concatenate_skips_empty_parts() {
        let parts = vec!["SELECT *".to_string(), String::new(), "FROM \"t\"".to_string()];
        assert_eq!(concatenate(&parts), "SELECT * FROM \"t\"");
    }
}
