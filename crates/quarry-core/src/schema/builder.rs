//! Schema builder: runs blueprints against a connection.

use std::sync::Arc;

use tracing::debug;

use crate::connection::Connection;
use crate::error::Result;
use crate::value::SqlValue;

use super::blueprint::Blueprint;
use super::grammar::{ColumnInfo, SchemaContext, SchemaGrammar};

/// Inspects and changes the schema of one connection.
#[derive(Debug, Clone)]
pub struct SchemaBuilder<'c> {
    connection: &'c Connection,
    grammar: Arc<dyn SchemaGrammar>,
}

impl<'c> SchemaBuilder<'c> {
    /// Creates a schema builder using the connection's schema grammar.
    #[must_use]
    pub fn new(connection: &'c Connection) -> Self {
        Self {
            connection,
            grammar: Arc::clone(connection.schema_grammar()),
        }
    }

    /// Returns the grammar.
    #[must_use]
    pub fn grammar(&self) -> &dyn SchemaGrammar {
        self.grammar.as_ref()
    }

    /// Returns `true` when `table` exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn has_table(&self, table: &str) -> Result<bool> {
        let (sql, bindings) = self.grammar.compile_table_exists(table);
        Ok(!self.connection.select(&sql, &bindings).await?.is_empty())
    }

    /// Returns `true` when `table` has `column`.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn has_column(&self, table: &str, column: &str) -> Result<bool> {
        self.has_columns(table, &[column]).await
    }

    /// Returns `true` when `table` has every column in `columns`.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn has_columns(&self, table: &str, columns: &[&str]) -> Result<bool> {
        let listing = self.get_column_listing(table).await?;
        let fold = self.grammar.case_insensitive_columns();
        Ok(columns.iter().all(|wanted| {
            listing.iter().any(|existing| {
                if fold {
                    existing.eq_ignore_ascii_case(wanted)
                } else {
                    existing == wanted
                }
            })
        }))
    }

    /// Returns the column names of `table`, in table order.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn get_column_listing(&self, table: &str) -> Result<Vec<String>> {
        let (sql, bindings) = self.grammar.compile_column_listing(table);
        let key = self.grammar.column_listing_key();
        let rows = self.connection.select(&sql, &bindings).await?;
        Ok(rows
            .iter()
            .filter_map(|row| {
                row.get(key)
                    .or_else(|| row.get_index(0))
                    .and_then(SqlValue::as_str)
                    .map(String::from)
            })
            .collect())
    }

    /// Creates a blueprint carrying the connection's table prefix.
    #[must_use]
    pub fn blueprint(&self, table: &str) -> Blueprint {
        Blueprint::new(table).with_prefix(self.connection.get_table_prefix())
    }

    /// Creates `table` as described by `callback`.
    ///
    /// # Errors
    ///
    /// Returns an error when compiling or running the statements fails.
    pub async fn create<F>(&self, table: &str, callback: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = self.blueprint(table);
        blueprint.create();
        callback(&mut blueprint);
        self.build(blueprint).await
    }

    /// Alters `table` as described by `callback`.
    ///
    /// # Errors
    ///
    /// Returns an error when compiling or running the statements fails.
    pub async fn table<F>(&self, table: &str, callback: F) -> Result<()>
    where
        F: FnOnce(&mut Blueprint),
    {
        let mut blueprint = self.blueprint(table);
        callback(&mut blueprint);
        self.build(blueprint).await
    }

    /// Drops `table`.
    ///
    /// # Errors
    ///
    /// Returns an error when the statement fails.
    pub async fn drop(&self, table: &str) -> Result<()> {
        let mut blueprint = self.blueprint(table);
        blueprint.drop();
        self.build(blueprint).await
    }

    /// Drops `table` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the statement fails.
    pub async fn drop_if_exists(&self, table: &str) -> Result<()> {
        let mut blueprint = self.blueprint(table);
        blueprint.drop_if_exists();
        self.build(blueprint).await
    }

    /// Renames `from` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error when the statement fails.
    pub async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut blueprint = self.blueprint(from);
        blueprint.rename(to);
        self.build(blueprint).await
    }

    /// Compiles `blueprint` and runs its statements in order.
    ///
    /// # Errors
    ///
    /// Returns an error when compiling or running a statement fails.
    pub async fn build(&self, mut blueprint: Blueprint) -> Result<()> {
        blueprint.prepare();
        let context = if self.grammar.requires_introspection(&blueprint) {
            self.context(&blueprint).await?
        } else {
            SchemaContext::default()
        };
        let statements = self.grammar.compile(&blueprint, &context)?;
        debug!(
            table = blueprint.table(),
            statements = statements.len(),
            "Applying blueprint"
        );
        for sql in statements {
            self.connection.statement(&sql, &[]).await?;
        }
        Ok(())
    }

    async fn context(&self, blueprint: &Blueprint) -> Result<SchemaContext> {
        let mut context = SchemaContext::default();
        if let Some(sql) = self.grammar.compile_foreign_keys_enabled() {
            let rows = self.connection.select(sql, &[]).await?;
            context.foreign_keys = rows
                .first()
                .and_then(|row| row.get_index(0))
                .and_then(SqlValue::as_i64)
                .is_some_and(|flag| flag != 0);
        }
        if let Some(sql) = self.grammar.compile_column_info(blueprint.table()) {
            let rows = self.connection.select(&sql, &[]).await?;
            context.columns = rows.iter().filter_map(ColumnInfo::from_table_info).collect();
        }
        Ok(context)
    }
}
