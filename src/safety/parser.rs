//! SQL parsing and read-only verification.
//!
//! Uses sqlparser-rs with the Snowflake or PostgreSQL dialect, matching the
//! warehouse the statement is bound for.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::{Dialect, PostgreSqlDialect, SnowflakeDialect};
use sqlparser::parser::Parser;

use crate::error::{AtlasError, Result};
use crate::warehouse::WarehouseBackend;

/// Parses statements for one backend and rejects anything that is not a
/// single read-only query.
#[derive(Debug)]
pub struct ReadOnlyGuard {
    backend: WarehouseBackend,
}

impl ReadOnlyGuard {
    pub fn new(backend: WarehouseBackend) -> Self {
        Self { backend }
    }

    fn dialect(&self) -> Box<dyn Dialect> {
        match self.backend {
            WarehouseBackend::Snowflake => Box::new(SnowflakeDialect {}),
            WarehouseBackend::Postgres => Box::new(PostgreSqlDialect {}),
        }
    }

    /// Checks `sql`, returning a query error describing the first problem.
    pub fn check(&self, sql: &str) -> Result<()> {
        let dialect = self.dialect();
        let statements = Parser::parse_sql(dialect.as_ref(), sql).map_err(|e| {
            AtlasError::query(format!(
                "SQL parse error ({} dialect): {}",
                self.backend.as_str(),
                e
            ))
        })?;

        match statements.as_slice() {
            [] => Err(AtlasError::query("Empty SQL statement")),
            [Statement::Query(query)] => {
                if is_read_only_query(query) {
                    Ok(())
                } else {
                    Err(AtlasError::query(
                        "Refusing to run a query that modifies data",
                    ))
                }
            }
            [_] => Err(AtlasError::query("Only SELECT queries may be run")),
            many => Err(AtlasError::query(format!(
                "Expected a single statement, found {}",
                many.len()
            ))),
        }
    }
}

/// Convenience function to check SQL without creating a guard instance.
pub fn ensure_read_only(sql: &str, backend: WarehouseBackend) -> Result<()> {
    ReadOnlyGuard::new(backend).check(sql)
}

/// A query is read-only when neither its CTEs nor its body modify data.
fn is_read_only_query(query: &Query) -> bool {
    let ctes_read_only = query
        .with
        .as_ref()
        .map_or(true, |with| with.cte_tables.iter().all(|cte| is_read_only_query(&cte.query)));

    ctes_read_only && is_read_only_set_expr(&query.body)
}

fn is_read_only_set_expr(set_expr: &SetExpr) -> bool {
    match set_expr {
        SetExpr::Select(select) => is_read_only_select(select),
        SetExpr::Query(query) => is_read_only_query(query),
        SetExpr::SetOperation { left, right, .. } => {
            is_read_only_set_expr(left) && is_read_only_set_expr(right)
        }
        SetExpr::Values(_) | SetExpr::Table(_) => true,
        // INSERT, UPDATE and any statement form nested as a set expression
        _ => false,
    }
}

fn is_read_only_select(select: &Select) -> bool {
    select.from.iter().all(is_read_only_table_with_joins)
}

fn is_read_only_table_with_joins(table: &TableWithJoins) -> bool {
    is_read_only_table_factor(&table.relation)
        && table
            .joins
            .iter()
            .all(|join| is_read_only_table_factor(&join.relation))
}

fn is_read_only_table_factor(factor: &TableFactor) -> bool {
    match factor {
        TableFactor::Derived { subquery, .. } => is_read_only_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => is_read_only_table_with_joins(table_with_joins),
        _ => true,
    }
}
