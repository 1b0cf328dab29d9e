//! Tabular result adapter.
//!
//! Turns a warehouse [`RowSet`] into a display [`Table`] without reordering rows,
//! reordering columns, or coercing values, and maps table rows onto typed
//! records through [`FromTableRow`].

use serde::Serialize;

use crate::error::{AtlasError, Result};
use crate::warehouse::{Row, RowSet, Value};

/// A named column of a [`Table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
}

/// Display projection of one query result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    columns: Vec<TableColumn>,
    rows: Vec<Row>,
}

/// Adapts a row set into a table, keeping warehouse order and casing.
pub fn adapt(row_set: RowSet) -> Table {
    let columns = row_set
        .columns
        .into_iter()
        .map(|col| TableColumn {
            name: col.name,
            data_type: col.data_type,
        })
        .collect();

    Table {
        columns,
        rows: row_set.rows,
    }
}

impl Table {
    /// Column metadata in result order.
    pub fn columns(&self) -> &[TableColumn] {
        &self.columns
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Rows in result order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column named exactly `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Fills in column names for an empty result whose client reported none.
    ///
    /// Keeps an empty table displayable with its expected header.
    pub fn with_fallback_columns(mut self, names: &[&str]) -> Self {
        if self.columns.is_empty() && self.rows.is_empty() {
            self.columns = names
                .iter()
                .map(|name| TableColumn {
                    name: (*name).to_string(),
                    data_type: String::new(),
                })
                .collect();
        }
        self
    }

    /// Borrowing view of row `index`.
    pub fn row(&self, index: usize) -> Option<TableRow<'_>> {
        self.rows.get(index).map(|values| TableRow {
            table: self,
            values,
        })
    }

    /// Iterates over borrowing row views.
    pub fn iter(&self) -> impl Iterator<Item = TableRow<'_>> {
        self.rows.iter().map(move |values| TableRow {
            table: self,
            values,
        })
    }

    /// Checks that every column `T` reads is present.
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|name| self.column_index(name).is_none())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(AtlasError::query(format!(
                "Result is missing expected column(s): {} (got: {})",
                missing.join(", "),
                self.column_names().join(", ")
            )))
        }
    }

    /// Maps every row onto `T`.
    ///
    /// An empty table maps to an empty vector even when it carries no column
    /// metadata.
    pub fn typed_rows<T: FromTableRow>(&self) -> Result<Vec<T>> {
        if self.rows.is_empty() {
            return Ok(Vec::new());
        }
        self.require_columns(T::COLUMNS)?;
        self.iter()
            .filter(|row| !T::is_absent(row))
            .map(|row| T::from_row(&row))
            .collect()
    }
}

/// One row of a [`Table`], addressed by column name.
#[derive(Debug, Clone, Copy)]
pub struct TableRow<'a> {
    table: &'a Table,
    values: &'a Row,
}

impl<'a> TableRow<'a> {
    /// The cell under `column`.
    pub fn get(&self, column: &str) -> Result<&'a Value> {
        self.table
            .column_index(column)
            .and_then(|index| self.values.get(index))
            .ok_or_else(|| AtlasError::query(format!("Result has no column {column}")))
    }

    /// The cell under `column` as a number.
    pub fn get_f64(&self, column: &str) -> Result<f64> {
        let value = self.get(column)?;
        value.as_f64().ok_or_else(|| type_error(column, "a number", value))
    }

    /// The cell under `column` as an integer.
    pub fn get_i64(&self, column: &str) -> Result<i64> {
        let value = self.get(column)?;
        value
            .as_i64()
            .ok_or_else(|| type_error(column, "an integer", value))
    }

    /// The cell under `column` as text.
    pub fn get_str(&self, column: &str) -> Result<&'a str> {
        let value = self.get(column)?;
        value.as_str().ok_or_else(|| type_error(column, "text", value))
    }

    /// Whether the cell under `column` is SQL NULL.
    pub fn is_null(&self, column: &str) -> bool {
        matches!(self.get(column), Ok(Value::Null))
    }

    /// The cell under `column` rendered for display.
    pub fn get_display(&self, column: &str) -> Result<String> {
        Ok(self.get(column)?.to_display_string())
    }
}

fn type_error(column: &str, expected: &str, value: &Value) -> AtlasError {
    AtlasError::query(format!(
        "Column {column} should hold {expected}, found {value:?}"
    ))
}

/// A typed record read from one table row.
///
/// `COLUMNS` lists the exact result aliases the record reads; tables are
/// checked against it before any row is converted.
pub trait FromTableRow: Sized {
    const COLUMNS: &'static [&'static str];

    fn from_row(row: &TableRow<'_>) -> Result<Self>;

    /// Whether `row` carries no record at all and should be skipped.
    ///
    /// Aggregates over an empty input still return one row of NULLs.
    fn is_absent(_row: &TableRow<'_>) -> bool {
        false
    }
}
