//! Columnar table boundary.
//!
//! Import (CSV, Excel, Parquet, HDF5) is a collaborator concern; the core
//! consumes whatever it produced through `ColumnarTable`. The polars
//! implementation is the one the session uses in practice and is what
//! enables native predicate pushdown in the filter engine.

use polars::prelude::*;
use std::sync::Arc;

use crate::error::AnalysisError;

/// One typed cell handed across the import boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Float(f64),
    Int(i64),
    Bool(bool),
    Str(String),
    /// Epoch milliseconds.
    Datetime(i64),
    Null,
}

/// Abstract interface over the immutable source table.
///
/// All columns have equal length `row_count()`.
pub trait ColumnarTable: Send + Sync {
    fn column_names(&self) -> Vec<String>;

    fn row_count(&self) -> usize;

    /// Iterate a column's cells in row order.
    fn column(&self, name: &str) -> Result<Vec<Cell>, AnalysisError>;

    /// Fast path: a column already representable as `f64` per element,
    /// `None` where coercion failed. Implementations without a native
    /// numeric representation return `None` and the caller falls back
    /// to `column()`.
    fn numeric_column(&self, _name: &str) -> Option<Vec<Option<f64>>> {
        None
    }
}

/// `ColumnarTable` over a polars `DataFrame`.
pub struct DataFrameTable {
    df: DataFrame,
}

impl DataFrameTable {
    pub fn new(df: DataFrame) -> Self {
        Self { df }
    }

    pub fn dataframe(&self) -> &DataFrame {
        &self.df
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn find(&self, name: &str) -> Result<&Column, AnalysisError> {
        self.df
            .column(name)
            .map_err(|_| AnalysisError::UnknownColumn(name.to_string()))
    }
}

impl ColumnarTable for DataFrameTable {
    fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn row_count(&self) -> usize {
        self.df.height()
    }

    fn column(&self, name: &str) -> Result<Vec<Cell>, AnalysisError> {
        let col = self.find(name)?;
        let n = col.len();
        let mut cells = Vec::with_capacity(n);

        match col.dtype() {
            DataType::Float32 | DataType::Float64 => {
                let casted = col.cast(&DataType::Float64)?;
                let ca = casted.f64()?;
                for v in ca.into_iter() {
                    cells.push(v.map(Cell::Float).unwrap_or(Cell::Null));
                }
            }
            dt if dt.is_integer() => {
                let casted = col.cast(&DataType::Int64)?;
                let ca = casted.i64()?;
                for v in ca.into_iter() {
                    cells.push(v.map(Cell::Int).unwrap_or(Cell::Null));
                }
            }
            DataType::Boolean => {
                let ca = col.bool()?;
                for v in ca.into_iter() {
                    cells.push(v.map(Cell::Bool).unwrap_or(Cell::Null));
                }
            }
            DataType::Datetime(unit, _) => {
                let unit = *unit;
                let casted = col.cast(&DataType::Int64)?;
                let ca = casted.i64()?;
                for v in ca.into_iter() {
                    cells.push(match v {
                        Some(raw) => Cell::Datetime(to_millis(raw, unit)),
                        None => Cell::Null,
                    });
                }
            }
            DataType::Date => {
                let casted = col.cast(&DataType::Int64)?;
                let ca = casted.i64()?;
                for v in ca.into_iter() {
                    cells.push(match v {
                        Some(days) => Cell::Datetime(days * 86_400_000),
                        None => Cell::Null,
                    });
                }
            }
            _ => {
                // Strings and anything exotic go through the string form;
                // the consumer decides whether it coerces.
                let casted = col.cast(&DataType::String)?;
                let ca = casted.str()?;
                for v in ca.into_iter() {
                    cells.push(v.map(|s| Cell::Str(s.to_string())).unwrap_or(Cell::Null));
                }
            }
        }

        Ok(cells)
    }

    fn numeric_column(&self, name: &str) -> Option<Vec<Option<f64>>> {
        let col = self.find(name).ok()?;
        if !col.dtype().is_primitive_numeric() {
            return None;
        }
        let casted = col.cast(&DataType::Float64).ok()?;
        let ca = casted.f64().ok()?;
        Some(ca.into_iter().collect())
    }
}

fn to_millis(raw: i64, unit: TimeUnit) -> i64 {
    match unit {
        TimeUnit::Milliseconds => raw,
        TimeUnit::Microseconds => raw / 1_000,
        TimeUnit::Nanoseconds => raw / 1_000_000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "t" => &[0.0f64, 1.0, 2.0],
            "speed" => &[10i64, 20, 30],
            "label" => &["a", "b", "c"],
            "flag" => &[true, false, true],
        )
        .unwrap()
    }

    #[test]
    fn names_and_row_count() {
        let table = DataFrameTable::new(sample_df());
        assert_eq!(table.column_names(), vec!["t", "speed", "label", "flag"]);
        assert_eq!(table.row_count(), 3);
    }

    #[test]
    fn float_column_yields_float_cells() {
        let table = DataFrameTable::new(sample_df());
        let cells = table.column("t").unwrap();
        assert_eq!(cells[1], Cell::Float(1.0));
    }

    #[test]
    fn integer_column_yields_int_cells() {
        let table = DataFrameTable::new(sample_df());
        let cells = table.column("speed").unwrap();
        assert_eq!(cells[2], Cell::Int(30));
    }

    #[test]
    fn string_and_bool_cells() {
        let table = DataFrameTable::new(sample_df());
        assert_eq!(table.column("label").unwrap()[0], Cell::Str("a".into()));
        assert_eq!(table.column("flag").unwrap()[1], Cell::Bool(false));
    }

    #[test]
    fn unknown_column_is_an_error() {
        let table = DataFrameTable::new(sample_df());
        assert!(matches!(
            table.column("missing"),
            Err(AnalysisError::UnknownColumn(_))
        ));
    }

    #[test]
    fn numeric_fast_path_skips_strings() {
        let table = DataFrameTable::new(sample_df());
        assert!(table.numeric_column("speed").is_some());
        assert!(table.numeric_column("label").is_none());
    }
}
