//! Lazy column materialization with cleanup.
//!
//! Columns come out of here as finite `f64` arrays, always:
//! - non-numeric cells are coerced per element, failures become NaN
//! - ±∞ becomes NaN
//! - NaN is forward-filled from the most recent finite value
//! - leading NaN (nothing to fill from) becomes 0.0
//!
//! Materialization happens on first access and is cached; the cache is
//! write-once per column and cleared on project unload.

use log::warn;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::data::table::{Cell, ColumnarTable};
use crate::error::AnalysisError;

struct CachedColumn {
    values: Arc<Vec<f64>>,
    /// How many cells needed repair (coercion failure, NaN, or ±∞).
    cleaned: usize,
}

pub struct ColumnStore {
    table: Arc<dyn ColumnarTable>,
    cache: RwLock<HashMap<String, CachedColumn>>,
}

impl ColumnStore {
    pub fn new(table: Arc<dyn ColumnarTable>) -> Self {
        Self {
            table,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn table(&self) -> &Arc<dyn ColumnarTable> {
        &self.table
    }

    /// Cleaned, densified numeric column. Computed on first call, cached after.
    pub fn get(&self, name: &str) -> Result<Arc<Vec<f64>>, AnalysisError> {
        {
            let cache = self.cache.read().expect("column cache lock poisoned");
            if let Some(cached) = cache.get(name) {
                return Ok(Arc::clone(&cached.values));
            }
        }

        let materialized = self.materialize(name)?;

        let mut cache = self.cache.write().expect("column cache lock poisoned");
        // A racing reader may have materialized in the meantime; first write wins.
        let entry = cache.entry(name.to_string()).or_insert(materialized);
        Ok(Arc::clone(&entry.values))
    }

    /// How many cells of a column were repaired during materialization.
    /// `None` until the column has been materialized.
    pub fn cleaned_count(&self, name: &str) -> Option<usize> {
        self.cache
            .read()
            .expect("column cache lock poisoned")
            .get(name)
            .map(|c| c.cleaned)
    }

    pub fn clear(&self) {
        self.cache
            .write()
            .expect("column cache lock poisoned")
            .clear();
    }

    fn materialize(&self, name: &str) -> Result<CachedColumn, AnalysisError> {
        let raw: Vec<Option<f64>> = match self.table.numeric_column(name) {
            Some(fast) => fast,
            None => self
                .table
                .column(name)?
                .into_iter()
                .map(coerce_cell)
                .collect(),
        };

        let n = raw.len();
        let mut values = Vec::with_capacity(n);
        let mut cleaned = 0usize;
        let mut last_finite: Option<f64> = None;
        let mut any_finite = false;

        for cell in raw {
            let v = cell.unwrap_or(f64::NAN);
            if v.is_finite() {
                any_finite = true;
                last_finite = Some(v);
                values.push(v);
            } else {
                cleaned += 1;
                values.push(last_finite.unwrap_or(0.0));
            }
        }

        if !any_finite && n > 0 {
            warn!("column '{name}' is entirely non-numeric; substituting zeros");
        } else if cleaned > 0 {
            log::debug!("cleaned {cleaned} invalid values in column '{name}'");
        }

        Ok(CachedColumn {
            values: Arc::new(values),
            cleaned,
        })
    }
}

fn coerce_cell(cell: Cell) -> Option<f64> {
    match cell {
        Cell::Float(v) => Some(v),
        Cell::Int(v) => Some(v as f64),
        Cell::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
        Cell::Datetime(ms) => Some(ms as f64),
        Cell::Str(s) => s.trim().parse::<f64>().ok(),
        Cell::Null => None,
    }
}
