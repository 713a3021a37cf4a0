//! Per-column type detection and fix suggestions.
//!
//! Invoked by the import collaborator before a table reaches the column
//! store. Detection order: numeric → datetime → boolean → mixed → string;
//! the first classification clearing its confidence threshold wins.
//! Auto-fix converts confident columns in place; failed conversions
//! become NaN and flow into the column store's forward fill.

use log::debug;
use polars::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::data::table::{Cell, ColumnarTable};
use crate::error::AnalysisError;

const NUMERIC_THRESHOLD: f64 = 0.8;
const DATETIME_THRESHOLD: f64 = 0.7;
const BOOLEAN_THRESHOLD: f64 = 0.8;
/// How many leading values the mixed-type heuristic inspects.
const MIXED_SAMPLE: usize = 20;
/// How many sample values a report carries for preview.
const PREVIEW_SAMPLE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedType {
    Numeric,
    Datetime,
    String,
    Boolean,
    Mixed,
    Unknown,
}

impl fmt::Display for DetectedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DetectedType::Numeric => "numeric",
            DetectedType::Datetime => "datetime",
            DetectedType::String => "string",
            DetectedType::Boolean => "boolean",
            DetectedType::Mixed => "mixed",
            DetectedType::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ColumnStats {
    pub total_count: usize,
    pub null_count: usize,
    pub unique_count: usize,
    pub null_percentage: f64,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub mean_value: Option<f64>,
    pub std_value: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub data_type: DetectedType,
    pub confidence: f64,
    pub detected_format: Option<String>,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
    pub statistics: ColumnStats,
    pub sample_values: Vec<String>,
}

struct DatetimePattern {
    name: &'static str,
    regex: Regex,
    /// chrono format string, or the markers `timestamp` / `excel_serial`.
    format: &'static str,
    confidence: f64,
}

pub struct DataValidator {
    patterns: Vec<DatetimePattern>,
}

impl Default for DataValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl DataValidator {
    pub fn new() -> Self {
        let table: &[(&str, &str, &str, f64)] = &[
            (
                "iso_datetime",
                r"^\d{4}-\d{2}-\d{2}[\sT]\d{2}:\d{2}:\d{2}",
                "%Y-%m-%d %H:%M:%S",
                0.95,
            ),
            ("iso_date", r"^\d{4}-\d{2}-\d{2}$", "%Y-%m-%d", 0.90),
            (
                "us_datetime",
                r"^\d{1,2}/\d{1,2}/\d{4}\s\d{1,2}:\d{2}:\d{2}",
                "%m/%d/%Y %H:%M:%S",
                0.85,
            ),
            (
                "eu_datetime",
                r"^\d{1,2}/\d{1,2}/\d{4}\s\d{1,2}:\d{2}:\d{2}",
                "%d/%m/%Y %H:%M:%S",
                0.80,
            ),
            (
                "turkish_datetime",
                r"^\d{1,2}\.\d{1,2}\.\d{4}\s\d{1,2}:\d{2}:\d{2}",
                "%d.%m.%Y %H:%M:%S",
                0.85,
            ),
            ("timestamp", r"^\d{10}(\.\d+)?$", "timestamp", 0.90),
            ("excel_serial", r"^\d{5}(\.\d+)?$", "excel_serial", 0.70),
        ];
        let patterns = table
            .iter()
            .map(|(name, pattern, format, confidence)| DatetimePattern {
                name,
                regex: Regex::new(pattern).expect("datetime pattern must compile"),
                format,
                confidence: *confidence,
            })
            .collect();
        Self { patterns }
    }

    pub fn validate_table(&self, table: &dyn ColumnarTable) -> HashMap<String, ValidationResult> {
        let mut results = HashMap::new();
        for name in table.column_names() {
            match table.column(&name) {
                Ok(cells) => {
                    debug!("validating column '{name}'");
                    results.insert(name.clone(), self.validate_column(&cells));
                }
                Err(e) => debug!("cannot read column '{name}' for validation: {e}"),
            }
        }
        results
    }

    pub fn validate_column(&self, cells: &[Cell]) -> ValidationResult {
        let statistics = basic_stats(cells);
        let strings: Vec<String> = cells
            .iter()
            .filter(|c| !matches!(c, Cell::Null))
            .map(cell_to_string)
            .collect();

        let (data_type, confidence, detected_format) = self.detect(cells, &strings);

        let mut issues = Vec::new();
        let mut suggestions = Vec::new();

        if statistics.null_count > 0 {
            issues.push(format!(
                "{} missing values ({:.1}%)",
                statistics.null_count, statistics.null_percentage
            ));
            suggestions.push("missing values are forward-filled on materialization".into());
        }
        if statistics.unique_count == 1 && statistics.total_count > 1 {
            issues.push("column is constant".into());
        }
        match data_type {
            DetectedType::Datetime => {
                if let Some(format) = &detected_format {
                    suggestions.push(format!("convert to datetime using format '{format}'"));
                }
            }
            DetectedType::Numeric if confidence < 1.0 => {
                suggestions
                    .push("coerce to numeric; unparseable cells become missing".into());
            }
            DetectedType::Mixed => {
                issues.push("column mixes value types".into());
                suggestions.push("split the column or coerce to a single type".into());
            }
            _ => {}
        }

        let sample_values = strings.iter().take(PREVIEW_SAMPLE).cloned().collect();

        ValidationResult {
            is_valid: !matches!(data_type, DetectedType::Mixed | DetectedType::Unknown),
            data_type,
            confidence,
            detected_format,
            issues,
            suggestions,
            statistics,
            sample_values,
        }
    }

    fn detect(&self, cells: &[Cell], strings: &[String]) -> (DetectedType, f64, Option<String>) {
        if strings.is_empty() {
            return (DetectedType::Unknown, 0.0, None);
        }

        // Already-typed columns short-circuit.
        let typed_numeric = cells
            .iter()
            .all(|c| matches!(c, Cell::Float(_) | Cell::Int(_) | Cell::Null));
        if typed_numeric {
            return (DetectedType::Numeric, 1.0, None);
        }
        if cells
            .iter()
            .all(|c| matches!(c, Cell::Datetime(_) | Cell::Null))
        {
            return (DetectedType::Datetime, 1.0, Some("native".into()));
        }
        if cells.iter().all(|c| matches!(c, Cell::Bool(_) | Cell::Null)) {
            return (DetectedType::Boolean, 1.0, None);
        }

        let numeric_confidence = numeric_confidence(strings);
        if numeric_confidence > NUMERIC_THRESHOLD {
            return (DetectedType::Numeric, numeric_confidence, None);
        }

        let (dt_confidence, dt_format) = self.datetime_confidence(strings);
        if dt_confidence > DATETIME_THRESHOLD {
            return (DetectedType::Datetime, dt_confidence, dt_format);
        }

        let bool_confidence = boolean_confidence(strings);
        if bool_confidence > BOOLEAN_THRESHOLD {
            return (DetectedType::Boolean, bool_confidence, None);
        }

        if is_mixed(strings) {
            return (DetectedType::Mixed, 0.6, None);
        }

        (DetectedType::String, 0.5, None)
    }

    fn datetime_confidence(&self, strings: &[String]) -> (f64, Option<String>) {
        let mut best = 0.0f64;
        let mut best_format: Option<String> = None;
        for pattern in &self.patterns {
            let matches = strings
                .iter()
                .filter(|s| pattern.regex.is_match(s))
                .count();
            if matches == 0 {
                continue;
            }
            let confidence = (matches as f64 / strings.len() as f64) * pattern.confidence;
            if confidence > best {
                best = confidence;
                best_format = Some(pattern.format.to_string());
                debug!(
                    "datetime pattern '{}' matched {matches}/{} values",
                    pattern.name,
                    strings.len()
                );
            }
        }
        (best, best_format)
    }

    /// Rewrite confident columns of a DataFrame in place: datetimes via
    /// their detected format, numerics via coercion. Everything else is
    /// kept as-is.
    pub fn auto_fix(
        &self,
        df: &DataFrame,
        results: &HashMap<String, ValidationResult>,
    ) -> Result<DataFrame, AnalysisError> {
        let mut columns: Vec<Column> = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            let name = column.name().to_string();
            let fixed = match results.get(&name) {
                Some(result)
                    if result.data_type == DetectedType::Datetime
                        && result.confidence >= DATETIME_THRESHOLD
                        && column.dtype() == &DataType::String =>
                {
                    Some(fix_datetime_column(column, result)?)
                }
                Some(result)
                    if result.data_type == DetectedType::Numeric
                        && result.confidence >= NUMERIC_THRESHOLD
                        && column.dtype() == &DataType::String =>
                {
                    Some(fix_numeric_column(column)?)
                }
                _ => None,
            };
            columns.push(fixed.unwrap_or_else(|| column.clone()));
        }
        Ok(DataFrame::new(columns)?)
    }
}

fn cell_to_string(cell: &Cell) -> String {
    match cell {
        Cell::Float(v) => v.to_string(),
        Cell::Int(v) => v.to_string(),
        Cell::Bool(b) => b.to_string(),
        Cell::Str(s) => s.clone(),
        Cell::Datetime(ms) => ms.to_string(),
        Cell::Null => String::new(),
    }
}

fn basic_stats(cells: &[Cell]) -> ColumnStats {
    let total_count = cells.len();
    let null_count = cells.iter().filter(|c| matches!(c, Cell::Null)).count();
    let unique_count = cells
        .iter()
        .filter(|c| !matches!(c, Cell::Null))
        .map(cell_to_string)
        .collect::<HashSet<_>>()
        .len();

    let numeric: Vec<f64> = cells
        .iter()
        .filter_map(|c| match c {
            Cell::Float(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            Cell::Str(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|v| v.is_finite())
        .collect();

    let (min_value, max_value, mean_value, std_value) = if numeric.is_empty() {
        (None, None, None, None)
    } else {
        let n = numeric.len() as f64;
        let mean = numeric.iter().sum::<f64>() / n;
        let var = numeric.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        (
            Some(numeric.iter().cloned().fold(f64::INFINITY, f64::min)),
            Some(numeric.iter().cloned().fold(f64::NEG_INFINITY, f64::max)),
            Some(mean),
            Some(var.sqrt()),
        )
    };

    ColumnStats {
        total_count,
        null_count,
        unique_count,
        null_percentage: if total_count > 0 {
            null_count as f64 / total_count as f64 * 100.0
        } else {
            0.0
        },
        min_value,
        max_value,
        mean_value,
        std_value,
    }
}

fn numeric_confidence(strings: &[String]) -> f64 {
    let parseable = strings
        .iter()
        .filter(|s| s.trim().parse::<f64>().is_ok())
        .count();
    let ratio = parseable as f64 / strings.len() as f64;
    if ratio > 0.9 {
        ratio
    } else if ratio > 0.7 {
        ratio * 0.9
    } else {
        ratio * 0.5
    }
}

fn boolean_confidence(strings: &[String]) -> f64 {
    const BOOLEAN_WORDS: &[&str] = &["true", "false", "1", "0", "yes", "no", "y", "n"];
    let matches = strings
        .iter()
        .filter(|s| BOOLEAN_WORDS.contains(&s.trim().to_ascii_lowercase().as_str()))
        .count();
    matches as f64 / strings.len() as f64
}

fn is_mixed(strings: &[String]) -> bool {
    let mut kinds = HashSet::new();
    for s in strings.iter().take(MIXED_SAMPLE) {
        let s = s.trim();
        if s.is_empty() {
            continue;
        }
        if s.parse::<f64>().is_ok() {
            kinds.insert("numeric");
        } else {
            kinds.insert("string");
        }
    }
    kinds.len() > 1
}

fn fix_numeric_column(column: &Column) -> Result<Column, AnalysisError> {
    let ca = column.str()?;
    let values: Vec<f64> = ca
        .into_iter()
        .map(|opt| {
            opt.and_then(|s| s.trim().parse::<f64>().ok())
                .unwrap_or(f64::NAN)
        })
        .collect();
    Ok(Column::new(column.name().clone(), values))
}

fn fix_datetime_column(column: &Column, result: &ValidationResult) -> Result<Column, AnalysisError> {
    let format = result
        .detected_format
        .as_deref()
        .unwrap_or("%Y-%m-%d %H:%M:%S");
    let ca = column.str()?;
    let millis: Vec<Option<i64>> = ca
        .into_iter()
        .map(|opt| opt.and_then(|s| parse_datetime_millis(s.trim(), format)))
        .collect();
    let fixed = Series::new(column.name().clone(), millis)
        .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
    Ok(fixed.into_column())
}

fn parse_datetime_millis(s: &str, format: &str) -> Option<i64> {
    match format {
        "timestamp" => {
            let seconds: f64 = s.parse().ok()?;
            Some((seconds * 1_000.0) as i64)
        }
        "excel_serial" => {
            // Days since 1899-12-30, fractional part is time of day.
            let serial: f64 = s.parse().ok()?;
            let epoch = chrono::NaiveDate::from_ymd_opt(1899, 12, 30)?
                .and_hms_opt(0, 0, 0)?
                .and_utc()
                .timestamp_millis();
            Some(epoch + (serial * 86_400_000.0) as i64)
        }
        "%Y-%m-%d" => {
            let date = chrono::NaiveDate::parse_from_str(s, format).ok()?;
            Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
        }
        _ => {
            let dt = chrono::NaiveDateTime::parse_from_str(s, format).ok()?;
            Some(dt.and_utc().timestamp_millis())
        }
    }
}
