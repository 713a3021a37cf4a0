//! `metadata.json` payload: format version, timestamps, and a summary of
//! the stored table.

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current container format version. Bump on breaking layout changes.
pub const FORMAT_VERSION: &str = "1.0";

/// Versions the loader accepts. No implicit migration.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0"];

pub const APP_NAME: &str = "siglab";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataInfo {
    pub row_count: usize,
    pub column_count: usize,
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub version: String,
    pub created_date: String,
    pub app_name: String,
    pub app_version: String,
    pub data_info: DataInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<serde_json::Value>,
}

impl ProjectMetadata {
    /// Metadata describing a table about to be archived.
    pub fn for_table(df: &DataFrame, custom: Option<serde_json::Value>) -> Self {
        let columns: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        let dtypes = df
            .get_columns()
            .iter()
            .map(|c| (c.name().to_string(), c.dtype().to_string()))
            .collect();
        Self {
            version: FORMAT_VERSION.to_string(),
            created_date: chrono::Local::now().to_rfc3339(),
            app_name: APP_NAME.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            data_info: DataInfo {
                row_count: df.height(),
                column_count: columns.len(),
                columns,
                dtypes,
            },
            custom,
        }
    }

    pub fn version_supported(&self) -> bool {
        SUPPORTED_VERSIONS.contains(&self.version.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_df() -> DataFrame {
        df!(
            "t" => &[0.0f64, 1.0],
            "speed" => &[10.0f64, 20.0],
        )
        .unwrap()
    }

    #[test]
    fn for_table_summarizes_the_frame() {
        let meta = ProjectMetadata::for_table(&sample_df(), None);
        assert_eq!(meta.version, FORMAT_VERSION);
        assert_eq!(meta.data_info.row_count, 2);
        assert_eq!(meta.data_info.column_count, 2);
        assert_eq!(meta.data_info.columns, vec!["t", "speed"]);
        assert!(meta.data_info.dtypes.contains_key("speed"));
    }

    #[test]
    fn custom_block_is_optional_in_json() {
        let meta = ProjectMetadata::for_table(&sample_df(), None);
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("custom"));

        let meta = ProjectMetadata::for_table(
            &sample_df(),
            Some(serde_json::json!({"operator": "bench-3"})),
        );
        let json = serde_json::to_string(&meta).unwrap();
        assert!(json.contains("bench-3"));
    }

    #[test]
    fn unknown_version_is_unsupported() {
        let mut meta = ProjectMetadata::for_table(&sample_df(), None);
        meta.version = "9.9".into();
        assert!(!meta.version_supported());
    }

    #[test]
    fn created_date_is_iso8601() {
        let meta = ProjectMetadata::for_table(&sample_df(), None);
        assert!(chrono::DateTime::parse_from_rfc3339(&meta.created_date).is_ok());
    }
}
