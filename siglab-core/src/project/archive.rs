//! The `.mpai` project container.
//!
//! A ZIP archive (deflate) holding exactly three entries:
//! - `data.parquet` — the source table, zstd-compressed with statistics
//! - `layout.json`  — tabs, graphs, filters, limits, cursors
//! - `metadata.json` — format version and table summary
//!
//! Other entries are reserved and ignored. The extension is enforced on
//! save and rejected on load. Version checks are explicit; unknown
//! versions fail, nothing migrates implicitly.

use log::{debug, info};
use polars::prelude::*;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use ::zip::write::FileOptions;
use ::zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::AnalysisError;
use crate::project::layout::ProjectLayout;
use crate::project::metadata::ProjectMetadata;

pub const PROJECT_EXTENSION: &str = "mpai";

const DATA_ENTRY: &str = "data.parquet";
const LAYOUT_ENTRY: &str = "layout.json";
const METADATA_ENTRY: &str = "metadata.json";
const REQUIRED_ENTRIES: &[&str] = &[DATA_ENTRY, LAYOUT_ENTRY, METADATA_ENTRY];

/// Everything a load yields.
pub struct LoadedProject {
    pub dataframe: DataFrame,
    pub layout: ProjectLayout,
    pub metadata: ProjectMetadata,
}

/// Save a complete project. Appends the `.mpai` extension when missing
/// and returns the actual path written.
///
/// `progress` receives (step message, percent) at each stage: data,
/// layout, metadata, archive assembly.
pub fn save(
    path: &Path,
    df: &DataFrame,
    layout: &ProjectLayout,
    custom_metadata: Option<serde_json::Value>,
    mut progress: impl FnMut(&str, u8),
) -> Result<PathBuf, AnalysisError> {
    layout.validate()?;
    let path = ensure_extension(path);
    info!("saving project to {}", path.display());
    progress("saving project", 0);

    let file = File::create(&path)?;
    let mut zip = ZipWriter::new(file);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    progress("writing data (parquet)", 20);
    zip.start_file(DATA_ENTRY, options)?;
    ParquetWriter::new(&mut zip)
        .with_compression(ParquetCompression::Zstd(None))
        .with_statistics(StatisticsOptions::full())
        .finish(&mut df.clone())?;
    debug!("data written: {} rows, {} cols", df.height(), df.width());

    progress("writing layout", 50);
    zip.start_file(LAYOUT_ENTRY, options)?;
    let layout_json = serde_json::to_string_pretty(layout)
        .map_err(|e| AnalysisError::ArchiveInvalid(format!("layout serialization: {e}")))?;
    zip.write_all(layout_json.as_bytes())?;

    progress("writing metadata", 70);
    let metadata = ProjectMetadata::for_table(df, custom_metadata);
    zip.start_file(METADATA_ENTRY, options)?;
    let metadata_json = serde_json::to_string_pretty(&metadata)
        .map_err(|e| AnalysisError::ArchiveInvalid(format!("metadata serialization: {e}")))?;
    zip.write_all(metadata_json.as_bytes())?;

    progress("assembling archive", 80);
    zip.finish()?;
    progress("project saved", 100);
    info!("project saved: {}", path.display());
    Ok(path)
}

/// Load a complete project.
pub fn load(path: &Path, mut progress: impl FnMut(&str, u8)) -> Result<LoadedProject, AnalysisError> {
    check_extension(path)?;
    info!("loading project from {}", path.display());
    progress("opening project", 0);

    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    for entry in REQUIRED_ENTRIES {
        if archive.by_name(entry).is_err() {
            return Err(AnalysisError::ArchiveInvalid(format!(
                "missing required entry: {entry}"
            )));
        }
    }

    progress("reading metadata", 20);
    let metadata: ProjectMetadata = read_json(&mut archive, METADATA_ENTRY)?;
    if !metadata.version_supported() {
        return Err(AnalysisError::ArchiveInvalid(format!(
            "unsupported project version: {}",
            metadata.version
        )));
    }

    progress("reading data (parquet)", 40);
    let bytes = read_entry(&mut archive, DATA_ENTRY)?;
    let dataframe = ParquetReader::new(Cursor::new(bytes)).finish()?;
    debug!(
        "data loaded: {} rows, {} cols",
        dataframe.height(),
        dataframe.width()
    );

    progress("reading layout", 70);
    let layout: ProjectLayout = read_json(&mut archive, LAYOUT_ENTRY)?;
    layout.validate()?;

    progress("project loaded", 100);
    Ok(LoadedProject {
        dataframe,
        layout,
        metadata,
    })
}

/// Non-throwing integrity check: `(is_valid, reason)`.
pub fn validate(path: &Path) -> (bool, String) {
    if !path.exists() {
        return (false, "file not found".into());
    }
    if check_extension(path).is_err() {
        return (
            false,
            format!("invalid extension (expected .{PROJECT_EXTENSION})"),
        );
    }
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => return (false, format!("cannot open file: {e}")),
    };
    let mut archive = match ZipArchive::new(file) {
        Ok(a) => a,
        Err(e) => return (false, format!("not a valid project container: {e}")),
    };
    for entry in REQUIRED_ENTRIES {
        if archive.by_name(entry).is_err() {
            return (false, format!("missing required entry: {entry}"));
        }
    }
    match read_json::<ProjectMetadata>(&mut archive, METADATA_ENTRY) {
        Ok(metadata) if !metadata.version_supported() => (
            false,
            format!("unsupported project version: {}", metadata.version),
        ),
        Ok(_) => (true, "valid project file".into()),
        Err(e) => (false, format!("metadata unreadable: {e}")),
    }
}

/// Read metadata only, without touching the data payload. For file
/// browser previews.
pub fn peek(path: &Path) -> Result<ProjectMetadata, AnalysisError> {
    check_extension(path)?;
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file)?;
    read_json(&mut archive, METADATA_ENTRY)
}

fn ensure_extension(path: &Path) -> PathBuf {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case(PROJECT_EXTENSION) => path.to_path_buf(),
        _ => {
            let mut s = path.as_os_str().to_os_string();
            s.push(".");
            s.push(PROJECT_EXTENSION);
            PathBuf::from(s)
        }
    }
}

fn check_extension(path: &Path) -> Result<(), AnalysisError> {
    match path.extension() {
        Some(ext) if ext.eq_ignore_ascii_case(PROJECT_EXTENSION) => Ok(()),
        _ => Err(AnalysisError::ArchiveInvalid(format!(
            "invalid extension on {} (expected .{PROJECT_EXTENSION})",
            path.display()
        ))),
    }
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>, AnalysisError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|_| AnalysisError::ArchiveInvalid(format!("missing required entry: {name}")))?;
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut bytes)?;
    Ok(bytes)
}

fn read_json<T: serde::de::DeserializeOwned>(
    archive: &mut ZipArchive<File>,
    name: &str,
) -> Result<T, AnalysisError> {
    let bytes = read_entry(archive, name)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| AnalysisError::ArchiveInvalid(format!("{name}: {e}")))
}
