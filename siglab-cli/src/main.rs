//! Siglab CLI — import, inspect, and summarize `.mpai` projects.
//!
//! Commands:
//! - `import`   — read a CSV, validate and auto-fix columns, save a project
//! - `info`     — print project metadata without loading the data
//! - `validate` — integrity-check a project file
//! - `stats`    — load a project and print per-signal statistics
//! - `filter`   — evaluate a range filter and print the matching segments

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fern::colors::{Color, ColoredLevelConfig};
use log::info;
use polars::prelude::*;

use siglab_core::analysis::stats::DutyCycleMode;
use siglab_core::data::table::DataFrameTable;
use siglab_core::data::validator::DataValidator;
use siglab_core::filter::{FilterCondition, RangeBound, RangeFilter, RangeOp};
use siglab_core::project::archive;
use siglab_core::{AnalysisSession, SessionConfig};

#[derive(Parser)]
#[command(name = "siglab", about = "Multi-channel time-series project tool", version)]
struct Cli {
    /// Verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Optional session config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a .mpai project from a CSV file
    Import {
        /// Source CSV file
        csv: PathBuf,
        /// Output project path (defaults to the CSV name with .mpai)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Name of the time column (defaults to the first column)
        #[arg(short, long)]
        time_column: Option<String>,
        /// Skip the validator's auto-fix pass
        #[arg(long)]
        no_fix: bool,
    },
    /// Print project metadata without loading the data
    Info { project: PathBuf },
    /// Check a project file's integrity
    Validate { project: PathBuf },
    /// Print per-signal statistics for a project
    Stats {
        project: PathBuf,
        /// Restrict to these signals (comma-separated)
        #[arg(short, long, value_delimiter = ',')]
        signals: Vec<String>,
        /// Scope to a time range: start,end
        #[arg(short, long, num_args = 2, value_names = ["START", "END"])]
        range: Option<Vec<f64>>,
        /// Manual duty-cycle threshold (default: signal mean)
        #[arg(long)]
        duty_threshold: Option<f64>,
    },
    /// Run the column validator on a CSV and print its report
    Check { csv: PathBuf },
    /// Evaluate a range filter and print matching time segments
    Filter {
        project: PathBuf,
        /// Parameter to filter on
        #[arg(short, long)]
        parameter: String,
        /// Lower bound (inclusive)
        #[arg(long)]
        min: Option<f64>,
        /// Upper bound (inclusive)
        #[arg(long)]
        max: Option<f64>,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(cli.verbose) {
        eprintln!("failed to initialize logging: {e}");
    }
    if let Err(e) = run(cli) {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::BrightBlack);
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{}] {}: {}",
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()?;
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    let config = cli
        .config
        .as_deref()
        .map(SessionConfig::load)
        .unwrap_or_default();

    match cli.command {
        Command::Import {
            csv,
            output,
            time_column,
            no_fix,
        } => import(csv, output, time_column, no_fix, config),
        Command::Info { project } => info_command(project),
        Command::Validate { project } => validate_command(project),
        Command::Stats {
            project,
            signals,
            range,
            duty_threshold,
        } => stats_command(project, signals, range, duty_threshold, config),
        Command::Check { csv } => check_command(csv),
        Command::Filter {
            project,
            parameter,
            min,
            max,
        } => filter_command(project, parameter, min, max, config),
    }
}

fn check_command(csv: PathBuf) -> Result<()> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(1_000))
        .try_into_reader_with_file_path(Some(csv.clone()))
        .with_context(|| format!("cannot open {}", csv.display()))?
        .finish()
        .context("CSV parse failed")?;

    let validator = DataValidator::new();
    let table = DataFrameTable::new(df);
    let results = validator.validate_table(&table);

    let mut names: Vec<&String> = results.keys().collect();
    names.sort();
    for name in names {
        let r = &results[name];
        println!(
            "{name}: {} (confidence {:.0}%{})",
            r.data_type,
            r.confidence * 100.0,
            r.detected_format
                .as_deref()
                .map(|f| format!(", format {f}"))
                .unwrap_or_default()
        );
        for issue in &r.issues {
            println!("  issue:      {issue}");
        }
        for suggestion in &r.suggestions {
            println!("  suggestion: {suggestion}");
        }
    }
    Ok(())
}

fn import(
    csv: PathBuf,
    output: Option<PathBuf>,
    time_column: Option<String>,
    no_fix: bool,
    config: SessionConfig,
) -> Result<()> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(1_000))
        .try_into_reader_with_file_path(Some(csv.clone()))
        .with_context(|| format!("cannot open {}", csv.display()))?
        .finish()
        .context("CSV parse failed")?;
    info!("read {} rows, {} columns", df.height(), df.width());

    let df = if no_fix {
        df
    } else {
        let validator = DataValidator::new();
        let table = DataFrameTable::new(df.clone());
        let results = validator.validate_table(&table);
        for (column, result) in &results {
            for issue in &result.issues {
                log::warn!("{column}: {issue}");
            }
        }
        validator.auto_fix(&df, &results)?
    };

    let time_column = match time_column {
        Some(name) => name,
        None => df
            .get_column_names()
            .first()
            .map(|s| s.to_string())
            .context("CSV has no columns")?,
    };

    let session = AnalysisSession::new(config);
    session
        .load_dataframe(df, &time_column)
        .context("cannot build session from table")?;

    let output = output.unwrap_or_else(|| csv.with_extension(archive::PROJECT_EXTENSION));
    let written = session.save_project(
        &output,
        Some(serde_json::json!({
            "original_file": csv.file_name().and_then(|n| n.to_str()),
        })),
        |step, percent| info!("{step} ({percent}%)"),
    )?;
    println!("project written to {}", written.display());
    Ok(())
}

fn info_command(project: PathBuf) -> Result<()> {
    let metadata = archive::peek(&project)?;
    println!("version:      {}", metadata.version);
    println!("created:      {}", metadata.created_date);
    println!(
        "application:  {} {}",
        metadata.app_name, metadata.app_version
    );
    println!("rows:         {}", metadata.data_info.row_count);
    println!("columns:      {}", metadata.data_info.column_count);
    for column in &metadata.data_info.columns {
        let dtype = metadata
            .data_info
            .dtypes
            .get(column)
            .map(String::as_str)
            .unwrap_or("?");
        println!("  {column}: {dtype}");
    }
    Ok(())
}

fn validate_command(project: PathBuf) -> Result<()> {
    let (ok, reason) = archive::validate(&project);
    println!("{}: {reason}", if ok { "valid" } else { "invalid" });
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

fn stats_command(
    project: PathBuf,
    signals: Vec<String>,
    range: Option<Vec<f64>>,
    duty_threshold: Option<f64>,
    config: SessionConfig,
) -> Result<()> {
    let session = AnalysisSession::new(config);
    session.load_project(&project, |step, percent| info!("{step} ({percent}%)"))?;

    let names = if signals.is_empty() {
        None
    } else {
        Some(signals.as_slice())
    };
    let time_range = range.map(|r| (r[0], r[1]));
    let (mode, value) = match duty_threshold {
        Some(v) => (DutyCycleMode::Manual, v),
        None => (DutyCycleMode::Auto, 0.0),
    };

    let stats = session.statistics(names, time_range, mode, value);
    if stats.is_empty() {
        bail!("no samples in the requested scope");
    }

    let mut names: Vec<&String> = stats.keys().collect();
    names.sort();
    for name in names {
        let s = &stats[name];
        println!("{name}");
        println!("  count:       {}", s.count);
        println!("  mean:        {:.6}", s.mean);
        println!("  std:         {:.6}", s.std);
        println!("  min / max:   {:.6} / {:.6}", s.min, s.max);
        println!("  median:      {:.6}", s.median);
        println!("  rms:         {:.6}", s.rms);
        println!("  p2p:         {:.6}", s.peak_to_peak);
        if let (Some(q25), Some(q75)) = (s.q25, s.q75) {
            println!("  q25 / q75:   {q25:.6} / {q75:.6}");
        }
        println!("  duty cycle:  {:.2}%", s.duty_cycle_percent);
        if let Some(rate) = s.sample_rate {
            println!("  sample rate: {rate:.3} Hz");
        }
        if let Some(duration) = s.duration {
            println!("  duration:    {duration:.3}");
        }
    }
    Ok(())
}

fn filter_command(
    project: PathBuf,
    parameter: String,
    min: Option<f64>,
    max: Option<f64>,
    config: SessionConfig,
) -> Result<()> {
    if min.is_none() && max.is_none() {
        bail!("at least one of --min / --max is required");
    }
    let session = AnalysisSession::new(config);
    session.load_project(&project, |_, _| {})?;

    let mut ranges = Vec::new();
    if let Some(value) = min {
        ranges.push(RangeFilter {
            bound: RangeBound::Lower,
            op: RangeOp::Ge,
            value,
        });
    }
    if let Some(value) = max {
        ranges.push(RangeFilter {
            bound: RangeBound::Upper,
            op: RangeOp::Le,
            value,
        });
    }
    // A two-sided band is the AND of its bounds: one condition per bound.
    let conditions: Vec<FilterCondition> = ranges
        .into_iter()
        .map(|range| FilterCondition {
            parameter: parameter.clone(),
            ranges: vec![range],
        })
        .collect();

    let segments = session.evaluate_segments_now(&conditions)?;
    if segments.is_empty() {
        println!("no samples match");
        return Ok(());
    }
    println!("{} segment(s):", segments.len());
    for segment in &segments {
        println!(
            "  [{:.6}, {:.6}] ({:.6})",
            segment.start,
            segment.end,
            segment.duration()
        );
    }
    Ok(())
}
