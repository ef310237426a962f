//! CLI for the fd-scoring fundamentals scoring engine.
//!
//! Inputs are CSV files in the long layout the engine expects: statements
//! and daily rows keyed by `symbol` and `date`, a universe table, and a
//! benchmark series. Results are written as CSV; summaries go to stdout as
//! JSON.

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use fd_scoring::{
    Dimension, FactorRegistry, InMemorySource, ScoringConfig, ScoringEngine,
    horizons::growth_horizons, scoring::{FINAL_RANK, PEER_GROUP},
};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::*;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "fd-scoring")]
#[command(about = "Cross-sectional fundamentals scoring", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List every factor by dimension
    List,
    /// Show the growth horizons used for an evaluation year
    Horizons {
        /// Evaluation year
        year: i32,
    },
    /// Score one evaluation date
    Score {
        #[command(flatten)]
        inputs: InputArgs,
        /// Evaluation date (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
        /// Write the per-stock table to this CSV file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Score several evaluation dates
    Batch {
        #[command(flatten)]
        inputs: InputArgs,
        /// Evaluation dates (YYYY-MM-DD), comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        dates: Vec<NaiveDate>,
        /// Write one `scores_<date>.csv` per scored date into this directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
struct InputArgs {
    /// Quarterly statements CSV
    #[arg(long)]
    financial: PathBuf,
    /// Daily returns and market values CSV
    #[arg(long)]
    daily: PathBuf,
    /// Stock universe CSV
    #[arg(long)]
    universe: PathBuf,
    /// Benchmark index CSV (`date`, `close`, `return`)
    #[arg(long)]
    benchmark: Option<PathBuf>,
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// Stocks to score, comma separated (default: whole universe)
    #[arg(long, value_delimiter = ',')]
    symbols: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::List => list_factors(),
        Commands::Horizons { year } => show_horizons(year),
        Commands::Score {
            inputs,
            date,
            output,
        } => score(&inputs, date, output.as_deref())?,
        Commands::Batch {
            inputs,
            dates,
            output_dir,
        } => batch(&inputs, &dates, output_dir.as_deref())?,
    }
    Ok(())
}

/// List all factors grouped by dimension.
fn list_factors() {
    let registry = FactorRegistry::with_config(&ScoringConfig::default());
    let all_info = registry.all_info();

    println!("Available Factors ({} total)\n", all_info.len());
    for dimension in Dimension::ALL {
        println!("{dimension}:");
        for info in all_info.iter().filter(|i| i.dimension == dimension) {
            println!(
                "  {} - {} [{}, lookback {}, {}]",
                info.name,
                info.description,
                info.calculator,
                info.lookback,
                info.frequency
            );
        }
        println!();
    }
}

fn show_horizons(year: i32) {
    let horizons = growth_horizons(year);
    if horizons.is_empty() {
        println!("{year}: no growth horizons");
    } else {
        let years: Vec<String> = horizons.iter().map(|h| format!("{h}y")).collect();
        println!("{year}: {}", years.join(", "));
    }
}

fn score(inputs: &InputArgs, date: NaiveDate, output: Option<&Path>) -> Result<()> {
    let (engine, symbols) = build_engine(inputs)?;
    let report = engine
        .compute_scores(&symbols, date)
        .with_context(|| format!("scoring {date}"))?;

    if let Some(path) = output {
        write_scores(report.scores.clone(), path)?;
    }
    println!("{}", serde_json::to_string_pretty(&report.summary)?);
    Ok(())
}

fn batch(inputs: &InputArgs, dates: &[NaiveDate], output_dir: Option<&Path>) -> Result<()> {
    let (engine, symbols) = build_engine(inputs)?;

    let progress = ProgressBar::new(dates.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} dates ({elapsed})")
            .context("progress bar template")?,
    );
    let batch = engine.score_batch_with(&symbols, dates, |_, _| progress.inc(1));
    progress.finish();

    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        for (date, report) in &batch.reports {
            write_scores(report.scores.clone(), &dir.join(format!("scores_{date}.csv")))?;
        }
    }

    let summaries: Vec<_> = batch.reports.values().map(|r| &r.summary).collect();
    let out = serde_json::json!({
        "succeeded": batch.success_count(),
        "failed": batch.failure_count(),
        "success_rate": batch.success_rate(),
        "failures": batch.failures,
        "summaries": summaries,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);

    if batch.success_count() == 0 {
        bail!("no evaluation date could be scored");
    }
    Ok(())
}

fn build_engine(inputs: &InputArgs) -> Result<(ScoringEngine<InMemorySource>, Vec<String>)> {
    let config = match &inputs.config {
        Some(path) => ScoringConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ScoringConfig::default(),
    };

    let mut source = InMemorySource::new(
        read_csv(&inputs.financial)?,
        read_csv(&inputs.daily)?,
        read_csv(&inputs.universe)?,
    )?;
    if let Some(path) = &inputs.benchmark {
        source = source.with_benchmark(config.market_risk.benchmark_code.clone(), read_csv(path)?)?;
    }

    let symbols = if inputs.symbols.is_empty() {
        source.symbols()?
    } else {
        inputs.symbols.clone()
    };
    tracing::info!(stocks = symbols.len(), "inputs loaded");

    Ok((ScoringEngine::new(source, config)?, symbols))
}

/// Read a CSV file, keeping stock codes as text.
fn read_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .and_then(|reader| reader.finish())
        .with_context(|| format!("reading {}", path.display()))?;

    if !df.schema().contains("symbol") {
        return Ok(df);
    }
    Ok(df
        .lazy()
        .with_column(col("symbol").cast(DataType::String))
        .collect()?)
}

/// Write scores sorted by peer group and rank, unranked stocks last.
fn write_scores(df: DataFrame, path: &Path) -> Result<()> {
    let mut sorted = df.sort(
        [PEER_GROUP, FINAL_RANK],
        SortMultipleOptions::default().with_nulls_last(true),
    )?;
    let mut file =
        std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    CsvWriter::new(&mut file).finish(&mut sorted)?;
    tracing::info!(path = %path.display(), rows = sorted.height(), "scores written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_factor_listed() {
        let registry = FactorRegistry::with_config(&ScoringConfig::default());
        let all_info = registry.all_info();

        assert_eq!(all_info.len(), Dimension::all_factors().count());
        for info in all_info {
            assert!(!info.description.is_empty());
            assert!(!info.required_columns.is_empty());
        }
    }

    #[test]
    fn test_parse_batch_dates() {
        let cli = Cli::try_parse_from([
            "fd-scoring",
            "batch",
            "--financial",
            "f.csv",
            "--daily",
            "d.csv",
            "--universe",
            "u.csv",
            "--dates",
            "2023-04-30,2024-04-30",
        ])
        .unwrap();

        match cli.command {
            Commands::Batch { dates, inputs, .. } => {
                assert_eq!(dates.len(), 2);
                assert!(inputs.symbols.is_empty());
                assert!(inputs.benchmark.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_score_requires_date() {
        let parsed = Cli::try_parse_from([
            "fd-scoring",
            "score",
            "--financial",
            "f.csv",
            "--daily",
            "d.csv",
            "--universe",
            "u.csv",
        ]);
        assert!(parsed.is_err());
    }
}
