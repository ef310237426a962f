//! Scoring orchestration.
//!
//! The engine fetches inputs for one evaluation date, fans the factor
//! calculators out in parallel, waits for all of them, and then runs the
//! sequential cross-sectional scoring. Evaluation dates are independent; a
//! batch keeps going when one date fails.

use crate::{
    Dimension, FactorInputs, FactorRegistry, Result, ScoringConfig, ScoringError,
    peer_group::assign_peer_groups,
    scoring::{self, FINAL_RANK, FINAL_SCORE, RawFactors},
    source::DataSource,
    standardize::winsorize_columns,
    summary::SummaryStats,
    traits::InputKind,
};
use chrono::{Duration, Local, NaiveDate};
use polars::prelude::*;
use rayon::prelude::*;
use std::{collections::BTreeMap, sync::Arc, time::Instant};

/// Columns the engine attaches itself rather than fetching as metrics.
const DERIVED: [&str; 4] = ["symbol", "date", "market_value", "market_return"];
const ROW_INDEX: &str = "__row";

/// Scores for one evaluation date.
#[derive(Debug, Clone)]
pub struct ScoreReport {
    /// Evaluation date.
    pub date: NaiveDate,
    /// One row per classified stock: `symbol`, `market_value`, `peer_group`,
    /// raw factors, standardized dimension scores, `final_score`,
    /// `final_rank`, `name`, `industry`.
    pub scores: DataFrame,
    /// Factor values after peer-group standardization.
    pub standardized: DataFrame,
    /// Summary statistics.
    pub summary: SummaryStats,
}

/// Outcome of scoring several evaluation dates.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Successful dates.
    pub reports: BTreeMap<NaiveDate, ScoreReport>,
    /// Failed dates with the error message.
    pub failures: BTreeMap<NaiveDate, String>,
}

impl BatchReport {
    /// Number of dates scored.
    pub fn success_count(&self) -> usize {
        self.reports.len()
    }

    /// Number of dates that failed.
    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    /// Share of dates scored, 0 for an empty batch.
    pub fn success_rate(&self) -> f64 {
        let total = self.success_count() + self.failure_count();
        if total == 0 {
            0.0
        } else {
            self.success_count() as f64 / total as f64
        }
    }
}

/// Cross-sectional scoring engine over a [`DataSource`].
#[derive(Debug)]
pub struct ScoringEngine<S> {
    source: S,
    config: Arc<ScoringConfig>,
    registry: FactorRegistry,
    pool: Option<rayon::ThreadPool>,
}

impl<S: DataSource> ScoringEngine<S> {
    /// Validate `config` and build the calculators.
    ///
    /// A non-zero `run.max_concurrency` gets a dedicated worker pool of that
    /// size; otherwise the global pool is used.
    pub fn new(source: S, config: ScoringConfig) -> Result<Self> {
        config.validate()?;

        let pool = match config.run.max_concurrency {
            0 => None,
            threads => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| ScoringError::Computation(e.to_string()))?,
            ),
        };

        Ok(Self {
            registry: FactorRegistry::with_config(&config),
            source,
            config: Arc::new(config),
            pool,
        })
    }

    /// The run configuration.
    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// The configured calculators.
    pub const fn registry(&self) -> &FactorRegistry {
        &self.registry
    }

    /// The data source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Reject dates before the earliest supported date or in the future.
    pub fn validate_date(&self, date: NaiveDate) -> Result<()> {
        let earliest = self.config.run.earliest_date;
        if date < earliest {
            return Err(ScoringError::InvalidDate {
                date,
                reason: format!("before the earliest supported date {earliest}"),
            });
        }
        if date > Local::now().date_naive() {
            return Err(ScoringError::InvalidDate {
                date,
                reason: "in the future".to_string(),
            });
        }
        Ok(())
    }

    /// Score `symbols` as of `date`.
    pub fn compute_scores(&self, symbols: &[String], date: NaiveDate) -> Result<ScoreReport> {
        self.install(|| self.score_date(symbols, date))
    }

    /// Score several dates concurrently.
    pub fn score_batch(&self, symbols: &[String], dates: &[NaiveDate]) -> BatchReport {
        self.score_batch_with(symbols, dates, |_, _| {})
    }

    /// Score several dates, calling `on_done` as each one finishes.
    pub fn score_batch_with<F>(&self, symbols: &[String], dates: &[NaiveDate], on_done: F) -> BatchReport
    where
        F: Fn(NaiveDate, &Result<ScoreReport>) + Sync,
    {
        let outcomes: Vec<(NaiveDate, Result<ScoreReport>)> = self.install(|| {
            dates
                .par_iter()
                .map(|&date| {
                    let outcome = self.score_date(symbols, date);
                    on_done(date, &outcome);
                    (date, outcome)
                })
                .collect()
        });

        let mut batch = BatchReport::default();
        for (date, outcome) in outcomes {
            match outcome {
                Ok(report) => {
                    batch.reports.insert(date, report);
                }
                Err(err) => {
                    if err.is_batch_failure() {
                        tracing::warn!(%date, error = %err, "evaluation date failed");
                    } else {
                        tracing::error!(%date, error = %err, "evaluation date aborted");
                    }
                    batch.failures.insert(date, err.to_string());
                }
            }
        }

        tracing::info!(
            succeeded = batch.success_count(),
            failed = batch.failure_count(),
            success_rate = batch.success_rate(),
            "batch finished"
        );
        batch
    }

    fn install<T: Send>(&self, op: impl FnOnce() -> T + Send) -> T {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }

    fn score_date(&self, symbols: &[String], date: NaiveDate) -> Result<ScoreReport> {
        let started = Instant::now();
        self.validate_date(date)?;
        if symbols.is_empty() {
            return Err(ScoringError::NoStocks(date));
        }

        let (financial, metrics) = self.load_financial(symbols, date)?;
        let daily = self.load_daily(symbols, date)?;
        if financial.height() == 0 && daily.height() == 0 {
            return Err(ScoringError::NoStocks(date));
        }

        let peers = assign_peer_groups(&daily, date, &self.config.peer_group)?;
        if peers.height() == 0 {
            return Err(ScoringError::NoPeerGroups(date));
        }
        if peers.height() < symbols.len() {
            tracing::warn!(
                %date,
                unclassified = symbols.len() - peers.height(),
                "stocks without a recent market value are not scored"
            );
        }

        let financial = self.preprocess(financial, &metrics)?;
        let inputs = FactorInputs {
            snapshot: attach_market_value(&financial, &peers)?,
            daily: self.attach_benchmark(daily, date)?,
            financial,
        };

        let raw = self.registry.compute_all(&peers, &inputs, date)?;
        let has_values = Dimension::all_factors()
            .any(|f| raw.column(f).is_ok_and(|c| c.null_count() < c.len()));
        if !has_values {
            return Err(ScoringError::NoFactorData(date));
        }

        let (standardized, ranked) = scoring::score(RawFactors::new(raw.clone())?, &self.config)?;
        let scores = self.attach_identity(combine_scores(raw, ranked.frame())?)?;
        let summary = SummaryStats::from_frame(&scores, date)?;

        tracing::info!(
            %date,
            stocks = summary.total_stocks,
            ranked = summary.ranked_stocks,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "evaluation date scored"
        );

        Ok(ScoreReport {
            date,
            scores,
            standardized: standardized.frame().clone(),
            summary,
        })
    }

    /// Quarterly statements covering the longest quarterly lookback.
    fn load_financial(&self, symbols: &[String], date: NaiveDate) -> Result<(DataFrame, Vec<&str>)> {
        let mut metrics: Vec<&str> = Vec::new();
        for kind in [InputKind::Financial, InputKind::Snapshot] {
            for column in self.registry.input_columns(kind) {
                if !DERIVED.contains(&column) && !metrics.contains(&column) {
                    metrics.push(column);
                }
            }
        }

        let quarters = self
            .registry
            .max_lookback(InputKind::Financial)
            .max(self.registry.max_lookback(InputKind::Snapshot))
            + 4;
        let days = (quarters as i64 * 92).max(self.config.solvency.snapshot_lookback_days);
        let start = date - Duration::days(days);

        let df = self
            .source
            .financial_series(symbols, start, date, &metrics)
            .map_err(source_error)?;
        tracing::debug!(%date, rows = df.height(), %start, "financial series loaded");
        Ok((df, metrics))
    }

    /// Daily returns and market values covering the longest daily lookback.
    fn load_daily(&self, symbols: &[String], date: NaiveDate) -> Result<DataFrame> {
        let mut fields: Vec<&str> = self
            .registry
            .input_columns(InputKind::Daily)
            .into_iter()
            .filter(|c| !DERIVED.contains(c))
            .collect();
        fields.push("market_value");

        let start = self.daily_start(date);
        let df = self
            .source
            .daily_series(symbols, start, date, &fields)
            .map_err(source_error)?;
        tracing::debug!(%date, rows = df.height(), %start, "daily series loaded");
        Ok(df)
    }

    /// First calendar day of the daily window ending at `date`.
    fn daily_start(&self, date: NaiveDate) -> NaiveDate {
        let trading_days = self.registry.max_lookback(InputKind::Daily) as i64;
        let days = (trading_days * 365 / 252 + 30).max(self.config.peer_group.lookback_days);
        date - Duration::days(days)
    }

    /// Drop repeated (symbol, date) rows, keeping the last, then winsorize.
    fn preprocess(&self, financial: DataFrame, metrics: &[&str]) -> Result<DataFrame> {
        let deduped = financial
            .lazy()
            .with_row_index(ROW_INDEX, None)
            .filter(col(ROW_INDEX).eq(col(ROW_INDEX).max().over([col("symbol"), col("date")])))
            .drop([ROW_INDEX])
            .collect()?;

        let pre = &self.config.preprocess;
        if !pre.winsorize {
            return Ok(deduped);
        }
        winsorize_columns(&deduped, metrics, pre.lower_pct, pre.upper_pct)
    }

    /// Join the benchmark return onto daily rows as `market_return`.
    ///
    /// A missing benchmark leaves `market_return` null, which leaves the
    /// market-risk factors undefined for every stock.
    fn attach_benchmark(&self, daily: DataFrame, date: NaiveDate) -> Result<DataFrame> {
        let code = &self.config.market_risk.benchmark_code;
        let benchmark = match self.source.benchmark_series(code, self.daily_start(date), date) {
            Ok(series) => series
                .lazy()
                .select([
                    col("date"),
                    col("return").cast(DataType::Float64).alias("market_return"),
                ])
                .collect()?,
            Err(err) => {
                tracing::warn!(benchmark = %code, error = %err, "benchmark unavailable");
                DataFrame::new(vec![
                    Column::new("date".into(), Vec::<String>::new()),
                    Column::new("market_return".into(), Vec::<f64>::new()),
                ])?
            }
        };

        Ok(daily
            .lazy()
            .join(
                benchmark.lazy(),
                [col("date")],
                [col("date")],
                JoinArgs::new(JoinType::Left),
            )
            .collect()?)
    }

    /// Add `name` and `industry` from the universe table.
    ///
    /// Stocks missing from the universe fall back to their code and
    /// `unknown`.
    fn attach_identity(&self, scores: DataFrame) -> Result<DataFrame> {
        let identity = identity_frame(&self.source.stock_universe().map_err(source_error)?)?;

        Ok(scores
            .lazy()
            .with_row_index(ROW_INDEX, None)
            .join(
                identity.lazy(),
                [col("symbol")],
                [col("symbol")],
                JoinArgs::new(JoinType::Left),
            )
            .with_columns([
                col("name").fill_null(col("symbol")),
                col("industry").fill_null(lit("unknown")),
            ])
            .sort([ROW_INDEX], SortMultipleOptions::default())
            .drop([ROW_INDEX])
            .collect()?)
    }
}

/// Report a failed fetch as a data source failure.
fn source_error(err: ScoringError) -> ScoringError {
    match err {
        ScoringError::DataSource(_) => err,
        other => ScoringError::DataSource(other.to_string()),
    }
}

/// Attach each stock's latest market value to its financial rows.
fn attach_market_value(financial: &DataFrame, peers: &DataFrame) -> Result<DataFrame> {
    Ok(financial
        .clone()
        .lazy()
        .join(
            peers.clone().lazy().select([col("symbol"), col("market_value")]),
            [col("symbol")],
            [col("symbol")],
            JoinArgs::new(JoinType::Left),
        )
        .collect()?)
}

/// Raw factor table plus the dimension, final and rank columns.
///
/// Both frames come from the same scoring run and share row order.
fn combine_scores(raw: DataFrame, ranked: &DataFrame) -> Result<DataFrame> {
    let mut scores = raw;
    let columns = Dimension::ALL
        .iter()
        .map(|d| d.score_column())
        .chain([FINAL_SCORE, FINAL_RANK]);
    for name in columns {
        scores.with_column(ranked.column(name)?.clone())?;
    }
    Ok(scores)
}

/// `symbol`, `name`, `industry` with one row per symbol.
fn identity_frame(universe: &DataFrame) -> Result<DataFrame> {
    if universe.width() == 0 {
        return Ok(DataFrame::new(vec![
            Column::new("symbol".into(), Vec::<String>::new()),
            Column::new("name".into(), Vec::<String>::new()),
            Column::new("industry".into(), Vec::<String>::new()),
        ])?);
    }

    let schema = universe.schema();
    let text = |name: &str| {
        if schema.contains(name) {
            col(name).cast(DataType::String)
        } else {
            lit(NULL).cast(DataType::String).alias(name)
        }
    };

    Ok(universe
        .clone()
        .lazy()
        .select([col("symbol").cast(DataType::String), text("name"), text("industry")])
        .with_row_index(ROW_INDEX, None)
        .filter(col(ROW_INDEX).eq(col(ROW_INDEX).max().over([col("symbol")])))
        .drop([ROW_INDEX])
        .collect()?)
}
