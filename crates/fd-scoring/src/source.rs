//! Input data collaborators.
//!
//! The engine never fetches data itself. It asks a [`DataSource`] for long
//! tables keyed by `symbol` and `date`, with dates as ISO `YYYY-MM-DD`
//! strings.

use crate::{Result, ScoringError, panel::ensure_columns};
use chrono::NaiveDate;
use polars::prelude::*;
use std::collections::HashMap;

/// Supplier of raw time series and reference data.
pub trait DataSource: Send + Sync + std::fmt::Debug {
    /// Quarterly statements: `symbol`, `date` (report date), then `metrics`.
    fn financial_series(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        metrics: &[&str],
    ) -> Result<DataFrame>;

    /// Daily market data: `symbol`, `date` (trade date), then `fields`.
    fn daily_series(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[&str],
    ) -> Result<DataFrame>;

    /// Reference data: `symbol`, `name`, `industry`, `list_date`.
    fn stock_universe(&self) -> Result<DataFrame>;

    /// Benchmark index: `date`, `close`, `return`.
    fn benchmark_series(&self, code: &str, start: NaiveDate, end: NaiveDate) -> Result<DataFrame>;
}

/// [`DataSource`] backed by frames held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    financial: DataFrame,
    daily: DataFrame,
    universe: DataFrame,
    benchmarks: HashMap<String, DataFrame>,
}

impl InMemorySource {
    /// Build a source from long tables. Date columns may be strings or dates.
    pub fn new(financial: DataFrame, daily: DataFrame, universe: DataFrame) -> Result<Self> {
        Ok(Self {
            financial: normalize_dates(financial)?,
            daily: normalize_dates(daily)?,
            universe,
            benchmarks: HashMap::new(),
        })
    }

    /// Add a benchmark series under `code`.
    pub fn with_benchmark(mut self, code: impl Into<String>, series: DataFrame) -> Result<Self> {
        self.benchmarks.insert(code.into(), normalize_dates(series)?);
        Ok(self)
    }

    /// Every symbol in the universe table.
    pub fn symbols(&self) -> Result<Vec<String>> {
        Ok(self
            .universe
            .column("symbol")?
            .str()?
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect())
    }
}

impl DataSource for InMemorySource {
    fn financial_series(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        metrics: &[&str],
    ) -> Result<DataFrame> {
        slice(&self.financial, Some(symbols), start, end, metrics)
    }

    fn daily_series(
        &self,
        symbols: &[String],
        start: NaiveDate,
        end: NaiveDate,
        fields: &[&str],
    ) -> Result<DataFrame> {
        slice(&self.daily, Some(symbols), start, end, fields)
    }

    fn stock_universe(&self) -> Result<DataFrame> {
        Ok(self.universe.clone())
    }

    fn benchmark_series(&self, code: &str, start: NaiveDate, end: NaiveDate) -> Result<DataFrame> {
        let series = self
            .benchmarks
            .get(code)
            .ok_or_else(|| ScoringError::NotFound(format!("benchmark {code}")))?;
        slice(series, None, start, end, &["close", "return"])
    }
}

fn normalize_dates(df: DataFrame) -> Result<DataFrame> {
    if df.width() == 0 || !df.schema().contains("date") {
        return Ok(df);
    }
    Ok(df
        .lazy()
        .with_column(col("date").cast(DataType::String))
        .collect()?)
}

fn slice(
    df: &DataFrame,
    symbols: Option<&[String]>,
    start: NaiveDate,
    end: NaiveDate,
    columns: &[&str],
) -> Result<DataFrame> {
    if start > end {
        return Err(ScoringError::InvalidDateRange {
            start: start.to_string(),
            end: end.to_string(),
        });
    }

    let mut keys: Vec<&str> = Vec::new();
    if symbols.is_some() {
        keys.push("symbol");
    }
    keys.push("date");
    ensure_columns(df, keys.iter().chain(columns))?;

    let mut predicate = col("date")
        .gt_eq(lit(start.to_string()))
        .and(col("date").lt_eq(lit(end.to_string())));
    if let Some(symbols) = symbols {
        let wanted = Series::new("wanted".into(), symbols);
        predicate = predicate.and(col("symbol").is_in(lit(wanted)));
    }

    let selected: Vec<Expr> = keys.iter().chain(columns).map(|c| col(*c)).collect();
    Ok(df.clone().lazy().filter(predicate).select(selected).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> InMemorySource {
        let financial = df![
            "symbol" => ["AAA", "AAA", "BBB"],
            "date" => ["2023-12-31", "2024-03-31", "2024-03-31"],
            "roe" => [1.0, 2.0, 3.0],
            "debt_to_assets" => [40.0, 41.0, 60.0]
        ]
        .unwrap();
        let universe = df![
            "symbol" => ["AAA", "BBB"],
            "name" => ["Alpha", "Beta"],
            "industry" => ["Banks", "Steel"],
            "list_date" => ["2001-01-01", "2005-05-05"]
        ]
        .unwrap();
        let benchmark = df![
            "date" => ["2024-03-28", "2024-03-29"],
            "close" => [3500.0, 3510.0],
            "return" => [0.1, 0.29]
        ]
        .unwrap();

        InMemorySource::new(financial, DataFrame::empty(), universe)
            .unwrap()
            .with_benchmark("000300.SH", benchmark)
            .unwrap()
    }

    #[test]
    fn test_financial_slice() {
        let src = source();
        let df = src
            .financial_series(
                &["AAA".to_string()],
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
                &["roe"],
            )
            .unwrap();

        assert_eq!(df.shape(), (1, 3));
        assert!(df.column("debt_to_assets").is_err());
        assert_eq!(df.column("roe").unwrap().f64().unwrap().get(0), Some(2.0));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let err = source()
            .financial_series(
                &["AAA".to_string()],
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                &["roe"],
            )
            .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidDateRange { .. }));
    }

    #[test]
    fn test_unknown_metric() {
        let err = source()
            .financial_series(
                &["AAA".to_string()],
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
                &["ebit"],
            )
            .unwrap_err();
        assert!(matches!(err, ScoringError::MissingColumn(c) if c == "ebit"));
    }

    #[test]
    fn test_benchmark_lookup() {
        let src = source();
        let start = NaiveDate::from_ymd_opt(2024, 3, 29).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();

        let bench = src.benchmark_series("000300.SH", start, end).unwrap();
        assert_eq!(bench.height(), 1);
        assert!(matches!(
            src.benchmark_series("000905.SH", start, end),
            Err(ScoringError::NotFound(_))
        ));
        assert_eq!(src.symbols().unwrap(), vec!["AAA", "BBB"]);
    }
}
