//! Long-table to per-stock series conversion.
//!
//! Engines filter their input with polars, then hand each stock's series to
//! plain Rust for the windowed arithmetic. Rows are keyed by (symbol, date);
//! when a key repeats, the row that appears last in the input wins.

use crate::{Result, ScoringError};
use polars::prelude::*;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// One stock's observations, sorted by date.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StockSeries {
    pub(crate) symbol: String,
    pub(crate) dates: Vec<String>,
    values: Vec<Vec<Option<f64>>>,
}

impl StockSeries {
    /// Values of the `idx`-th requested column.
    pub(crate) fn column(&self, idx: usize) -> &[Option<f64>] {
        &self.values[idx]
    }

    pub(crate) fn len(&self) -> usize {
        self.dates.len()
    }

    /// Keep only the last `n` observations.
    pub(crate) fn tail(&self, n: usize) -> Self {
        let start = self.len().saturating_sub(n);
        Self {
            symbol: self.symbol.clone(),
            dates: self.dates[start..].to_vec(),
            values: self.values.iter().map(|v| v[start..].to_vec()).collect(),
        }
    }
}

/// Per-stock series for a fixed set of value columns.
#[derive(Debug, Clone)]
pub(crate) struct Panel {
    pub(crate) stocks: Vec<StockSeries>,
}

impl Panel {
    /// Split `df` into per-stock series of `value_columns`.
    ///
    /// `df` must have `symbol` and `date` columns. Dates may be ISO strings or
    /// a temporal type. Non-finite values are treated as missing.
    pub(crate) fn from_frame(df: &DataFrame, value_columns: &[&str]) -> Result<Self> {
        ensure_columns(df, ["symbol", "date"].iter().chain(value_columns))?;

        let symbols = df.column("symbol")?.cast(&DataType::String)?;
        let symbols = symbols.str()?;
        let dates = df.column("date")?.cast(&DataType::String)?;
        let dates = dates.str()?;
        let casted = value_columns
            .iter()
            .map(|name| df.column(name)?.cast(&DataType::Float64))
            .collect::<PolarsResult<Vec<_>>>()?;
        let columns = casted
            .iter()
            .map(|c| c.f64())
            .collect::<PolarsResult<Vec<_>>>()?;

        let mut grouped: BTreeMap<String, BTreeMap<String, Vec<Option<f64>>>> = BTreeMap::new();
        for idx in 0..df.height() {
            let (Some(symbol), Some(date)) = (symbols.get(idx), dates.get(idx)) else {
                continue;
            };
            let row = columns
                .iter()
                .map(|c| c.get(idx).filter(|v| v.is_finite()))
                .collect();
            grouped
                .entry(symbol.to_string())
                .or_default()
                .insert(date.to_string(), row);
        }

        let stocks = grouped
            .into_iter()
            .map(|(symbol, rows)| {
                let mut values = vec![Vec::with_capacity(rows.len()); value_columns.len()];
                let mut dates = Vec::with_capacity(rows.len());
                for (date, row) in rows {
                    dates.push(date);
                    for (col_values, value) in values.iter_mut().zip(row) {
                        col_values.push(value);
                    }
                }
                StockSeries {
                    symbol,
                    dates,
                    values,
                }
            })
            .collect();

        Ok(Self { stocks })
    }

    /// Run `calc` for every stock in parallel.
    ///
    /// A failing stock is logged and left out; it never aborts the others.
    pub(crate) fn fan_out<T, F>(&self, calculator: &str, calc: F) -> Vec<(String, T)>
    where
        T: Send,
        F: Fn(&StockSeries) -> Result<T> + Sync,
    {
        self.stocks
            .par_iter()
            .filter_map(|stock| match calc(stock) {
                Ok(value) => Some((stock.symbol.clone(), value)),
                Err(err) => {
                    tracing::warn!(
                        calculator,
                        symbol = %stock.symbol,
                        error = %err,
                        "stock skipped"
                    );
                    None
                }
            })
            .collect()
    }
}

/// Fail with [`ScoringError::MissingColumn`] unless every name is present.
pub(crate) fn ensure_columns<'a>(
    df: &DataFrame,
    names: impl IntoIterator<Item = &'a &'a str>,
) -> Result<()> {
    let schema = df.schema();
    for name in names {
        if !schema.contains(name) {
            return Err(ScoringError::MissingColumn((*name).to_string()));
        }
    }
    Ok(())
}

/// Build a `symbol` + factor-columns frame from per-stock rows.
pub(crate) fn factor_frame(outputs: &[&str], rows: Vec<(String, Vec<Option<f64>>)>) -> Result<DataFrame> {
    let mut symbols = Vec::with_capacity(rows.len());
    let mut values = vec![Vec::with_capacity(rows.len()); outputs.len()];
    for (symbol, row) in rows {
        symbols.push(symbol);
        for (col_values, value) in values.iter_mut().zip(row) {
            col_values.push(value);
        }
    }

    let mut columns: Vec<Column> = vec![Series::new("symbol".into(), symbols).into()];
    for (name, col_values) in outputs.iter().zip(values) {
        columns.push(Series::new((*name).into(), col_values).into());
    }
    Ok(DataFrame::new(columns)?)
}

/// Reject non-finite results so they never leak into cross-sectional means.
pub(crate) fn finite(name: &str, value: Option<f64>) -> Result<Option<f64>> {
    match value {
        Some(v) if !v.is_finite() => Err(ScoringError::Computation(format!(
            "{name} produced a non-finite value"
        ))),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_sorts_and_deduplicates() {
        let df = df![
            "symbol" => ["B", "A", "A", "A"],
            "date" => ["2024-03-31", "2024-06-30", "2024-03-31", "2024-06-30"],
            "value" => [Some(1.0), Some(2.0), None, Some(3.0)]
        ]
        .unwrap();

        let panel = Panel::from_frame(&df, &["value"]).unwrap();
        assert_eq!(panel.stocks.len(), 2);

        let a = &panel.stocks[0];
        assert_eq!(a.symbol, "A");
        assert_eq!(a.dates, vec!["2024-03-31", "2024-06-30"]);
        // The later duplicate for 2024-06-30 wins.
        assert_eq!(a.column(0), &[None, Some(3.0)]);
    }

    #[test]
    fn test_panel_missing_column() {
        let df = df![
            "symbol" => ["A"],
            "date" => ["2024-03-31"]
        ]
        .unwrap();

        let err = Panel::from_frame(&df, &["roe"]).unwrap_err();
        assert!(matches!(err, ScoringError::MissingColumn(c) if c == "roe"));
    }

    #[test]
    fn test_panel_drops_non_finite() {
        let df = df![
            "symbol" => ["A", "A"],
            "date" => ["2024-03-31", "2024-06-30"],
            "value" => [f64::NAN, 1.0]
        ]
        .unwrap();

        let panel = Panel::from_frame(&df, &["value"]).unwrap();
        assert_eq!(panel.stocks[0].column(0), &[None, Some(1.0)]);
    }

    #[test]
    fn test_tail_keeps_latest() {
        let df = df![
            "symbol" => ["A", "A", "A"],
            "date" => ["2024-01-31", "2024-02-29", "2024-03-31"],
            "value" => [1.0, 2.0, 3.0]
        ]
        .unwrap();

        let panel = Panel::from_frame(&df, &["value"]).unwrap();
        let tail = panel.stocks[0].tail(2);
        assert_eq!(tail.dates, vec!["2024-02-29", "2024-03-31"]);
        assert_eq!(tail.column(0), &[Some(2.0), Some(3.0)]);
        assert_eq!(panel.stocks[0].tail(10).len(), 3);
    }

    #[test]
    fn test_factor_frame_shape() {
        let df = factor_frame(
            &["x", "y"],
            vec![
                ("A".to_string(), vec![Some(1.0), None]),
                ("B".to_string(), vec![None, Some(2.0)]),
            ],
        )
        .unwrap();
        assert_eq!(df.shape(), (2, 3));
        assert_eq!(df.column("y").unwrap().f64().unwrap().get(1), Some(2.0));
    }
}
