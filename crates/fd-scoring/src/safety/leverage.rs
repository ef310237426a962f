//! Debt ratio factor.
//!
//! Average debt-to-assets over the most recent quarters reported within the
//! last year, negated so that a less levered balance sheet scores higher.

use crate::{
    Dimension, Result,
    config::LeverageConfig,
    panel::{Panel, StockSeries, factor_frame, finite},
    profitability::quarterly::trailing_mean,
    traits::{ConfigurableFactor, DataFrequency, Factor, InputKind},
};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;

/// Low debt ratio factor.
///
/// # Required Columns
/// - `symbol`: Stock code
/// - `date`: Report date
/// - `debt_to_assets`: Total liabilities over total assets
///
/// # Returns
/// DataFrame with columns: `symbol`, `low_debt_ratio`
#[derive(Debug, Clone, Default)]
pub struct DebtRatio {
    config: LeverageConfig,
}

impl DebtRatio {
    fn compute_stock(&self, stock: &StockSeries) -> Result<Vec<Option<f64>>> {
        let window = stock.tail(self.config.window_quarters);
        let mean = trailing_mean(window.column(0), self.config.min_observations);
        Ok(vec![finite("low_debt_ratio", mean.map(|m| -m))?])
    }
}

impl Factor for DebtRatio {
    fn name(&self) -> &str {
        "debt_ratio"
    }

    fn description(&self) -> &str {
        "Negated average debt-to-assets ratio over recent quarters"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Safety
    }

    fn outputs(&self) -> &[&'static str] {
        &["low_debt_ratio"]
    }

    fn input(&self) -> InputKind {
        InputKind::Financial
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "debt_to_assets"]
    }

    fn lookback(&self) -> usize {
        self.config.window_quarters
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn compute_raw(&self, data: &LazyFrame, date: NaiveDate) -> Result<DataFrame> {
        let earliest = date - Duration::days(self.config.lookback_days);
        let filtered = data
            .clone()
            .filter(
                col("date")
                    .lt_eq(lit(date.to_string()))
                    .and(col("date").gt_eq(lit(earliest.to_string()))),
            )
            .collect()?;

        let panel = Panel::from_frame(&filtered, &["debt_to_assets"])?;
        let rows = panel.fan_out(self.name(), |stock| self.compute_stock(stock));

        factor_frame(self.outputs(), rows)
    }
}

impl ConfigurableFactor for DebtRatio {
    type Config = LeverageConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_debt_ratio_uses_last_four_quarters() {
        let df = df![
            "symbol" => ["AAA", "AAA", "AAA", "AAA", "AAA", "BBB"],
            "date" => ["2023-03-31", "2023-06-30", "2023-09-30", "2023-12-31", "2024-03-31", "2024-03-31"],
            "debt_to_assets" => [90.0, 40.0, 50.0, 60.0, 70.0, 30.0]
        ]
        .unwrap();

        let result = DebtRatio::default()
            .compute_raw(&df.lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();

        let values = result.column("low_debt_ratio").unwrap().f64().unwrap();
        assert_relative_eq!(values.get(0).unwrap(), -55.0);
        // One quarter is not enough.
        assert!(values.get(1).is_none());
    }

    #[test]
    fn test_debt_ratio_ignores_old_reports() {
        let df = df![
            "symbol" => ["AAA", "AAA", "AAA", "AAA"],
            "date" => ["2022-09-30", "2022-12-31", "2023-06-30", "2024-03-31"],
            "debt_to_assets" => [10.0, 20.0, 40.0, 60.0]
        ]
        .unwrap();

        let result = DebtRatio::default()
            .compute_raw(&df.lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();

        let values = result.column("low_debt_ratio").unwrap().f64().unwrap();
        assert_relative_eq!(values.get(0).unwrap(), -50.0);
    }

    #[test]
    fn test_debt_ratio_metadata() {
        let factor = DebtRatio::default();
        assert_eq!(factor.name(), "debt_ratio");
        assert_eq!(factor.lookback(), 4);
        assert_eq!(factor.dimension(), Dimension::Safety);
    }
}
