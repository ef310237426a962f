//! Trailing-window profitability factors.
//!
//! Each stock's most recent quarters (20 by default, reported within the
//! last `lookback_days`) are reduced to six scalars:
//!
//! ```text
//! roe, roa, gross_margin    = mean over the window
//! fcf_to_assets             = mean(fcff_q / total_assets_q)
//! gross_profit_to_assets    = mean(gross_profit_q / total_assets_q)
//! cash_flow_quality         = mean((depreciation_q - Δworking_capital_q) / total_assets_q)
//! ```

use crate::{
    Dimension, Result,
    config::ProfitabilityConfig,
    panel::{Panel, StockSeries, factor_frame, finite},
    traits::{ConfigurableFactor, DataFrequency, Factor, InputKind},
};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;

const ROE: usize = 0;
const ROA: usize = 1;
const GROSS_MARGIN: usize = 2;
const FCFF: usize = 3;
const GROSS_PROFIT: usize = 4;
const DEPRECIATION: usize = 5;
const WORKING_CAPITAL: usize = 6;
const TOTAL_ASSETS: usize = 7;

const METRICS: [&str; 8] = [
    "roe",
    "roa",
    "gross_margin",
    "fcff",
    "gross_profit",
    "depreciation",
    "working_capital",
    "total_assets",
];

/// Profitability factor family.
///
/// # Required Columns
/// - `symbol`, `date`: stock code and report date
/// - `roe`, `roa`, `gross_margin`: reported ratios
/// - `fcff`, `gross_profit`, `depreciation`, `working_capital`, `total_assets`
///
/// # Returns
/// DataFrame with `symbol` and one column per entry of
/// [`Dimension::Profitability`]'s factors.
#[derive(Debug, Clone, Default)]
pub struct ProfitabilityFactors {
    config: ProfitabilityConfig,
}

impl ProfitabilityFactors {
    fn compute_stock(&self, stock: &StockSeries) -> Result<Vec<Option<f64>>> {
        let window = stock.tail(self.config.window_quarters);
        let min_obs = self.config.min_observations;
        let assets = window.column(TOTAL_ASSETS);

        let values = [
            trailing_mean(window.column(ROE), min_obs),
            trailing_mean(window.column(ROA), min_obs),
            trailing_mean(window.column(GROSS_MARGIN), min_obs),
            trailing_mean(&per_period_ratio(window.column(FCFF), assets), min_obs),
            trailing_mean(&per_period_ratio(window.column(GROSS_PROFIT), assets), min_obs),
            trailing_mean(
                &cash_flow_quality(
                    window.column(DEPRECIATION),
                    window.column(WORKING_CAPITAL),
                    assets,
                ),
                min_obs,
            ),
        ];

        Dimension::Profitability
            .factors()
            .iter()
            .zip(values)
            .map(|(name, value)| finite(name, value))
            .collect()
    }
}

impl Factor for ProfitabilityFactors {
    fn name(&self) -> &str {
        "profitability"
    }

    fn description(&self) -> &str {
        "Trailing averages of return ratios, margins and cash-flow quality"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Profitability
    }

    fn outputs(&self) -> &[&'static str] {
        Dimension::Profitability.factors()
    }

    fn input(&self) -> InputKind {
        InputKind::Financial
    }

    fn required_columns(&self) -> &[&str] {
        &[
            "symbol",
            "date",
            "roe",
            "roa",
            "gross_margin",
            "fcff",
            "gross_profit",
            "depreciation",
            "working_capital",
            "total_assets",
        ]
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

        let panel = Panel::from_frame(&filtered, &METRICS)?;
        let rows = panel.fan_out(self.name(), |stock| self.compute_stock(stock));

        factor_frame(self.outputs(), rows)
    }
}

impl ConfigurableFactor for ProfitabilityFactors {
    type Config = ProfitabilityConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

/// Mean of the present values, or `None` with fewer than `min_obs` of them.
pub(crate) fn trailing_mean(values: &[Option<f64>], min_obs: usize) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() || present.len() < min_obs {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

/// Period-by-period ratio; undefined where either side is missing or the
/// denominator is zero.
pub(crate) fn per_period_ratio(numerator: &[Option<f64>], denominator: &[Option<f64>]) -> Vec<Option<f64>> {
    numerator
        .iter()
        .zip(denominator)
        .map(|(num, den)| match (num, den) {
            (Some(n), Some(d)) if *d != 0.0 => Some(n / d),
            _ => None,
        })
        .collect()
}

/// `(depreciation - Δworking_capital) / total_assets` per period.
///
/// The first period has no working-capital change and is undefined.
pub(crate) fn cash_flow_quality(
    depreciation: &[Option<f64>],
    working_capital: &[Option<f64>],
    total_assets: &[Option<f64>],
) -> Vec<Option<f64>> {
    let delta = std::iter::once(None).chain(
        working_capital
            .windows(2)
            .map(|pair| Some(pair[1]? - pair[0]?)),
    );

    depreciation
        .iter()
        .zip(delta)
        .zip(total_assets)
        .map(|((dep, dwc), ta)| match (dep, dwc, ta) {
            (Some(dep), Some(dwc), Some(ta)) if *ta != 0.0 => Some((dep - dwc) / ta),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quarterly_frame() -> DataFrame {
        df![
            "symbol" => ["AAA", "AAA", "AAA", "BBB", "BBB"],
            "date" => ["2023-09-30", "2023-12-31", "2024-03-31", "2023-12-31", "2024-03-31"],
            "roe" => [Some(10.0), Some(12.0), Some(14.0), Some(5.0), None],
            "roa" => [4.0, 5.0, 6.0, 2.0, 3.0],
            "gross_margin" => [30.0, 31.0, 32.0, 20.0, 22.0],
            "fcff" => [Some(10.0), Some(20.0), Some(30.0), None, Some(8.0)],
            "gross_profit" => [50.0, 60.0, 70.0, 10.0, 12.0],
            "depreciation" => [5.0, 6.0, 7.0, 1.0, 1.0],
            "working_capital" => [100.0, 110.0, 105.0, 40.0, 42.0],
            "total_assets" => [1000.0, 1000.0, 1000.0, 200.0, 200.0]
        ]
        .unwrap()
    }

    fn value(df: &DataFrame, symbol: &str, column: &str) -> Option<f64> {
        let symbols = df.column("symbol").unwrap().str().unwrap();
        let idx = (0..df.height())
            .find(|&i| symbols.get(i) == Some(symbol))
            .unwrap();
        df.column(column).unwrap().f64().unwrap().get(idx)
    }

    #[test]
    fn test_profitability_values() {
        let factor = ProfitabilityFactors::default();
        let result = factor
            .compute_raw(&quarterly_frame().lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();

        assert_eq!(result.shape(), (2, 7));
        assert_relative_eq!(value(&result, "AAA", "roe").unwrap(), 12.0);
        assert_relative_eq!(value(&result, "AAA", "fcf_to_assets").unwrap(), 0.02);
        assert_relative_eq!(value(&result, "AAA", "gross_profit_to_assets").unwrap(), 0.06);

        // (6 - 10) / 1000 and (7 + 5) / 1000
        assert_relative_eq!(value(&result, "AAA", "cash_flow_quality").unwrap(), 0.004);
    }

    #[test]
    fn test_simple_mean_needs_two_observations() {
        let factor = ProfitabilityFactors::default();
        let result = factor
            .compute_raw(&quarterly_frame().lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();

        assert!(value(&result, "BBB", "roe").is_none());
        assert_relative_eq!(value(&result, "BBB", "roa").unwrap(), 2.5);
    }

    #[test]
    fn test_ratio_factors_need_two_quarters() {
        let factor = ProfitabilityFactors::default();
        let result = factor
            .compute_raw(&quarterly_frame().lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();

        // BBB has one fcff quarter and one working-capital change.
        assert!(value(&result, "BBB", "fcf_to_assets").is_none());
        assert!(value(&result, "BBB", "cash_flow_quality").is_none());
        assert_relative_eq!(value(&result, "BBB", "gross_profit_to_assets").unwrap(), 0.055);
    }

    #[test]
    fn test_stale_reports_are_ignored() {
        let df = df![
            "symbol" => ["OLD", "OLD", "NEW", "NEW"],
            "date" => ["2016-12-31", "2017-03-31", "2023-12-31", "2024-03-31"],
            "roe" => [5.0, 7.0, 10.0, 12.0],
            "roa" => [1.0, 2.0, 3.0, 4.0],
            "gross_margin" => [20.0, 21.0, 30.0, 31.0],
            "fcff" => [1.0, 1.0, 2.0, 2.0],
            "gross_profit" => [5.0, 5.0, 6.0, 6.0],
            "depreciation" => [1.0, 1.0, 1.0, 1.0],
            "working_capital" => [10.0, 11.0, 20.0, 21.0],
            "total_assets" => [100.0, 100.0, 100.0, 100.0]
        ]
        .unwrap();

        let result = ProfitabilityFactors::default()
            .compute_raw(&df.lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();

        assert_eq!(result.height(), 1);
        assert_relative_eq!(value(&result, "NEW", "roe").unwrap(), 11.0);
    }

    #[test]
    fn test_evaluation_date_cutoff() {
        let factor = ProfitabilityFactors::default();
        let result = factor
            .compute_raw(&quarterly_frame().lazy(), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap())
            .unwrap();

        assert_relative_eq!(value(&result, "AAA", "roe").unwrap(), 11.0);
        assert!(value(&result, "BBB", "roa").is_none());
    }

    #[test]
    fn test_window_is_configurable() {
        let factor = ProfitabilityFactors::with_config(ProfitabilityConfig {
            window_quarters: 2,
            min_observations: 2,
            ..Default::default()
        });
        assert_eq!(factor.lookback(), 2);

        let result = factor
            .compute_raw(&quarterly_frame().lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .unwrap();
        assert_relative_eq!(value(&result, "AAA", "roe").unwrap(), 13.0);
    }

    #[test]
    fn test_cash_flow_quality_gaps() {
        let cfq = cash_flow_quality(
            &[Some(1.0), Some(1.0), Some(1.0)],
            &[Some(10.0), None, Some(12.0)],
            &[Some(100.0), Some(100.0), Some(100.0)],
        );
        assert_eq!(cfq, vec![None, None, None]);
        assert_eq!(trailing_mean(&cfq, 1), None);
    }

    #[test]
    fn test_missing_column() {
        let df = quarterly_frame().drop("fcff").unwrap();
        let factor = ProfitabilityFactors::default();
        let result = factor.compute_raw(&df.lazy(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());
        assert!(matches!(result, Err(crate::ScoringError::MissingColumn(_))));
    }

    #[test]
    fn test_profitability_metadata() {
        let factor = ProfitabilityFactors::default();
        assert_eq!(factor.name(), "profitability");
        assert_eq!(factor.lookback(), 20);
        assert_eq!(factor.frequency(), DataFrequency::Quarterly);
        assert_eq!(factor.outputs().len(), 6);
    }
}
