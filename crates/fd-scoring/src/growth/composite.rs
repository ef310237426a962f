//! Composite growth factors.
//!
//! For every base metric and active horizon the stable growth rate is
//! computed per stock. Each horizon is z-scored across the universe; stocks
//! with too few valid horizons are dropped, the remaining gaps count as 0, and
//! the horizon average is z-scored once more.

use crate::{
    Dimension, Result,
    config::GrowthConfig,
    growth::stable_growth,
    horizons::{growth_horizons, max_growth_horizon},
    panel::{Panel, StockSeries, factor_frame, finite},
    profitability::quarterly::per_period_ratio,
    standardize::zscore,
    traits::{ConfigurableFactor, DataFrequency, Factor, InputKind},
};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;

const METRICS: [&str; 6] = ["roe", "roa", "gross_margin", "fcff", "gross_profit", "total_assets"];
const TOTAL_ASSETS: usize = 5;

/// Composite growth of the five profitability metrics.
///
/// # Required Columns
/// - `symbol`, `date`: stock code and report date
/// - `roe`, `roa`, `gross_margin`: reported ratios
/// - `fcff`, `gross_profit`, `total_assets`: combined into per-period ratios
///
/// # Returns
/// DataFrame with `symbol` and the five `*_growth` columns.
#[derive(Debug, Clone, Default)]
pub struct GrowthFactors {
    config: GrowthConfig,
}

impl GrowthFactors {
    /// Per-period series for each growth metric, in output order.
    fn metric_series(stock: &StockSeries) -> [Vec<Option<f64>>; 5] {
        let assets = stock.column(TOTAL_ASSETS);
        [
            stock.column(0).to_vec(),
            stock.column(1).to_vec(),
            stock.column(2).to_vec(),
            per_period_ratio(stock.column(3), assets),
            per_period_ratio(stock.column(4), assets),
        ]
    }

    /// Growth rates indexed by `[metric][horizon]`.
    fn compute_stock(&self, stock: &StockSeries, horizons: &[u32]) -> Result<Vec<Vec<Option<f64>>>> {
        Self::metric_series(stock)
            .iter()
            .zip(self.outputs())
            .map(|(series, name)| {
                horizons
                    .iter()
                    .map(|years| finite(name, stable_growth(series, *years, &self.config)))
                    .collect()
            })
            .collect()
    }
}

impl Factor for GrowthFactors {
    fn name(&self) -> &str {
        "growth"
    }

    fn description(&self) -> &str {
        "Multi-horizon window-averaged compound growth of profitability metrics"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Growth
    }

    fn outputs(&self) -> &[&'static str] {
        Dimension::Growth.factors()
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
            "total_assets",
        ]
    }

    fn lookback(&self) -> usize {
        // Longest horizon plus the furthest the base window can reach.
        4 * max_growth_horizon(i32::MAX) as usize
            + 1
            + self.config.max_center_shift
            + self.config.base_window_half_size
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn compute_raw(&self, data: &LazyFrame, date: NaiveDate) -> Result<DataFrame> {
        let horizons = growth_horizons(date.year());
        let filtered = data
            .clone()
            .filter(col("date").lt_eq(lit(date.to_string())))
            .collect()?;

        let panel = Panel::from_frame(&filtered, &METRICS)?;
        let rates = panel.fan_out(self.name(), |stock| self.compute_stock(stock, &horizons));

        let composites: Vec<Vec<Option<f64>>> = (0..self.outputs().len())
            .map(|metric| {
                let per_horizon: Vec<Vec<Option<f64>>> = (0..horizons.len())
                    .map(|h| rates.iter().map(|(_, r)| r[metric][h]).collect())
                    .collect();
                composite_scores(&per_horizon, self.config.min_valid_horizons)
            })
            .collect();

        tracing::debug!(
            stocks = rates.len(),
            horizons = ?horizons,
            "growth rates computed"
        );

        let rows = rates
            .into_iter()
            .enumerate()
            .map(|(idx, (symbol, _))| (symbol, composites.iter().map(|c| c[idx]).collect()))
            .collect();

        factor_frame(self.outputs(), rows)
    }
}

impl ConfigurableFactor for GrowthFactors {
    type Config = GrowthConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}

/// Fold per-horizon growth rates into one composite per stock.
///
/// `per_horizon[h][i]` is stock `i`'s rate at horizon `h`.
pub fn composite_scores(per_horizon: &[Vec<Option<f64>>], min_valid_horizons: usize) -> Vec<Option<f64>> {
    let stocks = per_horizon.first().map_or(0, Vec::len);
    let z_scores: Vec<Vec<Option<f64>>> = per_horizon.iter().map(|rates| zscore(rates)).collect();

    let averages: Vec<Option<f64>> = (0..stocks)
        .map(|i| {
            let valid = z_scores.iter().filter(|z| z[i].is_some()).count();
            if valid == 0 || valid < min_valid_horizons {
                return None;
            }
            let total: f64 = z_scores.iter().map(|z| z[i].unwrap_or(0.0)).sum();
            Some(total / z_scores.len() as f64)
        })
        .collect();

    zscore(&averages)
}
