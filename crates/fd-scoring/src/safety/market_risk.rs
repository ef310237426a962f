//! Market-model risk factors.
//!
//! Each stock's daily returns are regressed on the benchmark over a trailing
//! window:
//!
//! ```text
//! β = Cov(R_i, R_m) / Var(R_m)
//! α = mean(R_i) - β × mean(R_m)
//! σ_idio = std(R_i - α - β × R_m) × sqrt(252)
//! ```
//!
//! Both risks are exposed negated (`low_beta`, `low_idio_risk`) so that a
//! higher value is safer.

use crate::{
    Dimension, Result,
    config::MarketRiskConfig,
    panel::{Panel, StockSeries, factor_frame, finite},
    traits::{ConfigurableFactor, DataFrequency, Factor, InputKind},
};
use chrono::NaiveDate;
use polars::prelude::*;

const RETURN: usize = 0;
const MARKET_RETURN: usize = 1;

/// Fitted single-index market model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketModel {
    /// Intercept.
    pub alpha: f64,
    /// Slope on the benchmark return.
    pub beta: f64,
    /// Sample standard deviation of the residuals, not annualized.
    pub residual_std: f64,
    /// Paired observations used.
    pub observations: usize,
}

impl MarketModel {
    /// Fit on paired returns, dropping pairs with a missing side.
    ///
    /// Returns `None` with fewer than `min_observations` pairs or when the
    /// benchmark does not vary.
    pub fn fit(
        returns: &[Option<f64>],
        market_returns: &[Option<f64>],
        min_observations: usize,
    ) -> Option<Self> {
        let pairs: Vec<(f64, f64)> = returns
            .iter()
            .zip(market_returns)
            .filter_map(|(r, m)| Some(((*r)?, (*m)?)))
            .collect();

        let n = pairs.len();
        if n < min_observations.max(3) {
            return None;
        }

        let nf = n as f64;
        let mean_s = pairs.iter().map(|(s, _)| s).sum::<f64>() / nf;
        let mean_m = pairs.iter().map(|(_, m)| m).sum::<f64>() / nf;
        let cov = pairs
            .iter()
            .map(|(s, m)| (s - mean_s) * (m - mean_m))
            .sum::<f64>()
            / (nf - 1.0);
        let var_m = pairs.iter().map(|(_, m)| (m - mean_m).powi(2)).sum::<f64>() / (nf - 1.0);
        if var_m <= 0.0 {
            return None;
        }

        let beta = cov / var_m;
        let alpha = mean_s - beta * mean_m;

        let residuals: Vec<f64> = pairs.iter().map(|(s, m)| s - alpha - beta * m).collect();
        let mean_r = residuals.iter().sum::<f64>() / nf;
        let var_r = residuals.iter().map(|r| (r - mean_r).powi(2)).sum::<f64>() / (nf - 1.0);

        Some(Self {
            alpha,
            beta,
            residual_std: var_r.sqrt(),
            observations: n,
        })
    }
}

/// Low-beta and low-idiosyncratic-risk factors.
///
/// # Required Columns
/// - `symbol`: Stock code
/// - `date`: Trade date
/// - `return`: Daily stock return
/// - `market_return`: Benchmark return on the same day
///
/// # Returns
/// DataFrame with columns: `symbol`, `low_beta`, `low_idio_risk`
#[derive(Debug, Clone, Default)]
pub struct MarketRisk {
    config: MarketRiskConfig,
}

impl MarketRisk {
    fn compute_stock(&self, stock: &StockSeries) -> Result<Vec<Option<f64>>> {
        let window = stock.tail(self.config.window);
        let model = MarketModel::fit(
            window.column(RETURN),
            window.column(MARKET_RETURN),
            self.config.min_observations,
        );

        let low_beta = model.map(|m| -m.beta);
        let low_idio = model.map(|m| -m.residual_std * self.config.annualization.sqrt());

        Ok(vec![
            finite("low_beta", low_beta)?,
            finite("low_idio_risk", low_idio)?,
        ])
    }
}

impl Factor for MarketRisk {
    fn name(&self) -> &str {
        "market_risk"
    }

    fn description(&self) -> &str {
        "Market-model beta and annualized residual volatility against the benchmark, negated"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Safety
    }

    fn outputs(&self) -> &[&'static str] {
        &["low_beta", "low_idio_risk"]
    }

    fn input(&self) -> InputKind {
        InputKind::Daily
    }

    fn required_columns(&self) -> &[&str] {
        &["symbol", "date", "return", "market_return"]
    }

    fn lookback(&self) -> usize {
        self.config.window
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Daily
    }

    fn compute_raw(&self, data: &LazyFrame, date: NaiveDate) -> Result<DataFrame> {
        let filtered = data
            .clone()
            .filter(col("date").lt_eq(lit(date.to_string())))
            .collect()?;

        let panel = Panel::from_frame(&filtered, &["return", "market_return"])?;
        let rows = panel.fan_out(self.name(), |stock| self.compute_stock(stock));

        factor_frame(self.outputs(), rows)
    }
}

impl ConfigurableFactor for MarketRisk {
    type Config = MarketRiskConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
