//! Altman Z-Score factor.
//!
//! The Altman Z-Score is a bankruptcy prediction model that combines multiple
//! financial ratios to assess a company's financial health and bankruptcy risk.
//! It is evaluated on each stock's latest financial snapshot.

use crate::{
    Dimension, Result,
    config::SolvencyConfig,
    panel::ensure_columns,
    traits::{ConfigurableFactor, DataFrequency, Factor, InputKind},
};
use chrono::{Duration, NaiveDate};
use polars::prelude::*;

/// Altman Z-Score factor.
///
/// The Z-Score is calculated as:
/// ```text
/// Z = 1.2*A + 1.4*B + 3.3*C + 0.6*D + 1.0*E
/// where:
///   A = Working Capital / Total Assets
///   B = Retained Earnings / Total Assets
///   C = EBIT / Total Assets
///   D = Market Value / Total Debt,  Total Debt = 0.4 * Total Assets
///   E = Revenue / Total Assets
/// ```
///
/// A missing numerator contributes 0. The score is undefined only when total
/// assets are missing or zero.
#[derive(Debug, Clone, Default)]
pub struct AltmanZ {
    config: SolvencyConfig,
}

impl Factor for AltmanZ {
    fn name(&self) -> &str {
        "altman_z"
    }

    fn description(&self) -> &str {
        "Altman Z-Score - weighted solvency index from the latest financial snapshot"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Safety
    }

    fn outputs(&self) -> &[&'static str] {
        &["altman_z"]
    }

    fn input(&self) -> InputKind {
        InputKind::Snapshot
    }

    fn required_columns(&self) -> &[&str] {
        &[
            "symbol",
            "date",
            "working_capital",
            "retained_earnings",
            "ebit",
            "market_value",
            "revenue",
            "total_assets",
        ]
    }

    fn lookback(&self) -> usize {
        1
    }

    fn frequency(&self) -> DataFrequency {
        DataFrequency::Quarterly
    }

    fn compute_raw(&self, data: &LazyFrame, date: NaiveDate) -> Result<DataFrame> {
        let earliest = date - Duration::days(self.config.snapshot_lookback_days);
        let filtered = data
            .clone()
            .filter(
                col("date")
                    .lt_eq(lit(date.to_string()))
                    .and(col("date").gt_eq(lit(earliest.to_string()))),
            )
            .collect()?;
        ensure_columns(&filtered, self.required_columns())?;

        let total_assets = col("total_assets").cast(DataType::Float64);
        let total_debt = total_assets.clone() * lit(self.config.debt_proxy_ratio);
        let term = |weight: f64, numerator: &str, denominator: Expr| {
            (lit(weight) * col(numerator).cast(DataType::Float64) / denominator).fill_null(lit(0.0))
        };

        let z_score = term(1.2, "working_capital", total_assets.clone())
            + term(1.4, "retained_earnings", total_assets.clone())
            + term(3.3, "ebit", total_assets.clone())
            + when(total_debt.clone().gt(lit(0.0)))
                .then(term(0.6, "market_value", total_debt))
                .otherwise(lit(0.0))
            + term(1.0, "revenue", total_assets.clone());

        let result = filtered
            .lazy()
            .sort(
                ["symbol", "date"],
                SortMultipleOptions::default().with_maintain_order(true),
            )
            .group_by([col("symbol")])
            .agg([
                col("working_capital").last(),
                col("retained_earnings").last(),
                col("ebit").last(),
                col("market_value").last(),
                col("revenue").last(),
                col("total_assets").last(),
            ])
            .select([
                col("symbol"),
                when(
                    total_assets
                        .clone()
                        .is_not_null()
                        .and(total_assets.neq(lit(0.0))),
                )
                .then(z_score)
                .otherwise(lit(NULL).cast(DataType::Float64))
                .alias("altman_z"),
            ])
            .sort(["symbol"], SortMultipleOptions::default())
            .collect()?;

        Ok(result)
    }
}

impl ConfigurableFactor for AltmanZ {
    type Config = SolvencyConfig;

    fn with_config(config: Self::Config) -> Self {
        Self { config }
    }

    fn config(&self) -> &Self::Config {
        &self.config
    }
}
