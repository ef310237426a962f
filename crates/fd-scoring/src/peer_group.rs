//! Market-cap peer groups.
//!
//! Stocks are bucketed by their latest market value inside a short lookback
//! window. All cross-sectional standardization happens within a bucket.

use crate::{Result, config::PeerGroupConfig, panel::ensure_columns};
use chrono::{Duration, NaiveDate};
use derive_more::Display;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Market-capitalization bucket.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerGroup {
    /// Market value at or above the threshold
    #[display("large_cap")]
    LargeCap,
    /// Market value below the threshold
    #[display("small_cap")]
    SmallCap,
}

impl PeerGroup {
    /// Label stored in the `peer_group` column.
    pub const fn label(self) -> &'static str {
        match self {
            Self::LargeCap => "large_cap",
            Self::SmallCap => "small_cap",
        }
    }

    /// Classify a market value.
    pub fn classify(market_value: f64, threshold: f64) -> Self {
        if market_value >= threshold {
            Self::LargeCap
        } else {
            Self::SmallCap
        }
    }
}

/// Latest market value and peer group per stock.
///
/// `daily` needs `symbol`, `date` and `market_value`. Only observations in
/// `[date - lookback_days, date]` count; stocks without one are left out.
///
/// # Returns
/// DataFrame with columns: `symbol`, `market_value`, `peer_group`
pub fn assign_peer_groups(daily: &DataFrame, date: NaiveDate, config: &PeerGroupConfig) -> Result<DataFrame> {
    ensure_columns(daily, &["symbol", "date", "market_value"])?;
    let earliest = date - Duration::days(config.lookback_days);

    let mut latest = daily
        .clone()
        .lazy()
        .with_column(col("market_value").cast(DataType::Float64))
        .filter(
            col("date")
                .lt_eq(lit(date.to_string()))
                .and(col("date").gt_eq(lit(earliest.to_string())))
                .and(col("market_value").is_not_null())
                .and(col("market_value").is_not_nan()),
        )
        .sort(
            ["symbol", "date"],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .group_by([col("symbol")])
        .agg([col("market_value").last()])
        .sort(["symbol"], SortMultipleOptions::default())
        .collect()?;

    let labels: Vec<Option<&str>> = latest
        .column("market_value")?
        .f64()?
        .into_iter()
        .map(|mv| mv.map(|v| PeerGroup::classify(v, config.large_cap_threshold).label()))
        .collect();
    latest.with_column(Column::new("peer_group".into(), labels))?;

    Ok(latest)
}
