//! Core trait definitions for factor calculators.
//!
//! Every factor engine implements [`Factor`]. A calculator may produce several
//! factor columns at once (the market-model regression yields both beta and
//! idiosyncratic risk), so outputs are listed separately from the name.

use crate::{Dimension, Result};
use chrono::NaiveDate;
use derive_more::Display;
use polars::prelude::*;

/// Data frequency for factor computation.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataFrequency {
    /// Daily frequency - price-based factors
    Daily,
    /// Quarterly frequency - fundamental-based factors
    Quarterly,
}

/// Which prepared input table a calculator reads.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    /// Quarterly financial statements, one row per stock and report date.
    Financial,
    /// Daily stock returns with the benchmark return attached.
    Daily,
    /// Financial statements with the latest market value attached.
    Snapshot,
}

/// A calculator that turns raw time series into raw factor values.
pub trait Factor: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this calculator.
    fn name(&self) -> &str;

    /// Human-readable description of what this calculator measures.
    fn description(&self) -> &str;

    /// Dimension the produced factors belong to.
    fn dimension(&self) -> Dimension;

    /// Factor columns produced by [`Factor::compute_raw`].
    fn outputs(&self) -> &[&'static str];

    /// Input table this calculator reads.
    fn input(&self) -> InputKind;

    /// Columns required in the input DataFrame.
    fn required_columns(&self) -> &[&str];

    /// Number of lookback periods needed for computation.
    ///
    /// For daily factors, this is trading days. For quarterly factors,
    /// this is the number of quarters.
    fn lookback(&self) -> usize;

    /// Data frequency required for this calculator.
    fn frequency(&self) -> DataFrequency;

    /// Compute raw factor values as of `date`.
    ///
    /// Returns a DataFrame with a `symbol` column and one `Float64` column per
    /// entry of [`Factor::outputs`]. Undefined values are null.
    fn compute_raw(&self, data: &LazyFrame, date: NaiveDate) -> Result<DataFrame>;
}

/// A factor that supports runtime configuration.
pub trait ConfigurableFactor: Factor {
    /// Configuration type for this factor.
    type Config: Default + Clone + Send + Sync + std::fmt::Debug;

    /// Create a new factor with the given configuration.
    fn with_config(config: Self::Config) -> Self;

    /// Returns the current configuration.
    fn config(&self) -> &Self::Config;
}
