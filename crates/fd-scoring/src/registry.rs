//! Factor registry for discovery and introspection.
//!
//! The registry owns the configured calculators, maps each output factor to its
//! dimension, and runs every calculator against the prepared inputs for one
//! evaluation date.

use crate::{
    Factor, Result, ScoringConfig,
    growth::GrowthFactors,
    profitability::ProfitabilityFactors,
    safety::{AltmanZ, DebtRatio, MarketRisk},
    traits::{ConfigurableFactor, DataFrequency, InputKind},
};
use chrono::NaiveDate;
use derive_more::Display;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const ROW_INDEX: &str = "__row";

/// Scoring dimension grouping related factors.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// Level and quality of profits
    #[display("profitability")]
    Profitability,
    /// Multi-year growth of profitability metrics
    #[display("growth")]
    Growth,
    /// Market risk, leverage and solvency
    #[display("safety")]
    Safety,
}

impl Dimension {
    /// All dimensions in scoring order.
    pub const ALL: [Self; 3] = [Self::Profitability, Self::Growth, Self::Safety];

    /// Member factor columns.
    pub const fn factors(self) -> &'static [&'static str] {
        match self {
            Self::Profitability => &[
                "roe",
                "roa",
                "gross_margin",
                "fcf_to_assets",
                "gross_profit_to_assets",
                "cash_flow_quality",
            ],
            Self::Growth => &[
                "roe_growth",
                "roa_growth",
                "gross_margin_growth",
                "fcf_to_assets_growth",
                "gross_profit_to_assets_growth",
            ],
            Self::Safety => &["low_beta", "low_idio_risk", "low_debt_ratio", "altman_z"],
        }
    }

    /// Name of the dimension score column.
    pub const fn score_column(self) -> &'static str {
        match self {
            Self::Profitability => "profitability_score",
            Self::Growth => "growth_score",
            Self::Safety => "safety_score",
        }
    }

    /// Every factor column across all dimensions.
    pub fn all_factors() -> impl Iterator<Item = &'static str> {
        Self::ALL.into_iter().flat_map(|d| d.factors().iter().copied())
    }
}

/// Metadata for factor introspection.
#[derive(Debug, Clone)]
pub struct FactorInfo {
    /// Factor name (unique identifier)
    pub name: String,
    /// Calculator that produces the factor
    pub calculator: String,
    /// Human-readable description of the calculator
    pub description: String,
    /// Scoring dimension
    pub dimension: Dimension,
    /// Required input columns
    pub required_columns: Vec<String>,
    /// Lookback period
    pub lookback: usize,
    /// Data frequency
    pub frequency: DataFrequency,
}

/// Prepared input tables for one evaluation date.
#[derive(Debug, Clone, Default)]
pub struct FactorInputs {
    /// Quarterly financial statements.
    pub financial: DataFrame,
    /// Daily returns with `market_return` attached.
    pub daily: DataFrame,
    /// Financial statements with `market_value` attached.
    pub snapshot: DataFrame,
}

impl FactorInputs {
    const fn get(&self, kind: InputKind) -> &DataFrame {
        match kind {
            InputKind::Financial => &self.financial,
            InputKind::Daily => &self.daily,
            InputKind::Snapshot => &self.snapshot,
        }
    }
}

/// Registry of configured factor calculators.
#[derive(Debug, Default)]
pub struct FactorRegistry {
    factors: Vec<Arc<dyn Factor>>,
}

impl FactorRegistry {
    /// Create a new empty registry.
    pub const fn new() -> Self {
        Self {
            factors: Vec::new(),
        }
    }

    /// Register the five standard calculators covering all fifteen factors.
    pub fn with_config(config: &ScoringConfig) -> Self {
        let mut registry = Self::new();

        // Profitability
        registry.register(Arc::new(ProfitabilityFactors::with_config(
            config.profitability.clone(),
        )));

        // Growth
        registry.register(Arc::new(GrowthFactors::with_config(config.growth.clone())));

        // Safety
        registry.register(Arc::new(MarketRisk::with_config(config.market_risk.clone())));
        registry.register(Arc::new(DebtRatio::with_config(config.leverage.clone())));
        registry.register(Arc::new(AltmanZ::with_config(config.solvency.clone())));

        registry
    }

    /// Register a calculator. A calculator with the same name is replaced.
    pub fn register(&mut self, factor: Arc<dyn Factor>) {
        self.factors.retain(|f| f.name() != factor.name());
        self.factors.push(factor);
    }

    /// Get a calculator by name.
    pub fn get(&self, name: &str) -> Option<&dyn Factor> {
        self.factors
            .iter()
            .find(|f| f.name() == name)
            .map(|f| f.as_ref())
    }

    /// Get the calculator producing a factor column.
    pub fn producer_of(&self, factor: &str) -> Option<&dyn Factor> {
        self.factors
            .iter()
            .find(|f| f.outputs().contains(&factor))
            .map(|f| f.as_ref())
    }

    /// Get calculators by dimension.
    pub fn by_dimension(&self, dimension: Dimension) -> Vec<&dyn Factor> {
        self.factors
            .iter()
            .filter(|f| f.dimension() == dimension)
            .map(|f| f.as_ref())
            .collect()
    }

    /// Metadata for every produced factor.
    pub fn all_info(&self) -> Vec<FactorInfo> {
        self.factors
            .iter()
            .flat_map(|f| {
                f.outputs().iter().map(move |output| FactorInfo {
                    name: (*output).to_string(),
                    calculator: f.name().to_string(),
                    description: f.description().to_string(),
                    dimension: f.dimension(),
                    required_columns: f.required_columns().iter().map(|s| s.to_string()).collect(),
                    lookback: f.lookback(),
                    frequency: f.frequency(),
                })
            })
            .collect()
    }

    /// Columns read from `kind` across all calculators, first use first.
    pub fn input_columns(&self, kind: InputKind) -> Vec<&str> {
        let mut columns: Vec<&str> = Vec::new();
        for factor in self.factors.iter().filter(|f| f.input() == kind) {
            for &column in factor.required_columns() {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }
        columns
    }

    /// Longest lookback among calculators reading `kind`.
    pub fn max_lookback(&self, kind: InputKind) -> usize {
        self.factors
            .iter()
            .filter(|f| f.input() == kind)
            .map(|f| f.lookback())
            .max()
            .unwrap_or(0)
    }

    /// Get all calculator names.
    pub fn names(&self) -> Vec<&str> {
        self.factors.iter().map(|f| f.name()).collect()
    }

    /// Compute every calculator and left-join the outputs onto `base`.
    ///
    /// `base` must carry a `symbol` column; it fixes the row order of the
    /// result. Calculators run concurrently on the read-only inputs.
    pub fn compute_all(
        &self,
        base: &DataFrame,
        inputs: &FactorInputs,
        date: NaiveDate,
    ) -> Result<DataFrame> {
        let outputs = self
            .factors
            .par_iter()
            .map(|factor| {
                let started = std::time::Instant::now();
                let data = inputs.get(factor.input()).clone().lazy();
                let out = factor.compute_raw(&data, date)?;
                tracing::debug!(
                    calculator = factor.name(),
                    rows = out.height(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "calculator finished"
                );
                Ok(out)
            })
            .collect::<Result<Vec<_>>>()?;

        let mut merged = base.clone().lazy().with_row_index(ROW_INDEX, None);
        for out in outputs {
            merged = merged.join(
                out.lazy(),
                [col("symbol")],
                [col("symbol")],
                JoinArgs::new(JoinType::Left),
            );
        }

        Ok(merged
            .sort([ROW_INDEX], SortMultipleOptions::default())
            .drop([ROW_INDEX])
            .collect()?)
    }

    /// Number of registered calculators.
    pub fn len(&self) -> usize {
        self.factors.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimension_sizes() {
        assert_eq!(Dimension::Profitability.factors().len(), 6);
        assert_eq!(Dimension::Growth.factors().len(), 5);
        assert_eq!(Dimension::Safety.factors().len(), 4);
        assert_eq!(Dimension::all_factors().count(), 15);
    }

    #[test]
    fn test_dimension_display() {
        assert_eq!(Dimension::Growth.to_string(), "growth");
        assert_eq!(Dimension::Safety.score_column(), "safety_score");
    }

    #[test]
    fn test_registry_covers_every_factor() {
        let registry = FactorRegistry::with_config(&ScoringConfig::default());
        assert_eq!(registry.len(), 5);

        for factor in Dimension::all_factors() {
            let producer = registry
                .producer_of(factor)
                .unwrap_or_else(|| panic!("no calculator for {factor}"));
            assert!(producer.dimension().factors().contains(&factor));
        }

        assert_eq!(registry.all_info().len(), 15);
    }

    #[test]
    fn test_registry_by_dimension() {
        let registry = FactorRegistry::with_config(&ScoringConfig::default());
        let safety = registry.by_dimension(Dimension::Safety);
        assert_eq!(safety.len(), 3);
        assert!(registry.get("market_risk").is_some());
        assert!(registry.get("momentum").is_none());
    }

    #[test]
    fn test_input_columns() {
        let registry = FactorRegistry::with_config(&ScoringConfig::default());
        assert_eq!(
            registry.input_columns(InputKind::Daily),
            vec!["symbol", "date", "return", "market_return"]
        );

        let financial = registry.input_columns(InputKind::Financial);
        assert!(financial.contains(&"debt_to_assets"));
        assert_eq!(financial.iter().filter(|c| **c == "roe").count(), 1);
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = FactorRegistry::new();
        registry.register(Arc::new(DebtRatio::default()));
        registry.register(Arc::new(DebtRatio::default()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names(), vec!["debt_ratio"]);
    }
}
