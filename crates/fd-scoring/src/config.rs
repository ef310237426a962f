//! Run configuration.
//!
//! A [`ScoringConfig`] is loaded and validated once per run and then shared
//! read-only between evaluation dates. Every section deserializes with
//! defaults, so a config file only has to name the values it overrides.

use crate::{Result, ScoringError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trailing-window settings for the profitability factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitabilityConfig {
    /// Number of trailing quarters averaged.
    pub window_quarters: usize,
    /// Minimum non-missing observations for a factor to be defined.
    pub min_observations: usize,
    /// Oldest report date used, in calendar days before the evaluation date.
    pub lookback_days: i64,
}

impl Default for ProfitabilityConfig {
    fn default() -> Self {
        Self {
            window_quarters: 20,
            min_observations: 2,
            lookback_days: 20 * 90,
        }
    }
}

/// Settings for the debt-ratio factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeverageConfig {
    /// Number of trailing quarters averaged.
    pub window_quarters: usize,
    /// Minimum non-missing observations for the factor to be defined.
    pub min_observations: usize,
    /// Oldest report date used, in calendar days before the evaluation date.
    pub lookback_days: i64,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        Self {
            window_quarters: 4,
            min_observations: 2,
            lookback_days: 365,
        }
    }
}

/// Settings for the windowed growth engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthConfig {
    /// Number of most recent reported values averaged into the latest value.
    pub latest_window: usize,
    /// Half width of the base window; the window spans `2 * half + 1` periods.
    pub base_window_half_size: usize,
    /// Minimum non-missing periods in the base window.
    pub min_periods_in_window: usize,
    /// How many extra periods the base window centre may move back.
    pub max_center_shift: usize,
    /// Minimum valid per-horizon z-scores for a stock to be kept.
    pub min_valid_horizons: usize,
    /// Value assigned when either endpoint is non-positive.
    pub sentinel: f64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            latest_window: 3,
            base_window_half_size: 2,
            min_periods_in_window: 3,
            max_center_shift: 5,
            min_valid_horizons: 2,
            sentinel: -10.0,
        }
    }
}

/// Settings for the market-model regression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketRiskConfig {
    /// Number of trailing trading days.
    pub window: usize,
    /// Minimum paired observations.
    pub min_observations: usize,
    /// Periods per year used to annualize residual volatility.
    pub annualization: f64,
    /// Benchmark index code.
    pub benchmark_code: String,
}

impl Default for MarketRiskConfig {
    fn default() -> Self {
        Self {
            window: 252,
            min_observations: 50,
            annualization: 252.0,
            benchmark_code: "000300.SH".to_string(),
        }
    }
}

/// Settings for the Altman-style solvency index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolvencyConfig {
    /// Total debt is approximated as this share of total assets.
    pub debt_proxy_ratio: f64,
    /// How far back (days) the latest financial snapshot may lie.
    pub snapshot_lookback_days: i64,
}

impl Default for SolvencyConfig {
    fn default() -> Self {
        Self {
            debt_proxy_ratio: 0.4,
            snapshot_lookback_days: 365,
        }
    }
}

/// Market-cap peer group settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerGroupConfig {
    /// Market value at or above which a stock is `large_cap`.
    pub large_cap_threshold: f64,
    /// How far back (days) the latest market value is searched.
    pub lookback_days: i64,
    /// Minimum members for a group to be standardized.
    pub min_group_size: usize,
}

impl Default for PeerGroupConfig {
    fn default() -> Self {
        Self {
            large_cap_threshold: 100.0,
            lookback_days: 30,
            min_group_size: 5,
        }
    }
}

/// Missing-data gates for dimension and final scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Minimum profitability factors present.
    pub profitability_min_factors: usize,
    /// Minimum growth factors present.
    pub growth_min_factors: usize,
    /// Minimum safety factors present.
    pub safety_min_factors: usize,
    /// Maximum dimensions that may be missing for a final score.
    pub max_missing_dimensions: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            profitability_min_factors: 4,
            growth_min_factors: 3,
            safety_min_factors: 3,
            max_missing_dimensions: 1,
        }
    }
}

/// Raw input cleaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Winsorize financial metrics before computing factors.
    pub winsorize: bool,
    /// Lower clipping percentile.
    pub lower_pct: f64,
    /// Upper clipping percentile.
    pub upper_pct: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            winsorize: true,
            lower_pct: 0.01,
            upper_pct: 0.99,
        }
    }
}

/// Run-level settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Earliest evaluation date with reliable data.
    pub earliest_date: NaiveDate,
    /// Worker threads for per-stock fan-out. `0` uses all cores.
    pub max_concurrency: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            earliest_date: NaiveDate::from_ymd_opt(2018, 6, 30).unwrap_or_default(),
            max_concurrency: 0,
        }
    }
}

/// Complete configuration for a scoring run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Profitability aggregation.
    pub profitability: ProfitabilityConfig,
    /// Debt ratio aggregation.
    pub leverage: LeverageConfig,
    /// Growth engine.
    pub growth: GrowthConfig,
    /// Market-risk engine.
    pub market_risk: MarketRiskConfig,
    /// Solvency engine.
    pub solvency: SolvencyConfig,
    /// Peer groups.
    pub peer_group: PeerGroupConfig,
    /// Missing-data gates.
    pub gates: GateConfig,
    /// Input cleaning.
    pub preprocess: PreprocessConfig,
    /// Run settings.
    pub run: RunConfig,
}

impl ScoringConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Check that the values are internally consistent.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ScoringError::InvalidConfig(msg.to_string()));

        if self.profitability.window_quarters == 0 || self.leverage.window_quarters == 0 {
            return invalid("quarterly windows must be positive");
        }
        if self.profitability.min_observations > self.profitability.window_quarters {
            return invalid("profitability.min_observations exceeds the window");
        }
        if self.leverage.min_observations > self.leverage.window_quarters {
            return invalid("leverage.min_observations exceeds the window");
        }

        let growth = &self.growth;
        if growth.latest_window == 0 {
            return invalid("growth.latest_window must be positive");
        }
        if growth.min_periods_in_window == 0
            || growth.min_periods_in_window > 2 * growth.base_window_half_size + 1
        {
            return invalid("growth.min_periods_in_window must fit in the base window");
        }
        if !growth.sentinel.is_finite() {
            return invalid("growth.sentinel must be finite");
        }

        let risk = &self.market_risk;
        if risk.min_observations < 3 || risk.min_observations > risk.window {
            return invalid("market_risk.min_observations must be in 3..=window");
        }
        if risk.annualization <= 0.0 {
            return invalid("market_risk.annualization must be positive");
        }
        if risk.benchmark_code.is_empty() {
            return invalid("market_risk.benchmark_code is empty");
        }

        if !(self.solvency.debt_proxy_ratio > 0.0) {
            return invalid("solvency.debt_proxy_ratio must be positive");
        }
        if self.solvency.snapshot_lookback_days <= 0
            || self.peer_group.lookback_days <= 0
            || self.profitability.lookback_days <= 0
            || self.leverage.lookback_days <= 0
        {
            return invalid("lookback days must be positive");
        }
        if self.peer_group.min_group_size < 2 {
            return invalid("peer_group.min_group_size must be at least 2");
        }

        let gates = &self.gates;
        if gates.profitability_min_factors == 0
            || gates.profitability_min_factors > crate::Dimension::Profitability.factors().len()
            || gates.growth_min_factors == 0
            || gates.growth_min_factors > crate::Dimension::Growth.factors().len()
            || gates.safety_min_factors == 0
            || gates.safety_min_factors > crate::Dimension::Safety.factors().len()
        {
            return invalid("dimension gates must be between 1 and the dimension size");
        }
        if gates.max_missing_dimensions >= crate::Dimension::ALL.len() {
            return invalid("gates.max_missing_dimensions must leave one dimension");
        }

        let pre = &self.preprocess;
        if !(0.0..pre.upper_pct).contains(&pre.lower_pct) || pre.upper_pct > 1.0 {
            return invalid("preprocess percentiles must satisfy 0 <= lower < upper <= 1");
        }

        Ok(())
    }

    /// Minimum factor count for a dimension score.
    pub const fn min_factors(&self, dimension: crate::Dimension) -> usize {
        match dimension {
            crate::Dimension::Profitability => self.gates.profitability_min_factors,
            crate::Dimension::Growth => self.gates.growth_min_factors,
            crate::Dimension::Safety => self.gates.safety_min_factors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ScoringConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.profitability.window_quarters, 20);
        assert_eq!(config.market_risk.min_observations, 50);
        assert_eq!(config.solvency.debt_proxy_ratio, 0.4);
        assert_eq!(config.peer_group.min_group_size, 5);
        assert_eq!(config.growth.sentinel, -10.0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ScoringConfig::from_json_str(
            r#"{ "peer_group": { "large_cap_threshold": 250.0 }, "gates": { "growth_min_factors": 2 } }"#,
        )
        .unwrap();
        assert_eq!(config.peer_group.large_cap_threshold, 250.0);
        assert_eq!(config.peer_group.min_group_size, 5);
        assert_eq!(config.gates.growth_min_factors, 2);
        assert_eq!(config.gates.safety_min_factors, 3);
    }

    #[test]
    fn test_rejects_impossible_gate() {
        let err = ScoringConfig::from_json_str(r#"{ "gates": { "safety_min_factors": 5 } }"#)
            .unwrap_err();
        assert!(matches!(err, ScoringError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_dropping_every_dimension() {
        let mut config = ScoringConfig::default();
        config.gates.max_missing_dimensions = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_percentiles() {
        let mut config = ScoringConfig::default();
        config.preprocess.lower_pct = 0.99;
        config.preprocess.upper_pct = 0.01;
        assert!(config.validate().is_err());
    }
}
