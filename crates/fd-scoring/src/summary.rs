//! Run summary statistics.

use crate::{
    Dimension, Result,
    scoring::{FINAL_RANK, FINAL_SCORE, PEER_GROUP},
    standardize::mean_std,
};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Share of stocks with a value for one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completeness {
    /// Stocks with a value.
    pub valid: usize,
    /// Stocks in the run.
    pub total: usize,
    /// `valid / total`, 0 for an empty run.
    pub ratio: f64,
}

/// Distribution of the final score over ranked stocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    /// Mean.
    pub mean: f64,
    /// Sample standard deviation, 0 with a single stock.
    pub std: f64,
    /// Minimum.
    pub min: f64,
    /// Maximum.
    pub max: f64,
    /// Median.
    pub median: f64,
}

/// Summary of one evaluation date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Evaluation date.
    pub date: NaiveDate,
    /// Stocks in the result table.
    pub total_stocks: usize,
    /// Stocks with a final rank.
    pub ranked_stocks: usize,
    /// Stocks without a final rank.
    pub excluded_stocks: usize,
    /// Stocks per peer group.
    pub peer_groups: BTreeMap<String, usize>,
    /// Per-factor completeness.
    pub completeness: BTreeMap<String, Completeness>,
    /// Final score distribution, absent when nothing was ranked.
    pub final_score: Option<ScoreDistribution>,
    /// Codes of stocks without a final rank.
    pub unranked: Vec<String>,
}

impl SummaryStats {
    /// Summarize a result table.
    pub fn from_frame(result: &DataFrame, date: NaiveDate) -> Result<Self> {
        let total = result.height();
        let symbols = result.column("symbol")?.str()?;
        let ranks = result.column(FINAL_RANK)?;

        let unranked: Vec<String> = symbols
            .into_iter()
            .zip(ranks.u32()?.into_iter())
            .filter(|(_, rank)| rank.is_none())
            .filter_map(|(symbol, _)| symbol.map(str::to_string))
            .collect();

        let mut peer_groups = BTreeMap::new();
        for label in result.column(PEER_GROUP)?.str()?.into_iter().flatten() {
            *peer_groups.entry(label.to_string()).or_insert(0) += 1;
        }

        let mut completeness = BTreeMap::new();
        for factor in Dimension::all_factors() {
            let valid = total - result.column(factor)?.null_count();
            let ratio = if total == 0 { 0.0 } else { valid as f64 / total as f64 };
            completeness.insert(factor.to_string(), Completeness { valid, total, ratio });
        }

        let scores: Vec<f64> = result
            .column(FINAL_SCORE)?
            .f64()?
            .into_iter()
            .flatten()
            .collect();

        Ok(Self {
            date,
            total_stocks: total,
            ranked_stocks: total - unranked.len(),
            excluded_stocks: unranked.len(),
            peer_groups,
            completeness,
            final_score: ScoreDistribution::from_values(scores),
            unranked,
        })
    }
}

impl ScoreDistribution {
    fn from_values(mut values: Vec<f64>) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        values.sort_by(f64::total_cmp);

        let n = values.len();
        let mean = values.iter().sum::<f64>() / n as f64;
        let std = mean_std(values.iter().copied()).map_or(0.0, |(_, s)| s);
        let median = if n % 2 == 1 {
            values[n / 2]
        } else {
            (values[n / 2 - 1] + values[n / 2]) / 2.0
        };

        Some(Self {
            mean,
            std,
            min: values[0],
            max: values[n - 1],
            median,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn result_frame() -> DataFrame {
        let mut columns: Vec<Column> = vec![
            Column::new("symbol".into(), ["AAA", "BBB", "CCC", "DDD"]),
            Column::new(PEER_GROUP.into(), ["large_cap", "large_cap", "small_cap", "small_cap"]),
            Column::new(FINAL_SCORE.into(), [Some(1.0), Some(3.0), None, Some(2.0)]),
            Column::new(FINAL_RANK.into(), [Some(2u32), Some(1), None, Some(1)]),
        ];
        for factor in Dimension::all_factors() {
            let values = if factor == "roe" {
                [Some(1.0), None, None, Some(1.0)]
            } else {
                [Some(1.0); 4]
            };
            columns.push(Column::new(factor.into(), values));
        }
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn test_summary_counts() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let summary = SummaryStats::from_frame(&result_frame(), date).unwrap();

        assert_eq!(summary.total_stocks, 4);
        assert_eq!(summary.ranked_stocks, 3);
        assert_eq!(summary.unranked, vec!["CCC".to_string()]);
        assert_eq!(summary.peer_groups["small_cap"], 2);
        assert_eq!(summary.completeness["roe"].valid, 2);
        assert_relative_eq!(summary.completeness["roe"].ratio, 0.5);
        assert_relative_eq!(summary.completeness["altman_z"].ratio, 1.0);
    }

    #[test]
    fn test_score_distribution() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let summary = SummaryStats::from_frame(&result_frame(), date).unwrap();
        let dist = summary.final_score.unwrap();

        assert_relative_eq!(dist.mean, 2.0);
        assert_relative_eq!(dist.std, 1.0);
        assert_relative_eq!(dist.median, 2.0);
        assert_relative_eq!(dist.min, 1.0);
        assert_relative_eq!(dist.max, 3.0);
    }

    #[test]
    fn test_empty_distribution() {
        assert!(ScoreDistribution::from_values(Vec::new()).is_none());
        let single = ScoreDistribution::from_values(vec![4.0]).unwrap();
        assert_eq!(single.std, 0.0);
        assert_eq!(single.median, 4.0);
    }
}
