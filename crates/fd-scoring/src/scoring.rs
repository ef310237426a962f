//! Two-level cross-sectional scoring.
//!
//! Scoring runs through a fixed sequence of stages, each a separate type so
//! that no stage can be skipped or reordered:
//!
//! ```text
//! RawFactors -> PeerStandardized -> DimensionAggregated
//!            -> DimensionStandardized -> FinalCombined -> Ranked
//! ```
//!
//! Every stage holds one row per stock with `symbol` and `peer_group` columns
//! and preserves row order.

use crate::{
    Dimension, Result, ScoringConfig,
    panel::ensure_columns,
    standardize::{mean_std, peer_standardize},
};
use polars::prelude::*;
use std::collections::BTreeSet;

/// Column holding the peer group label.
pub const PEER_GROUP: &str = "peer_group";
/// Column holding the combined score.
pub const FINAL_SCORE: &str = "final_score";
/// Column holding the within-group rank.
pub const FINAL_RANK: &str = "final_rank";

/// Raw factor values, one row per stock.
#[derive(Debug, Clone)]
pub struct RawFactors {
    frame: DataFrame,
}

impl RawFactors {
    /// Wrap a frame with `symbol`, `peer_group` and every factor column.
    pub fn new(frame: DataFrame) -> Result<Self> {
        let required: Vec<&str> = ["symbol", PEER_GROUP]
            .into_iter()
            .chain(Dimension::all_factors())
            .collect();
        ensure_columns(&frame, &required)?;
        Ok(Self { frame })
    }

    /// The raw table.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Z-score every factor within its peer group.
    pub fn standardize(self, config: &ScoringConfig) -> Result<PeerStandardized> {
        let factors: Vec<&str> = Dimension::all_factors().collect();
        let frame = peer_standardize(
            &self.frame,
            &factors,
            PEER_GROUP,
            config.peer_group.min_group_size,
        )?;
        Ok(PeerStandardized { frame })
    }
}

/// Factor values standardized within peer groups.
#[derive(Debug, Clone)]
pub struct PeerStandardized {
    frame: DataFrame,
}

impl PeerStandardized {
    /// The standardized factor table.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Average member factors into one score per dimension.
    ///
    /// A dimension score exists only when at least the configured number of
    /// its factors are present; missing factors are left out of the mean.
    pub fn aggregate(self, config: &ScoringConfig) -> Result<DimensionAggregated> {
        let scores: Vec<Expr> = Dimension::ALL
            .into_iter()
            .map(|dimension| {
                gated_mean(dimension.factors(), config.min_factors(dimension))
                    .alias(dimension.score_column())
            })
            .collect();

        let frame = self
            .frame
            .lazy()
            .select(
                [col("symbol"), col(PEER_GROUP)]
                    .into_iter()
                    .chain(scores)
                    .collect::<Vec<_>>(),
            )
            .collect()?;
        Ok(DimensionAggregated { frame })
    }
}

/// Unstandardized dimension scores.
#[derive(Debug, Clone)]
pub struct DimensionAggregated {
    frame: DataFrame,
}

impl DimensionAggregated {
    /// The dimension table.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Z-score each dimension within its peer group.
    pub fn standardize(self, config: &ScoringConfig) -> Result<DimensionStandardized> {
        let frame = peer_standardize(
            &self.frame,
            &score_columns(),
            PEER_GROUP,
            config.peer_group.min_group_size,
        )?;
        Ok(DimensionStandardized { frame })
    }
}

/// Dimension scores standardized within peer groups.
#[derive(Debug, Clone)]
pub struct DimensionStandardized {
    frame: DataFrame,
}

impl DimensionStandardized {
    /// The standardized dimension table.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Average the available dimensions into a final score.
    ///
    /// Stocks missing more than the allowed number of dimensions get no
    /// final score and are not ranked.
    pub fn combine(self, config: &ScoringConfig) -> Result<FinalCombined> {
        let columns = score_columns();
        let min_present = columns.len() - config.gates.max_missing_dimensions;
        let frame = self
            .frame
            .lazy()
            .with_column(gated_mean(&columns, min_present).alias(FINAL_SCORE))
            .collect()?;
        Ok(FinalCombined { frame })
    }
}

/// Final scores before ranking.
#[derive(Debug, Clone)]
pub struct FinalCombined {
    frame: DataFrame,
}

impl FinalCombined {
    /// The combined table.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Rank stocks within each peer group, 1 being the best.
    ///
    /// In groups with enough scored stocks the final score is z-scored once
    /// more first. Ties keep input order.
    pub fn rank(self, config: &ScoringConfig) -> Result<Ranked> {
        let mut frame = self.frame;
        let groups = frame.column(PEER_GROUP)?.str()?.clone();
        let mut scores: Vec<Option<f64>> = frame.column(FINAL_SCORE)?.f64()?.into_iter().collect();
        let mut ranks: Vec<Option<u32>> = vec![None; scores.len()];

        let labels: BTreeSet<&str> = (&groups).into_iter().flatten().collect();
        for label in labels {
            let members: Vec<usize> = (0..scores.len())
                .filter(|&i| groups.get(i) == Some(label) && scores[i].is_some())
                .collect();

            if members.len() >= config.peer_group.min_group_size {
                if let Some((mean, std_dev)) = mean_std(members.iter().filter_map(|&i| scores[i])) {
                    if std_dev > 0.0 {
                        for &i in &members {
                            scores[i] = scores[i].map(|s| (s - mean) / std_dev);
                        }
                    }
                }
            }

            let mut order = members;
            let key = |i: usize| scores[i].unwrap_or(f64::NEG_INFINITY);
            order.sort_by(|&a, &b| key(b).total_cmp(&key(a)));
            for (position, i) in order.into_iter().enumerate() {
                ranks[i] = Some(position as u32 + 1);
            }

            tracing::debug!(peer_group = label, "ranked");
        }

        frame.with_column(Column::new(FINAL_SCORE.into(), scores))?;
        frame.with_column(Column::new(FINAL_RANK.into(), ranks))?;
        Ok(Ranked { frame })
    }
}

/// Final scores and ranks.
#[derive(Debug, Clone)]
pub struct Ranked {
    frame: DataFrame,
}

impl Ranked {
    /// The ranked table: `symbol`, `peer_group`, dimension scores,
    /// `final_score`, `final_rank`.
    pub const fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Take the ranked table.
    pub fn into_frame(self) -> DataFrame {
        self.frame
    }
}

/// Run every stage in order.
pub fn score(raw: RawFactors, config: &ScoringConfig) -> Result<(PeerStandardized, Ranked)> {
    let standardized = raw.standardize(config)?;
    let ranked = standardized
        .clone()
        .aggregate(config)?
        .standardize(config)?
        .combine(config)?
        .rank(config)?;
    Ok((standardized, ranked))
}

fn score_columns() -> Vec<&'static str> {
    Dimension::ALL.iter().map(|d| d.score_column()).collect()
}

/// Mean of the non-null columns when at least `min_present` are non-null.
fn gated_mean(columns: &[&str], min_present: usize) -> Expr {
    let present = columns
        .iter()
        .map(|c| col(*c).is_not_null().cast(DataType::Float64))
        .reduce(|a, b| a + b)
        .unwrap_or_else(|| lit(0.0));
    let total = columns
        .iter()
        .map(|c| col(*c).fill_null(lit(0.0)))
        .reduce(|a, b| a + b)
        .unwrap_or_else(|| lit(0.0));

    when(present.clone().gt_eq(lit(min_present.max(1) as f64)))
        .then(total / present)
        .otherwise(lit(NULL).cast(DataType::Float64))
}
