//! Error types for scoring runs.
//!
//! Missing data and degenerate statistics are not errors: they surface as
//! absent (null) factor or dimension values. Only run-level problems and
//! malformed inputs end up here.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for scoring operations.
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Errors that can occur while computing factors or scoring a universe.
#[derive(Debug, Error)]
pub enum ScoringError {
    /// Missing required column in input data
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date of the range
        start: String,
        /// End date of the range
        end: String,
    },

    /// Evaluation date outside the supported range
    #[error("Invalid evaluation date {date}: {reason}")]
    InvalidDate {
        /// Rejected evaluation date
        date: NaiveDate,
        /// Why the date was rejected
        reason: String,
    },

    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No stock codes were supplied or none were retrieved
    #[error("No stocks to score for {0}")]
    NoStocks(NaiveDate),

    /// Every factor engine came back empty
    #[error("No factor values could be computed for {0}")]
    NoFactorData(NaiveDate),

    /// No stock could be assigned to a peer group
    #[error("No stock could be assigned to a peer group for {0}")]
    NoPeerGroups(NaiveDate),

    /// The data source collaborator failed
    #[error("Data source error: {0}")]
    DataSource(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Configuration (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while loading configuration
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Factor not found in registry
    #[error("Factor not found: {0}")]
    NotFound(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl ScoringError {
    /// Whether this error means the whole evaluation date could not be scored.
    pub const fn is_batch_failure(&self) -> bool {
        matches!(
            self,
            Self::NoStocks(_) | Self::NoFactorData(_) | Self::NoPeerGroups(_) | Self::DataSource(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failure_classification() {
        let date = NaiveDate::from_ymd_opt(2024, 4, 30).unwrap();
        assert!(ScoringError::NoStocks(date).is_batch_failure());
        assert!(ScoringError::NoPeerGroups(date).is_batch_failure());
        assert!(!ScoringError::MissingColumn("roe".into()).is_batch_failure());
    }

    #[test]
    fn test_error_messages() {
        let err = ScoringError::InvalidDateRange {
            start: "2024-06-30".into(),
            end: "2024-03-31".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid date range: start 2024-06-30 is after end 2024-03-31"
        );
    }
}
