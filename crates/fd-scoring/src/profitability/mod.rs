//! Profitability factors - level and quality of profits
//!
//! All six factors are trailing-window averages of quarterly statements.
//! Ratio factors are formed quarter by quarter before averaging.

pub mod quarterly;

pub use quarterly::ProfitabilityFactors;
