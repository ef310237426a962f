//! Growth factors - multi-year growth of profitability metrics
//!
//! Each metric's compound growth is measured over several horizons with
//! window-averaged endpoints, then the per-horizon rates are folded into one
//! composite score per metric.

pub mod composite;
pub mod stable_growth;

pub use composite::GrowthFactors;
pub use stable_growth::stable_growth;
