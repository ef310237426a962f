//! Safety factors - market risk, leverage and solvency
//!
//! All four exposures are oriented so that higher means safer.

pub mod altman_z;
pub mod leverage;
pub mod market_risk;

pub use altman_z::AltmanZ;
pub use leverage::DebtRatio;
pub use market_risk::MarketRisk;
