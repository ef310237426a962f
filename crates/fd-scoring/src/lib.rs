#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod error;
pub mod growth;
pub mod horizons;
mod panel;
pub mod peer_group;
pub mod profitability;
pub mod registry;
pub mod safety;
pub mod scoring;
pub mod source;
pub mod standardize;
pub mod summary;
pub mod traits;

// Re-export core types
pub use config::ScoringConfig;
pub use engine::{BatchReport, ScoreReport, ScoringEngine};
pub use error::{Result, ScoringError};
pub use peer_group::PeerGroup;
pub use registry::{Dimension, FactorInfo, FactorInputs, FactorRegistry};
pub use source::{DataSource, InMemorySource};
pub use standardize::{peer_standardize, winsorize};
pub use summary::SummaryStats;
pub use traits::{ConfigurableFactor, DataFrequency, Factor, InputKind};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
