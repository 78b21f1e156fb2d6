//! Pipeline stage logic.

pub mod associator;
pub mod chunker;
pub mod normalizer;
pub mod rule_based;
pub mod steps;
