//! Canonical data shapes shared by every pipeline stage.

pub mod association;
pub mod finding;
pub mod graph;
pub mod taxonomy;
