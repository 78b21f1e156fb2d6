//! Aggregated per-pillar finding tallies backing the assessment graph view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::finding::SeverityType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphData {
    pub assessment_id: String,
    pub pillars: Vec<PillarGraph>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PillarGraph {
    pub pillar_id: String,
    pub label: String,
    /// Number of distinct findings associated with this pillar.
    pub finding_count: usize,
    pub severity_counts: BTreeMap<SeverityType, usize>,
}
