//! Canonical finding model shared across parsers, normalization, and
//! association.
//!
//! `ScanFinding` is the in-pipeline shape: its `id` is absent until the
//! normalizer assigns `"<scanningTool>#<n>"`, after which it is immutable.
//! `Finding` is the persisted shape carrying association and triage state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::taxonomy::BestPracticeRef;

/// Normalized severity across all scanner formats (OCSF severity scale).
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
)]
pub enum SeverityType {
    #[default]
    Unknown,
    Informational,
    Low,
    Medium,
    High,
    Critical,
    Fatal,
    Other,
}

impl SeverityType {
    /// Map a scanner-supplied severity label, defaulting to `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "informational" | "info" => Self::Informational,
            "low" => Self::Low,
            "medium" => Self::Medium,
            "high" => Self::High,
            "critical" => Self::Critical,
            "fatal" => Self::Fatal,
            "other" => Self::Other,
            _ => Self::Unknown,
        }
    }
}

/// A cloud resource referenced by a finding. All fields are optional;
/// a finding may carry zero resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Resource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// Remediation guidance attached to a finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Remediation {
    pub desc: String,
    #[serde(default)]
    pub references: Vec<String>,
}

/// A single normalized non-compliance observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanFinding {
    /// Absent until assigned by the normalizer; `"<scanningTool>#<n>"` after.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<Remediation>,
    pub risk_details: String,
    #[serde(default)]
    pub severity: SeverityType,
    pub status_code: String,
    pub status_detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_code: Option<String>,
}

/// A user comment on a persisted finding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted finding: the canonical scan finding plus association and
/// triage state. The embedded scan finding is never updated in place;
/// re-running a scan creates a new assessment run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(flatten)]
    pub scan: ScanFinding,
    pub hidden: bool,
    #[serde(rename = "isAIAssociated")]
    pub is_ai_associated: bool,
    #[serde(default)]
    pub best_practices: Vec<BestPracticeRef>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Finding {
    /// Wrap a freshly normalized scan finding in its persisted form.
    pub fn from_scan(scan: ScanFinding) -> Self {
        Self {
            scan,
            hidden: false,
            is_ai_associated: false,
            best_practices: Vec::new(),
            comments: Vec::new(),
        }
    }
}
