//! Association shapes: the wire-level AI output unit, the resolved
//! finding-to-best-practices edge, and the retry attempt record.

use serde::{Deserialize, Serialize};

use crate::models::finding::ScanFinding;
use crate::models::taxonomy::BestPracticeRef;

/// Wire-level AI association unit. `id` indexes into the finding batch;
/// `start..end` is a half-open range into the flattened best-practice
/// metadata list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiFindingAssociation {
    pub id: usize,
    pub start: usize,
    pub end: usize,
}

/// Resolved association: one entry per input finding, with zero or more
/// best-practice references (an empty list means unmatched, still valid).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub finding: ScanFinding,
    pub best_practices: Vec<BestPracticeRef>,
}

/// Kind tag for a failed association attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttemptErrorKind {
    /// The model invocation itself failed.
    Invocation,
    /// The response was not valid JSON or did not match the schema.
    InvalidResponse,
    /// The response parsed but carried out-of-range indices.
    OutOfRange,
}

/// One entry per failed attempt, accumulated by the retry loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    pub attempt: usize,
    pub kind: AttemptErrorKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_unit_deserializes_from_model_output() {
        let parsed: Vec<AiFindingAssociation> =
            serde_json::from_str(r#"[{"id":0,"start":2,"end":5},{"id":3,"start":0,"end":0}]"#)
                .unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].id, 0);
        assert_eq!(parsed[0].start, 2);
        assert_eq!(parsed[0].end, 5);
        assert_eq!(parsed[1].end, 0);
    }

    #[test]
    fn wire_unit_rejects_negative_indices() {
        let parsed: Result<Vec<AiFindingAssociation>, _> =
            serde_json::from_str(r#"[{"id":-1,"start":0,"end":1}]"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn attempt_error_kind_tags() {
        let json = serde_json::to_value(AttemptErrorKind::InvalidResponse).unwrap();
        assert_eq!(json, "invalid_response");
        let json = serde_json::to_value(AttemptErrorKind::OutOfRange).unwrap();
        assert_eq!(json, "out_of_range");
    }
}
