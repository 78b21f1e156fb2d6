//! Scanner output parsers normalizing raw scan artifacts into
//! pre-canonical findings (no ids yet; the normalizer assigns those).
//!
//! The supported formats are a closed set dispatched on `ScanningTool`.
//! Per-record problems never fail a parse: they are collected as
//! `DroppedRecord`s for the caller to report. A malformed top-level
//! payload (not a JSON array) is fatal and propagates.

pub mod prowler;
pub mod securityhub;

use serde::{Deserialize, Serialize};

use crate::errors::PipelineError;
use crate::models::finding::ScanFinding;

/// Supported scanner formats.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanningTool {
    #[serde(rename = "securityhub")]
    SecurityHub,
    Prowler,
    /// Reserved: format not wired up yet; parses to an empty list.
    #[serde(rename = "servicescreener")]
    ServiceScreener,
}

impl std::fmt::Display for ScanningTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SecurityHub => write!(f, "securityhub"),
            Self::Prowler => write!(f, "prowler"),
            Self::ServiceScreener => write!(f, "servicescreener"),
        }
    }
}

impl std::str::FromStr for ScanningTool {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "securityhub" => Ok(Self::SecurityHub),
            "prowler" => Ok(Self::Prowler),
            "servicescreener" => Ok(Self::ServiceScreener),
            other => Err(PipelineError::Validation(format!(
                "unknown scanning tool: {other}"
            ))),
        }
    }
}

/// Result of parsing one raw scan artifact.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub findings: Vec<ScanFinding>,
    pub dropped: Vec<DroppedRecord>,
}

/// A record dropped during parsing, kept with its payload for diagnosis.
#[derive(Debug, Clone, Serialize)]
pub struct DroppedRecord {
    pub record_index: usize,
    pub field: String,
    pub message: String,
    pub payload: serde_json::Value,
}

impl ScanningTool {
    /// Parse raw scanner output into pre-canonical findings.
    ///
    /// `regions` is an allow-list applied at parse time where the format
    /// supports it (Prowler); other formats ignore it.
    pub fn parse(&self, data: &[u8], regions: &[String]) -> Result<ParseOutcome, PipelineError> {
        match self {
            Self::SecurityHub => securityhub::parse(data),
            Self::Prowler => prowler::parse(data, regions),
            Self::ServiceScreener => Ok(ParseOutcome::default()),
        }
    }
}

/// Decode the top-level payload as a JSON array of raw records.
/// Anything else is a fatal parse failure, distinct from per-record drops.
pub(crate) fn decode_record_array(data: &[u8]) -> Result<Vec<serde_json::Value>, PipelineError> {
    let value: serde_json::Value = serde_json::from_slice(data)
        .map_err(|e| PipelineError::MalformedInput(format!("payload is not valid JSON: {e}")))?;
    match value {
        serde_json::Value::Array(records) => Ok(records),
        other => Err(PipelineError::MalformedInput(format!(
            "expected a top-level JSON array, got {}",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn scanning_tool_display() {
        assert_eq!(ScanningTool::SecurityHub.to_string(), "securityhub");
        assert_eq!(ScanningTool::Prowler.to_string(), "prowler");
        assert_eq!(ScanningTool::ServiceScreener.to_string(), "servicescreener");
    }

    #[test]
    fn scanning_tool_round_trips_through_from_str() {
        for tool in [
            ScanningTool::SecurityHub,
            ScanningTool::Prowler,
            ScanningTool::ServiceScreener,
        ] {
            assert_eq!(ScanningTool::from_str(&tool.to_string()).unwrap(), tool);
        }
        assert!(ScanningTool::from_str("nessus").is_err());
    }

    #[test]
    fn scanning_tool_deserialization() {
        let tool: ScanningTool = serde_json::from_str("\"prowler\"").unwrap();
        assert_eq!(tool, ScanningTool::Prowler);
        let tool: ScanningTool = serde_json::from_str("\"securityhub\"").unwrap();
        assert_eq!(tool, ScanningTool::SecurityHub);
    }

    #[test]
    fn service_screener_parses_to_empty_without_failing() {
        let outcome = ScanningTool::ServiceScreener
            .parse(b"this is not even JSON", &[])
            .unwrap();
        assert!(outcome.findings.is_empty());
        assert!(outcome.dropped.is_empty());
    }

    #[test]
    fn non_array_top_level_is_fatal() {
        let err = decode_record_array(b"{\"findings\": []}").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
        assert!(err.to_string().contains("object"));

        let err = decode_record_array(b"not json").unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput(_)));
    }
}
