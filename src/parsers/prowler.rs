//! Prowler scanner output parser (flat JSON, one check result per record).
//!
//! Only `FAIL` records become findings; PASS/WARN/UNKNOWN results are
//! non-findings and are discarded silently. A region allow-list, when
//! provided, is applied here at parse time. The resource list is
//! synthesized as a single `{region, uid?}` entry, omitting `uid` when
//! the raw value is the `"N/A"` sentinel.

use serde::Deserialize;

use crate::errors::PipelineError;
use crate::models::finding::{Remediation, Resource, ScanFinding, SeverityType};
use crate::parsers::{decode_record_array, DroppedRecord, ParseOutcome};

const NOT_APPLICABLE: &str = "N/A";

#[derive(Debug, Deserialize)]
struct RawCheck {
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "StatusExtended", default)]
    status_extended: String,
    #[serde(rename = "Risk", default)]
    risk: String,
    #[serde(rename = "Severity")]
    severity: Option<String>,
    #[serde(rename = "Region")]
    region: Option<String>,
    #[serde(rename = "ResourceId")]
    resource_id: Option<String>,
    #[serde(rename = "CheckID")]
    check_id: Option<String>,
    #[serde(rename = "Remediation")]
    remediation: Option<RawRemediation>,
}

#[derive(Debug, Deserialize)]
struct RawRemediation {
    #[serde(rename = "Recommendation")]
    recommendation: Option<RawRecommendation>,
}

#[derive(Debug, Deserialize)]
struct RawRecommendation {
    #[serde(rename = "Text")]
    text: Option<String>,
    #[serde(rename = "Url")]
    url: Option<String>,
}

pub fn parse(data: &[u8], regions: &[String]) -> Result<ParseOutcome, PipelineError> {
    let records = decode_record_array(data)?;
    let mut outcome = ParseOutcome::default();

    for (index, value) in records.into_iter().enumerate() {
        let raw: RawCheck = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                outcome.dropped.push(DroppedRecord {
                    record_index: index,
                    field: "record".to_string(),
                    message: format!("check does not match expected shape: {e}"),
                    payload: value,
                });
                continue;
            }
        };

        // PASS/WARN/UNKNOWN are non-findings, not drops.
        if raw.status != "FAIL" {
            continue;
        }

        if !regions.is_empty() {
            let in_scope = raw
                .region
                .as_deref()
                .is_some_and(|r| regions.iter().any(|allowed| allowed == r));
            if !in_scope {
                continue;
            }
        }

        outcome.findings.push(convert(raw));
    }

    Ok(outcome)
}

fn convert(raw: RawCheck) -> ScanFinding {
    let uid = raw
        .resource_id
        .filter(|id| id.as_str() != NOT_APPLICABLE && !id.is_empty());

    let resources = vec![Resource {
        name: None,
        uid,
        resource_type: None,
        region: raw.region,
    }];

    let remediation = raw
        .remediation
        .and_then(|r| r.recommendation)
        .map(|rec| Remediation {
            desc: rec.text.unwrap_or_default(),
            references: rec.url.into_iter().collect(),
        });

    let severity = raw
        .severity
        .as_deref()
        .map(SeverityType::from_label)
        .unwrap_or_default();

    ScanFinding {
        id: None,
        resources,
        remediation,
        risk_details: raw.risk,
        severity,
        status_code: raw.status,
        status_detail: raw.status_extended,
        event_code: raw.check_id,
    }
}
