//! Security Hub (OCSF-style) scanner output parser.
//!
//! One structured record per finding with a nested resource array,
//! remediation, severity, and status fields. Records missing any of the
//! three required fields (`risk_details`, `status_code`, `status_detail`)
//! are dropped and reported, never failing the whole parse.

use serde::Deserialize;

use crate::errors::PipelineError;
use crate::models::finding::{Remediation, Resource, ScanFinding, SeverityType};
use crate::parsers::{decode_record_array, DroppedRecord, ParseOutcome};

#[derive(Debug, Deserialize)]
struct RawRecord {
    risk_details: Option<String>,
    status_code: Option<String>,
    status_detail: Option<String>,
    severity: Option<String>,
    event_code: Option<String>,
    #[serde(default)]
    resources: Vec<RawResource>,
    remediation: Option<RawRemediation>,
}

#[derive(Debug, Deserialize)]
struct RawResource {
    name: Option<String>,
    uid: Option<String>,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    region: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRemediation {
    desc: Option<String>,
    #[serde(default)]
    references: Vec<String>,
}

pub fn parse(data: &[u8]) -> Result<ParseOutcome, PipelineError> {
    let records = decode_record_array(data)?;
    let mut outcome = ParseOutcome::default();

    for (index, value) in records.into_iter().enumerate() {
        let raw: RawRecord = match serde_json::from_value(value.clone()) {
            Ok(raw) => raw,
            Err(e) => {
                outcome.dropped.push(DroppedRecord {
                    record_index: index,
                    field: "record".to_string(),
                    message: format!("record does not match expected shape: {e}"),
                    payload: value,
                });
                continue;
            }
        };

        let Some(missing) = first_missing_field(&raw) else {
            outcome.findings.push(convert(raw));
            continue;
        };
        outcome.dropped.push(DroppedRecord {
            record_index: index,
            field: missing.to_string(),
            message: format!("missing required field {missing}"),
            payload: value,
        });
    }

    Ok(outcome)
}

/// The three fields every record must carry to become a finding.
fn first_missing_field(raw: &RawRecord) -> Option<&'static str> {
    if raw.risk_details.is_none() {
        return Some("risk_details");
    }
    if raw.status_code.is_none() {
        return Some("status_code");
    }
    if raw.status_detail.is_none() {
        return Some("status_detail");
    }
    None
}

fn convert(raw: RawRecord) -> ScanFinding {
    let severity = raw
        .severity
        .as_deref()
        .map(SeverityType::from_label)
        .unwrap_or_default();

    let resources = raw
        .resources
        .into_iter()
        .map(|r| Resource {
            name: r.name,
            uid: r.uid,
            resource_type: r.resource_type,
            region: r.region,
        })
        .collect();

    let remediation = raw.remediation.map(|r| Remediation {
        desc: r.desc.unwrap_or_default(),
        references: r.references,
    });

    ScanFinding {
        id: None,
        resources,
        remediation,
        // Presence checked in first_missing_field.
        risk_details: raw.risk_details.unwrap_or_default(),
        severity,
        status_code: raw.status_code.unwrap_or_default(),
        status_detail: raw.status_detail.unwrap_or_default(),
        event_code: raw.event_code,
    }
}
