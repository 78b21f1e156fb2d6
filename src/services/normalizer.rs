//! Finding normalization: scope filter, self-signature exclusion, id
//! assignment, resource pruning, and duplicate merge, in that exact
//! order. The order is load-bearing: ids are assigned before pruning and
//! merging so that `"<tool>#<n>"` sequences stay stable across
//! reprocessing, even when the merge leaves gaps.

use std::collections::HashMap;

use serde::Serialize;

use crate::models::finding::ScanFinding;
use crate::parsers::{ParseOutcome, ScanningTool};

/// Token identifying this tool's own infrastructure. Findings that
/// reference it are excluded so the pipeline never reports itself.
pub const SELF_SIGNATURE: &str = "complimap";

/// Counts reported after a normalization run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NormalizeSummary {
    pub parsed: usize,
    pub dropped: usize,
    pub out_of_scope: usize,
    pub self_excluded: usize,
    pub merged: usize,
    pub total: usize,
}

/// Turn a parse outcome into the final ordered findings for one
/// (assessment, scanner) pair. Ids are unique within that pair.
pub fn normalize(
    outcome: ParseOutcome,
    workflows: &[String],
    tool: ScanningTool,
) -> (Vec<ScanFinding>, NormalizeSummary) {
    let mut summary = NormalizeSummary {
        parsed: outcome.findings.len(),
        dropped: outcome.dropped.len(),
        ..Default::default()
    };

    for record in &outcome.dropped {
        tracing::warn!(
            tool = %tool,
            record_index = record.record_index,
            field = %record.field,
            payload = %record.payload,
            "dropped scanner record: {}",
            record.message
        );
    }

    // 1. Scope filter: empty workflow list keeps everything.
    let mut findings: Vec<ScanFinding> = outcome
        .findings
        .into_iter()
        .filter(|f| matches_scope(f, workflows))
        .collect();
    summary.out_of_scope = summary.parsed - findings.len();

    // 2. Self-signature exclusion.
    let before = findings.len();
    findings.retain(|f| !references_token(f, SELF_SIGNATURE));
    summary.self_excluded = before - findings.len();

    // 3. Id assignment, in current order, sequence starting at 1.
    for (i, finding) in findings.iter_mut().enumerate() {
        finding.id = Some(format!("{tool}#{}", i + 1));
    }

    // 4. Resource pruning: narrow resource lists to workflow-matching
    // entries. A finding may end up with zero resources; it stays.
    if !workflows.is_empty() {
        for finding in &mut findings {
            finding
                .resources
                .retain(|r| field_matches_any(r.name.as_deref(), workflows)
                    || field_matches_any(r.uid.as_deref(), workflows));
        }
    }

    // 5. Duplicate merge.
    let before = findings.len();
    let findings = merge_duplicates(findings);
    summary.merged = before - findings.len();
    summary.total = findings.len();

    tracing::info!(
        tool = %tool,
        parsed = summary.parsed,
        dropped = summary.dropped,
        out_of_scope = summary.out_of_scope,
        self_excluded = summary.self_excluded,
        merged = summary.merged,
        total = summary.total,
        "normalized scanner output"
    );

    (findings, summary)
}

/// Merge findings sharing the composite key `(status_detail, risk_details)`.
/// Duplicates append their resources onto the first member, in original
/// order, and are dropped. Survivor ids are authoritative; merged-away
/// ids are discarded and the sequence is never renumbered.
pub fn merge_duplicates(findings: Vec<ScanFinding>) -> Vec<ScanFinding> {
    let mut merged: Vec<ScanFinding> = Vec::with_capacity(findings.len());
    let mut index_by_key: HashMap<(String, String), usize> = HashMap::new();

    for finding in findings {
        let key = (finding.status_detail.clone(), finding.risk_details.clone());
        match index_by_key.get(&key) {
            Some(&i) => {
                tracing::debug!(
                    survivor = merged[i].id.as_deref().unwrap_or(""),
                    duplicate = finding.id.as_deref().unwrap_or(""),
                    "merged duplicate finding"
                );
                merged[i].resources.extend(finding.resources);
            }
            None => {
                index_by_key.insert(key, merged.len());
                merged.push(finding);
            }
        }
    }

    merged
}

/// OR semantics across workflows and across fields: any resource
/// name/uid, or the risk/status text, containing any workflow string
/// (case-insensitive substring) keeps the finding. An empty workflow
/// list keeps everything.
fn matches_scope(finding: &ScanFinding, workflows: &[String]) -> bool {
    if workflows.is_empty() {
        return true;
    }
    finding.resources.iter().any(|r| {
        field_matches_any(r.name.as_deref(), workflows)
            || field_matches_any(r.uid.as_deref(), workflows)
    }) || field_matches_any(Some(&finding.risk_details), workflows)
        || field_matches_any(Some(&finding.status_detail), workflows)
}

fn references_token(finding: &ScanFinding, token: &str) -> bool {
    let needle = [token.to_string()];
    finding.resources.iter().any(|r| {
        field_matches_any(r.name.as_deref(), &needle)
            || field_matches_any(r.uid.as_deref(), &needle)
    }) || field_matches_any(Some(&finding.risk_details), &needle)
        || field_matches_any(Some(&finding.status_detail), &needle)
}

fn field_matches_any(field: Option<&str>, needles: &[String]) -> bool {
    let Some(value) = field else {
        return false;
    };
    let value = value.to_lowercase();
    needles
        .iter()
        .any(|needle| value.contains(&needle.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding::{Resource, SeverityType};

    fn finding(status_detail: &str, risk_details: &str, resources: Vec<Resource>) -> ScanFinding {
        ScanFinding {
            id: None,
            resources,
            remediation: None,
            risk_details: risk_details.to_string(),
            severity: SeverityType::Medium,
            status_code: "FAIL".to_string(),
            status_detail: status_detail.to_string(),
            event_code: None,
        }
    }

    fn resource(name: &str, uid: &str) -> Resource {
        Resource {
            name: Some(name.to_string()),
            uid: Some(uid.to_string()),
            resource_type: None,
            region: None,
        }
    }

    fn outcome(findings: Vec<ScanFinding>) -> ParseOutcome {
        ParseOutcome {
            findings,
            dropped: vec![],
        }
    }

    #[test]
    fn empty_workflows_keep_everything_and_assign_ids() {
        let f = finding("detail", "risk", vec![resource("db", "arn:db")]);
        let (normalized, summary) =
            normalize(outcome(vec![f.clone()]), &[], ScanningTool::Prowler);
        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized[0].id.as_deref(), Some("prowler#1"));
        // Identical apart from the assigned id.
        let mut expected = f;
        expected.id = Some("prowler#1".to_string());
        assert_eq!(normalized[0], expected);
        assert_eq!(summary.out_of_scope, 0);
        assert_eq!(summary.total, 1);
    }

    #[test]
    fn scope_filter_is_case_insensitive_substring_over_all_fields() {
        let workflows = vec!["Payments".to_string()];
        let by_name = finding("d1", "r1", vec![resource("payments-api", "arn:x")]);
        let by_uid = finding("d2", "r2", vec![resource("api", "arn:PAYMENTS-db")]);
        let by_risk = finding("d3", "exposes the payments ledger", vec![]);
        let by_detail = finding("Payments queue unencrypted", "r4", vec![]);
        let unrelated = finding("d5", "r5", vec![resource("billing", "arn:billing")]);

        let (normalized, summary) = normalize(
            outcome(vec![by_name, by_uid, by_risk, by_detail, unrelated]),
            &workflows,
            ScanningTool::SecurityHub,
        );
        assert_eq!(normalized.len(), 4);
        assert_eq!(summary.out_of_scope, 1);
    }

    #[test]
    fn self_signature_exclusion_is_case_insensitive() {
        let own = finding("d", "r", vec![resource("CompliMap-worker", "arn:x")]);
        let in_text = finding("created by COMPLIMAP run", "r", vec![]);
        let normal = finding("d2", "r2", vec![resource("app", "arn:app")]);

        let (normalized, summary) = normalize(
            outcome(vec![own, in_text, normal]),
            &[],
            ScanningTool::Prowler,
        );
        assert_eq!(normalized.len(), 1);
        assert_eq!(summary.self_excluded, 2);
        assert_eq!(normalized[0].id.as_deref(), Some("prowler#1"));
    }

    #[test]
    fn resource_pruning_narrows_but_never_removes_findings() {
        let workflows = vec!["payments".to_string()];
        // Matches scope through risk text; neither resource matches.
        let f = finding(
            "d",
            "payments data exposed",
            vec![resource("billing-db", "arn:billing"), resource("misc", "arn:misc")],
        );
        let (normalized, _) = normalize(outcome(vec![f]), &workflows, ScanningTool::Prowler);
        assert_eq!(normalized.len(), 1);
        assert!(normalized[0].resources.is_empty());
    }

    #[test]
    fn resource_pruning_is_a_noop_without_workflows() {
        let f = finding("d", "r", vec![resource("a", "1"), resource("b", "2")]);
        let (normalized, _) = normalize(outcome(vec![f]), &[], ScanningTool::Prowler);
        assert_eq!(normalized[0].resources.len(), 2);
    }

    #[test]
    fn duplicates_collapse_and_concatenate_resources_in_order() {
        let first = finding("same detail", "same risk", vec![resource("a", "1")]);
        let second = finding("same detail", "same risk", vec![resource("b", "2")]);
        let (normalized, summary) = normalize(
            outcome(vec![first, second]),
            &[],
            ScanningTool::SecurityHub,
        );
        assert_eq!(normalized.len(), 1);
        assert_eq!(summary.merged, 1);
        assert_eq!(normalized[0].id.as_deref(), Some("securityhub#1"));
        let names: Vec<_> = normalized[0]
            .resources
            .iter()
            .map(|r| r.name.as_deref().unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn merge_keeps_id_gaps_without_renumbering() {
        let a = finding("dup", "dup", vec![]);
        let b = finding("dup", "dup", vec![]);
        let c = finding("other", "other", vec![]);
        let (normalized, _) = normalize(outcome(vec![a, b, c]), &[], ScanningTool::Prowler);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].id.as_deref(), Some("prowler#1"));
        // prowler#2 was merged away; the survivor keeps #3.
        assert_eq!(normalized[1].id.as_deref(), Some("prowler#3"));
    }

    #[test]
    fn merge_requires_both_key_fields_to_match() {
        let a = finding("same detail", "risk one", vec![]);
        let b = finding("same detail", "risk two", vec![]);
        assert_eq!(merge_duplicates(vec![a, b]).len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let first = finding("dup", "dup", vec![resource("a", "1")]);
        let second = finding("dup", "dup", vec![resource("b", "2")]);
        let third = finding("solo", "solo", vec![]);
        let once = merge_duplicates(vec![first, second, third]);
        let twice = merge_duplicates(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn summary_counts_dropped_records() {
        use crate::parsers::DroppedRecord;
        let out = ParseOutcome {
            findings: vec![finding("d", "r", vec![])],
            dropped: vec![DroppedRecord {
                record_index: 0,
                field: "status_detail".to_string(),
                message: "missing required field status_detail".to_string(),
                payload: serde_json::json!({"risk_details": "r"}),
            }],
        };
        let (_, summary) = normalize(out, &[], ScanningTool::SecurityHub);
        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.parsed, 1);
    }
}
