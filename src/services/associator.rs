//! AI-assisted best-practice association.
//!
//! Per finding batch: flatten the taxonomy into ordered best-practice
//! metadata, build a prompt embedding both, call the model, validate the
//! structured response, and resolve it into one `Association` per input
//! finding. Invocation failures and invalid responses share one bounded
//! retry budget; every attempt is logged with the prompt and raw
//! response text so the scoring harness can audit runs afterwards.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use crate::errors::PipelineError;
use crate::llm::ModelClient;
use crate::models::association::{
    AiFindingAssociation, Association, AttemptErrorKind, AttemptRecord,
};
use crate::models::finding::ScanFinding;
use crate::models::taxonomy::{BestPracticeMetadata, Taxonomy};
use crate::parsers::ScanningTool;

/// Tuning knobs for association requests.
#[derive(Debug, Clone)]
pub struct AssociatorConfig {
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl Default for AssociatorConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_ms: 1000,
        }
    }
}

/// Associates a batch of findings with taxonomy best practices via the
/// external text-completion contract.
pub struct BestPracticeAssociator<'a, C: ModelClient> {
    client: &'a C,
    config: AssociatorConfig,
}

impl<'a, C: ModelClient> BestPracticeAssociator<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self::with_config(client, AssociatorConfig::default())
    }

    pub fn with_config(client: &'a C, config: AssociatorConfig) -> Self {
        Self { client, config }
    }

    /// Associate one finding batch. Returns one entry per input finding,
    /// in input order; unmatched findings get an empty best-practice
    /// list. Exhausting the retry budget is fatal for the batch.
    pub async fn associate(
        &self,
        tool: ScanningTool,
        findings: &[ScanFinding],
        taxonomy: &Taxonomy,
    ) -> Result<Vec<Association>, PipelineError> {
        let metadata = taxonomy.flatten();
        let prompt = build_prompt(tool, findings, &metadata);

        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let max_attempts = self.config.max_retries + 1;

        for attempt in 1..=max_attempts {
            match self.client.converse(&prompt).await {
                Ok(raw) => {
                    tracing::info!(
                        tool = %tool,
                        attempt,
                        prompt_len = prompt.len(),
                        prompt = %prompt,
                        response = %raw,
                        "association attempt"
                    );
                    match validate_response(&raw, findings.len(), metadata.len()) {
                        Ok(entries) => return Ok(resolve(findings, &metadata, &entries)),
                        Err((kind, message)) => {
                            tracing::error!(
                                tool = %tool,
                                attempt,
                                error_kind = ?kind,
                                error = %message,
                                "invalid association response"
                            );
                            attempts.push(AttemptRecord {
                                attempt,
                                kind,
                                message,
                            });
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(
                        tool = %tool,
                        attempt,
                        prompt_len = prompt.len(),
                        prompt = %prompt,
                        error_kind = ?AttemptErrorKind::Invocation,
                        error = %e,
                        "model invocation failed"
                    );
                    attempts.push(AttemptRecord {
                        attempt,
                        kind: AttemptErrorKind::Invocation,
                        message: e.to_string(),
                    });
                }
            }

            if attempt < max_attempts {
                let delay = self.config.retry_delay_ms * attempt as u64;
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
        }

        Err(PipelineError::AssociationExhausted { attempts })
    }
}

/// Build the association prompt. The taxonomy block comes first and is
/// stable across batches of one assessment, so prompt-caching backends
/// can reuse it; the per-batch finding block follows.
pub fn build_prompt(
    tool: ScanningTool,
    findings: &[ScanFinding],
    metadata: &[BestPracticeMetadata],
) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You map cloud security findings onto a compliance framework of best practices.\n\n\
         ## BEST PRACTICES\n\
         Each line is `<index>. [<pillar> / <question>] <label>: <description>`.\n",
    );
    for meta in metadata {
        let _ = writeln!(
            prompt,
            "{}. [{} / {}] {}: {}",
            meta.index, meta.pillar_label, meta.question_label, meta.label, meta.description
        );
    }

    let _ = writeln!(
        prompt,
        "\n## FINDINGS (scanner: {tool})\nEach line is `<id>. status: <status detail> | risk: <risk details>`."
    );
    for (i, finding) in findings.iter().enumerate() {
        let _ = writeln!(
            prompt,
            "{i}. status: {} | risk: {}",
            finding.status_detail, finding.risk_details
        );
    }

    prompt.push_str(
        "\n## TASK\n\
         For each finding that matches one or more best practices, emit an object \
         {\"id\": <finding id>, \"start\": <first best-practice index>, \"end\": <one past the last index>}. \
         The range start..end is half-open over consecutive best-practice indices. \
         Omit findings with no match.\n\
         Respond with ONLY a JSON array of these objects. No markdown fencing, no prose.",
    );
    prompt
}

/// Parse and validate the raw model response against the association
/// wire schema. Out-of-range indices are a validation failure, never a
/// silent misassociation.
pub fn validate_response(
    raw: &str,
    finding_count: usize,
    metadata_count: usize,
) -> Result<Vec<AiFindingAssociation>, (AttemptErrorKind, String)> {
    let entries: Vec<AiFindingAssociation> = serde_json::from_str(raw.trim()).map_err(|e| {
        (
            AttemptErrorKind::InvalidResponse,
            format!("response is not a valid association array: {e}"),
        )
    })?;

    for entry in &entries {
        if entry.id >= finding_count {
            return Err((
                AttemptErrorKind::OutOfRange,
                format!(
                    "finding id {} out of range (batch has {finding_count} findings)",
                    entry.id
                ),
            ));
        }
        if entry.start > entry.end {
            return Err((
                AttemptErrorKind::OutOfRange,
                format!("inverted range {}..{}", entry.start, entry.end),
            ));
        }
        if entry.end > metadata_count {
            return Err((
                AttemptErrorKind::OutOfRange,
                format!(
                    "range end {} out of range ({metadata_count} best practices)",
                    entry.end
                ),
            ));
        }
    }

    Ok(entries)
}

/// Resolve validated wire entries into one association per input finding.
fn resolve(
    findings: &[ScanFinding],
    metadata: &[BestPracticeMetadata],
    entries: &[AiFindingAssociation],
) -> Vec<Association> {
    let mut refs_by_finding: HashMap<usize, Vec<_>> = HashMap::new();
    for entry in entries {
        let refs = refs_by_finding.entry(entry.id).or_default();
        for meta in &metadata[entry.start..entry.end] {
            refs.push(meta.reference.clone());
        }
    }

    findings
        .iter()
        .enumerate()
        .map(|(i, finding)| Association {
            finding: finding.clone(),
            best_practices: refs_by_finding.remove(&i).unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::finding::SeverityType;
    use crate::models::taxonomy::{BestPractice, Pillar, Question};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Scripted model client: pops queued responses, counts calls.
    struct ScriptedClient {
        responses: Mutex<Vec<anyhow::Result<String>>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(responses: Vec<anyhow::Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ModelClient for ScriptedClient {
        async fn converse(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("scripted client exhausted");
            }
            responses.remove(0)
        }
    }

    fn taxonomy() -> Taxonomy {
        let bp = |id: &str, label: &str| BestPractice {
            id: id.to_string(),
            primary_id: format!("primary-{id}"),
            label: label.to_string(),
            disabled: false,
            risk: SeverityType::High,
            description: format!("{label} in every account"),
            checked: false,
        };
        Taxonomy {
            version: "test".to_string(),
            pillars: vec![Pillar {
                id: "sec".to_string(),
                primary_id: "pillar-sec".to_string(),
                label: "Security".to_string(),
                disabled: false,
                questions: vec![Question {
                    id: "sec-1".to_string(),
                    primary_id: "q-sec-1".to_string(),
                    label: "How do you manage identities?".to_string(),
                    disabled: false,
                    best_practices: vec![
                        bp("bp-mfa", "Enforce MFA"),
                        bp("bp-keys", "Rotate access keys"),
                        bp("bp-least", "Apply least privilege"),
                    ],
                }],
            }],
        }
    }

    fn findings(n: usize) -> Vec<ScanFinding> {
        (0..n)
            .map(|i| ScanFinding {
                id: Some(format!("prowler#{}", i + 1)),
                resources: vec![],
                remediation: None,
                risk_details: format!("risk {i}"),
                severity: SeverityType::High,
                status_code: "FAIL".to_string(),
                status_detail: format!("detail {i}"),
                event_code: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn resolves_ranges_and_fills_unmatched_findings() {
        let client = ScriptedClient::new(vec![Ok(
            r#"[{"id":0,"start":0,"end":2},{"id":2,"start":2,"end":3}]"#.to_string(),
        )]);
        let associator = BestPracticeAssociator::new(&client);
        let batch = findings(3);

        let associations = associator
            .associate(ScanningTool::Prowler, &batch, &taxonomy())
            .await
            .unwrap();

        assert_eq!(associations.len(), 3);
        assert_eq!(associations[0].best_practices.len(), 2);
        assert_eq!(associations[0].best_practices[0].best_practice_id, "bp-mfa");
        assert_eq!(associations[0].best_practices[1].best_practice_id, "bp-keys");
        // Finding 1 had no entry: present with an empty list.
        assert!(associations[1].best_practices.is_empty());
        assert_eq!(
            associations[2].best_practices[0].best_practice_id,
            "bp-least"
        );
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_range_resolves_to_no_references() {
        let client =
            ScriptedClient::new(vec![Ok(r#"[{"id":0,"start":1,"end":1}]"#.to_string())]);
        let associator = BestPracticeAssociator::new(&client);
        let batch = findings(1);
        let associations = associator
            .associate(ScanningTool::Prowler, &batch, &taxonomy())
            .await
            .unwrap();
        assert!(associations[0].best_practices.is_empty());
    }

    #[tokio::test]
    async fn invalid_json_three_times_fails_after_exactly_three_attempts() {
        let client = ScriptedClient::new(vec![
            Ok("not json".to_string()),
            Ok("also not json".to_string()),
            Ok("{\"still\": \"wrong shape\"}".to_string()),
        ]);
        let associator = BestPracticeAssociator::with_config(
            &client,
            AssociatorConfig {
                max_retries: 2,
                retry_delay_ms: 0,
            },
        );

        let err = associator
            .associate(ScanningTool::Prowler, &findings(2), &taxonomy())
            .await
            .unwrap_err();

        assert_eq!(client.call_count(), 3);
        let PipelineError::AssociationExhausted { attempts } = err else {
            panic!("expected AssociationExhausted, got {err}");
        };
        assert_eq!(attempts.len(), 3);
        assert!(attempts
            .iter()
            .all(|a| a.kind == AttemptErrorKind::InvalidResponse));
        assert_eq!(attempts[2].attempt, 3);
    }

    #[tokio::test]
    async fn invocation_failure_retries_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Err(anyhow::anyhow!("throttled")),
            Ok(r#"[{"id":0,"start":0,"end":1}]"#.to_string()),
        ]);
        let associator = BestPracticeAssociator::with_config(
            &client,
            AssociatorConfig {
                max_retries: 2,
                retry_delay_ms: 0,
            },
        );

        let associations = associator
            .associate(ScanningTool::SecurityHub, &findings(1), &taxonomy())
            .await
            .unwrap();
        assert_eq!(client.call_count(), 2);
        assert_eq!(associations[0].best_practices.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_indices_consume_the_retry_budget() {
        let client = ScriptedClient::new(vec![
            Ok(r#"[{"id":9,"start":0,"end":1}]"#.to_string()),
            Ok(r#"[{"id":0,"start":0,"end":99}]"#.to_string()),
            Ok(r#"[{"id":0,"start":2,"end":1}]"#.to_string()),
        ]);
        let associator = BestPracticeAssociator::with_config(
            &client,
            AssociatorConfig {
                max_retries: 2,
                retry_delay_ms: 0,
            },
        );

        let err = associator
            .associate(ScanningTool::Prowler, &findings(2), &taxonomy())
            .await
            .unwrap_err();
        let PipelineError::AssociationExhausted { attempts } = err else {
            panic!("expected AssociationExhausted");
        };
        assert!(attempts
            .iter()
            .all(|a| a.kind == AttemptErrorKind::OutOfRange));
    }

    #[test]
    fn validate_accepts_all_in_range_entries() {
        // Every valid (id, start, end) with id < k, start <= end <= m resolves.
        let entries = validate_response(r#"[{"id":0,"start":0,"end":3}]"#, 1, 3).unwrap();
        assert_eq!(entries.len(), 1);
        let entries = validate_response("[]", 0, 0).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn prompt_embeds_taxonomy_then_findings() {
        let metadata = taxonomy().flatten();
        let batch = findings(2);
        let prompt = build_prompt(ScanningTool::Prowler, &batch, &metadata);
        let taxonomy_pos = prompt.find("Enforce MFA").unwrap();
        let finding_pos = prompt.find("detail 0").unwrap();
        assert!(taxonomy_pos < finding_pos);
        assert!(prompt.contains("0. [Security / How do you manage identities?]"));
        assert!(prompt.contains("scanner: prowler"));
    }
}
