//! Orchestrator-invoked pipeline steps.
//!
//! Each step validates its input at the boundary (fatal on mismatch),
//! calls the pipeline components, and persists or forwards results. One
//! invocation owns its finding batch and taxonomy snapshot; any fan-out
//! across chunks belongs to the external orchestrator.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::config::AppConfig;
use crate::errors::PipelineError;
use crate::llm::ModelClient;
use crate::models::finding::{Finding, ScanFinding};
use crate::models::graph::{GraphData, PillarGraph};
use crate::parsers::ScanningTool;
use crate::repo::Repository;
use crate::services::associator::{AssociatorConfig, BestPracticeAssociator};
use crate::services::chunker::chunk;
use crate::services::normalizer::normalize;
use crate::store::ObjectStore;

fn require_non_empty(value: &str, field: &str) -> Result<(), PipelineError> {
    if value.trim().is_empty() {
        return Err(PipelineError::Validation(format!(
            "{field} must not be empty"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrepareFindingsAssociationsInput {
    pub assessment_id: String,
    pub scanning_tool: ScanningTool,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub workflows: Vec<String>,
    pub organization_domain: String,
}

impl PrepareFindingsAssociationsInput {
    pub fn validate(&self) -> Result<(), PipelineError> {
        require_non_empty(&self.assessment_id, "assessmentId")?;
        require_non_empty(&self.organization_domain, "organizationDomain")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AssociateFindingsChunkInput {
    pub assessment_id: String,
    pub organization_domain: String,
    #[serde(rename = "findingsChunkURI")]
    pub findings_chunk_uri: String,
}

impl AssociateFindingsChunkInput {
    pub fn validate(&self) -> Result<(), PipelineError> {
        require_non_empty(&self.assessment_id, "assessmentId")?;
        require_non_empty(&self.organization_domain, "organizationDomain")?;
        require_non_empty(&self.findings_chunk_uri, "findingsChunkURI")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ComputeGraphDataInput {
    pub assessment_id: String,
    pub organization_domain: String,
}

impl ComputeGraphDataInput {
    pub fn validate(&self) -> Result<(), PipelineError> {
        require_non_empty(&self.assessment_id, "assessmentId")?;
        require_non_empty(&self.organization_domain, "organizationDomain")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CleanupInput {
    pub assessment_id: String,
    pub organization: String,
    #[serde(default)]
    pub error: Option<String>,
}

impl CleanupInput {
    pub fn validate(&self) -> Result<(), PipelineError> {
        require_non_empty(&self.assessment_id, "assessmentId")?;
        require_non_empty(&self.organization, "organization")
    }
}

fn raw_uri(config: &AppConfig, org: &str, assessment_id: &str, tool: ScanningTool) -> String {
    format!(
        "s3://{}/{org}/{assessment_id}/raw/{tool}.json",
        config.artifact_bucket
    )
}

fn chunk_prefix(config: &AppConfig, org: &str, assessment_id: &str) -> String {
    format!("s3://{}/{org}/{assessment_id}/chunks/", config.artifact_bucket)
}

/// Derive the scanning tool back from a `<tool>_<index>.json` chunk key.
fn tool_from_chunk_uri(uri: &str) -> Result<ScanningTool, PipelineError> {
    let file = uri.rsplit('/').next().unwrap_or(uri);
    let (tool, _) = file.rsplit_once('_').ok_or_else(|| {
        PipelineError::Validation(format!("chunk artifact name not <tool>_<index>.json: {file}"))
    })?;
    tool.parse()
}

/// Read raw scanner output, normalize it, persist the canonical
/// findings, and write bounded chunk artifacts for the association
/// fan-out. Returns the chunk URIs.
pub async fn prepare_findings_associations<S: ObjectStore, R: Repository>(
    store: &S,
    repo: &R,
    config: &AppConfig,
    input: &PrepareFindingsAssociationsInput,
) -> Result<Vec<String>, PipelineError> {
    input.validate()?;
    let tool = input.scanning_tool;

    let raw = store
        .get(&raw_uri(config, &input.organization_domain, &input.assessment_id, tool))
        .await?;
    let outcome = tool.parse(&raw, &input.regions)?;
    let (findings, summary) = normalize(outcome, &input.workflows, tool);

    let persisted: Vec<Finding> = findings.iter().cloned().map(Finding::from_scan).collect();
    repo.put_findings(&input.assessment_id, &persisted).await?;

    let prefix = chunk_prefix(config, &input.organization_domain, &input.assessment_id);
    let mut uris = Vec::new();
    for (index, batch) in chunk(findings, config.chunk_size).into_iter().enumerate() {
        let uri = format!("{prefix}{tool}_{index}.json");
        store.put(&uri, serde_json::to_vec(&batch)?).await?;
        uris.push(uri);
    }

    tracing::info!(
        assessment_id = %input.assessment_id,
        tool = %tool,
        chunks = uris.len(),
        total = summary.total,
        "prepared findings for association"
    );
    Ok(uris)
}

/// Associate one findings chunk with best practices via the model and
/// persist the result. Safe to re-run with the same chunk.
pub async fn associate_findings_chunk_to_best_practices<
    S: ObjectStore,
    R: Repository,
    C: ModelClient,
>(
    store: &S,
    repo: &R,
    client: &C,
    config: &AppConfig,
    input: &AssociateFindingsChunkInput,
) -> Result<(), PipelineError> {
    input.validate()?;
    let tool = tool_from_chunk_uri(&input.findings_chunk_uri)?;

    let data = store.get(&input.findings_chunk_uri).await?;
    let findings: Vec<ScanFinding> = serde_json::from_slice(&data)
        .map_err(|e| PipelineError::MalformedInput(format!("chunk artifact: {e}")))?;

    let taxonomy = repo.taxonomy(&input.organization_domain).await?;
    let associator = BestPracticeAssociator::with_config(
        client,
        AssociatorConfig {
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        },
    );
    let associations = associator.associate(tool, &findings, &taxonomy).await?;

    for association in &associations {
        let Some(id) = association.finding.id.as_deref() else {
            return Err(PipelineError::Internal(
                "chunk contained a finding without an id".to_string(),
            ));
        };
        repo.attach_best_practices(
            &input.assessment_id,
            id,
            &association.best_practices,
            true,
        )
        .await?;
    }

    tracing::info!(
        assessment_id = %input.assessment_id,
        chunk = %input.findings_chunk_uri,
        findings = associations.len(),
        "associated findings chunk"
    );
    Ok(())
}

/// Aggregate persisted findings into per-pillar severity tallies.
pub async fn compute_graph_data<R: Repository>(
    repo: &R,
    input: &ComputeGraphDataInput,
) -> Result<(), PipelineError> {
    input.validate()?;

    let findings = repo.list_findings(&input.assessment_id).await?;
    let taxonomy = repo.taxonomy(&input.organization_domain).await?;

    let mut pillars = Vec::new();
    for pillar in &taxonomy.pillars {
        let mut finding_count = 0usize;
        let mut severity_counts: BTreeMap<_, usize> = BTreeMap::new();
        for finding in findings.iter().filter(|f| !f.hidden) {
            if finding
                .best_practices
                .iter()
                .any(|r| r.pillar_id == pillar.id)
            {
                finding_count += 1;
                *severity_counts.entry(finding.scan.severity).or_default() += 1;
            }
        }
        pillars.push(PillarGraph {
            pillar_id: pillar.id.clone(),
            label: pillar.label.clone(),
            finding_count,
            severity_counts,
        });
    }

    repo.put_graph_data(
        &input.assessment_id,
        &GraphData {
            assessment_id: input.assessment_id.clone(),
            pillars,
        },
    )
    .await
}

/// Remove chunk artifacts for an assessment; invoked by the orchestrator
/// on completion or after a failed step.
pub async fn cleanup<S: ObjectStore>(
    store: &S,
    config: &AppConfig,
    input: &CleanupInput,
) -> Result<(), PipelineError> {
    input.validate()?;

    if let Some(error) = &input.error {
        tracing::error!(
            assessment_id = %input.assessment_id,
            error = %error,
            "cleaning up after failed assessment step"
        );
    }

    let prefix = chunk_prefix(config, &input.organization, &input.assessment_id);
    let artifacts = store.list(&prefix).await?;
    let removed = artifacts.len();
    for uri in artifacts {
        store.delete(&uri).await?;
    }
    tracing::info!(
        assessment_id = %input.assessment_id,
        removed,
        "cleaned up chunk artifacts"
    );
    Ok(())
}
