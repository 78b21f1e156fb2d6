//! Persistence consumed through a narrow contract: put/list findings,
//! attach best practices, read the taxonomy snapshot, put graph data.
//! Upsert semantics live here, keeping the association step safe to
//! re-run on orchestrator redelivery.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use crate::errors::PipelineError;
use crate::models::finding::Finding;
use crate::models::graph::GraphData;
use crate::models::taxonomy::{BestPracticeRef, Taxonomy};

#[allow(async_fn_in_trait)]
pub trait Repository: Send + Sync {
    /// Replace the persisted findings of one assessment run.
    async fn put_findings(
        &self,
        assessment_id: &str,
        findings: &[Finding],
    ) -> Result<(), PipelineError>;

    async fn list_findings(&self, assessment_id: &str) -> Result<Vec<Finding>, PipelineError>;

    /// Attach best practices to one finding by its canonical id,
    /// replacing any previous association (idempotent on re-delivery).
    async fn attach_best_practices(
        &self,
        assessment_id: &str,
        finding_id: &str,
        refs: &[BestPracticeRef],
        ai_associated: bool,
    ) -> Result<(), PipelineError>;

    /// Immutable taxonomy snapshot for one organization.
    async fn taxonomy(&self, organization_domain: &str) -> Result<Taxonomy, PipelineError>;

    async fn put_graph_data(
        &self,
        assessment_id: &str,
        graph: &GraphData,
    ) -> Result<(), PipelineError>;
}

/// In-memory repository for tests.
#[derive(Debug)]
pub struct InMemoryRepository {
    taxonomy: Taxonomy,
    findings: Mutex<HashMap<String, Vec<Finding>>>,
    graphs: Mutex<HashMap<String, GraphData>>,
}

impl InMemoryRepository {
    pub fn new(taxonomy: Taxonomy) -> Self {
        Self {
            taxonomy,
            findings: Mutex::new(HashMap::new()),
            graphs: Mutex::new(HashMap::new()),
        }
    }

    pub fn graph(&self, assessment_id: &str) -> Option<GraphData> {
        self.graphs
            .lock()
            .expect("repo lock poisoned")
            .get(assessment_id)
            .cloned()
    }
}

impl Repository for InMemoryRepository {
    async fn put_findings(
        &self,
        assessment_id: &str,
        findings: &[Finding],
    ) -> Result<(), PipelineError> {
        let mut map = self.findings.lock().expect("repo lock poisoned");
        map.insert(assessment_id.to_string(), findings.to_vec());
        Ok(())
    }

    async fn list_findings(&self, assessment_id: &str) -> Result<Vec<Finding>, PipelineError> {
        let map = self.findings.lock().expect("repo lock poisoned");
        Ok(map.get(assessment_id).cloned().unwrap_or_default())
    }

    async fn attach_best_practices(
        &self,
        assessment_id: &str,
        finding_id: &str,
        refs: &[BestPracticeRef],
        ai_associated: bool,
    ) -> Result<(), PipelineError> {
        let mut map = self.findings.lock().expect("repo lock poisoned");
        let findings = map.get_mut(assessment_id).ok_or_else(|| {
            PipelineError::NotFound(format!("assessment {assessment_id} has no findings"))
        })?;
        let finding = findings
            .iter_mut()
            .find(|f| f.scan.id.as_deref() == Some(finding_id))
            .ok_or_else(|| PipelineError::NotFound(format!("finding {finding_id}")))?;
        finding.best_practices = refs.to_vec();
        finding.is_ai_associated = ai_associated;
        Ok(())
    }

    async fn taxonomy(&self, _organization_domain: &str) -> Result<Taxonomy, PipelineError> {
        Ok(self.taxonomy.clone())
    }

    async fn put_graph_data(
        &self,
        assessment_id: &str,
        graph: &GraphData,
    ) -> Result<(), PipelineError> {
        let mut graphs = self.graphs.lock().expect("repo lock poisoned");
        graphs.insert(assessment_id.to_string(), graph.clone());
        Ok(())
    }
}

/// JSON-file-backed repository for local worker execution. Findings live
/// at `<root>/assessments/<id>/findings.json`, graphs alongside, and
/// taxonomy snapshots at `<root>/taxonomy/<organization>.json`.
#[derive(Debug, Clone)]
pub struct FsRepository {
    root: PathBuf,
}

impl FsRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn findings_path(&self, assessment_id: &str) -> PathBuf {
        self.root
            .join("assessments")
            .join(assessment_id)
            .join("findings.json")
    }

    fn graph_path(&self, assessment_id: &str) -> PathBuf {
        self.root
            .join("assessments")
            .join(assessment_id)
            .join("graph.json")
    }

    async fn write_json<T: serde::Serialize>(
        &self,
        path: &PathBuf,
        value: &T,
    ) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }
}

impl Repository for FsRepository {
    async fn put_findings(
        &self,
        assessment_id: &str,
        findings: &[Finding],
    ) -> Result<(), PipelineError> {
        self.write_json(&self.findings_path(assessment_id), &findings.to_vec())
            .await
    }

    async fn list_findings(&self, assessment_id: &str) -> Result<Vec<Finding>, PipelineError> {
        let path = self.findings_path(assessment_id);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn attach_best_practices(
        &self,
        assessment_id: &str,
        finding_id: &str,
        refs: &[BestPracticeRef],
        ai_associated: bool,
    ) -> Result<(), PipelineError> {
        let mut findings = self.list_findings(assessment_id).await?;
        let finding = findings
            .iter_mut()
            .find(|f| f.scan.id.as_deref() == Some(finding_id))
            .ok_or_else(|| PipelineError::NotFound(format!("finding {finding_id}")))?;
        finding.best_practices = refs.to_vec();
        finding.is_ai_associated = ai_associated;
        self.put_findings(assessment_id, &findings).await
    }

    async fn taxonomy(&self, organization_domain: &str) -> Result<Taxonomy, PipelineError> {
        let path = self
            .root
            .join("taxonomy")
            .join(format!("{organization_domain}.json"));
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(PipelineError::NotFound(
                format!("taxonomy for {organization_domain}"),
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn put_graph_data(
        &self,
        assessment_id: &str,
        graph: &GraphData,
    ) -> Result<(), PipelineError> {
        self.write_json(&self.graph_path(assessment_id), graph).await
    }
}
