//! Object storage consumed through a narrow get/put/list/delete contract
//! over `s3://<bucket>/<key>` URIs. The pipeline only ever does
//! point-to-point reads and writes of whole artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::errors::PipelineError;

/// A parsed `s3://<bucket>/<key>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Uri {
    pub bucket: String,
    pub key: String,
}

impl S3Uri {
    pub fn parse(uri: &str) -> Result<Self, PipelineError> {
        let rest = uri
            .strip_prefix("s3://")
            .ok_or_else(|| PipelineError::Uri(format!("missing s3:// scheme: {uri}")))?;
        let (bucket, key) = rest
            .split_once('/')
            .ok_or_else(|| PipelineError::Uri(format!("missing key: {uri}")))?;
        if bucket.is_empty() || key.is_empty() {
            return Err(PipelineError::Uri(format!("empty bucket or key: {uri}")));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl std::fmt::Display for S3Uri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s3://{}/{}", self.bucket, self.key)
    }
}

/// Narrow object-store contract.
#[allow(async_fn_in_trait)]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, uri: &str) -> Result<Vec<u8>, PipelineError>;
    async fn put(&self, uri: &str, data: Vec<u8>) -> Result<(), PipelineError>;
    /// List full URIs under a URI prefix.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError>;
    async fn delete(&self, uri: &str) -> Result<(), PipelineError>;
}

/// In-memory store for tests and local runs.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, uri: &str) -> Result<Vec<u8>, PipelineError> {
        S3Uri::parse(uri)?;
        let objects = self.objects.lock().expect("store lock poisoned");
        objects
            .get(uri)
            .cloned()
            .ok_or_else(|| PipelineError::NotFound(uri.to_string()))
    }

    async fn put(&self, uri: &str, data: Vec<u8>) -> Result<(), PipelineError> {
        S3Uri::parse(uri)?;
        let mut objects = self.objects.lock().expect("store lock poisoned");
        objects.insert(uri.to_string(), data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let objects = self.objects.lock().expect("store lock poisoned");
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, uri: &str) -> Result<(), PipelineError> {
        let mut objects = self.objects.lock().expect("store lock poisoned");
        objects.remove(uri);
        Ok(())
    }
}

/// Filesystem-backed store mapping `s3://bucket/key` to
/// `<root>/bucket/key`, for worker execution outside the cloud.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, uri: &str) -> Result<PathBuf, PipelineError> {
        let parsed = S3Uri::parse(uri)?;
        Ok(self.root.join(parsed.bucket).join(parsed.key))
    }
}

impl ObjectStore for FsObjectStore {
    async fn get(&self, uri: &str) -> Result<Vec<u8>, PipelineError> {
        let path = self.path_for(uri)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(PipelineError::NotFound(uri.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, uri: &str, data: Vec<u8>) -> Result<(), PipelineError> {
        let path = self.path_for(uri)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, PipelineError> {
        let rest = prefix
            .strip_prefix("s3://")
            .ok_or_else(|| PipelineError::Uri(format!("missing s3:// scheme: {prefix}")))?;
        let bucket = rest.split('/').next().unwrap_or("");
        if bucket.is_empty() {
            return Err(PipelineError::Uri(format!("empty bucket: {prefix}")));
        }
        let bucket_root = self.root.join(bucket);
        let mut uris = Vec::new();
        collect_files(&bucket_root, &bucket_root, bucket, &mut uris)?;
        uris.retain(|u| u.starts_with(prefix));
        uris.sort();
        Ok(uris)
    }

    async fn delete(&self, uri: &str) -> Result<(), PipelineError> {
        let path = self.path_for(uri)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn collect_files(
    root: &Path,
    dir: &Path,
    bucket: &str,
    out: &mut Vec<String>,
) -> Result<(), PipelineError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, bucket, out)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(format!(
                "s3://{bucket}/{}",
                relative.to_string_lossy().replace('\\', "/")
            ));
        }
    }
    Ok(())
}
