use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pipewright_common::{
    error::Error,
    gate::{ApprovalRecord, ApprovalStore},
    pipeline::SubmissionKey,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApprovalFile {
    #[serde(default)]
    approvals: Vec<ApprovalRecord>,
}

/// Reviews kept in a YAML file (`approvals.yaml`), usually committed by the
/// review tooling of the repository.
/// ---
/// A missing file means no reviews exist yet.
#[derive(Debug, Clone)]
pub struct FileApprovalStore {
    path: PathBuf,
}

impl FileApprovalStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<Vec<ApprovalRecord>, Error> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No approvals file");
                return Ok(Vec::new());
            }
            Err(e) => return Err(Error::io(self.path.display(), e)),
        };

        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }

        let file: ApprovalFile = serde_yaml::from_str(&contents).map_err(|e| {
            Error::Settings(format!(
                "Invalid approvals file {}: {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(file.approvals)
    }
}

#[async_trait]
impl ApprovalStore for FileApprovalStore {
    async fn approvals_for(&self, key: &SubmissionKey) -> Result<Vec<ApprovalRecord>, Error> {
        Ok(self
            .read()
            .await?
            .into_iter()
            .filter(|r| r.job == key.job_name && r.environment == key.environment)
            .collect())
    }
}

/// Fixed set of reviews.
#[derive(Debug, Clone, Default)]
pub struct InMemoryApprovalStore {
    records: Vec<ApprovalRecord>,
}

impl InMemoryApprovalStore {
    pub fn new(records: Vec<ApprovalRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn approvals_for(&self, key: &SubmissionKey) -> Result<Vec<ApprovalRecord>, Error> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.job == key.job_name && r.environment == key.environment)
            .cloned()
            .collect())
    }
}
