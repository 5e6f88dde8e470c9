use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{pipeline::PipelineArtifact, secret::Sensitive};

/// Failure reported by an execution service client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Network failure, quota or server-side outage; the call may be retried.
    #[error("transient failure: {0}")]
    Transient(String),

    /// The service refused the request (malformed spec, unauthorized identity).
    /// Carries the service's own diagnostic message.
    #[error("{0}")]
    Rejected(String),
}

/// A compiled pipeline stored on the service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePipeline {
    pub id: String,
    pub name: String,

    /// Opaque version marker used as a precondition for updates.
    pub revision: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSchedule {
    pub id: String,
    pub name: String,
    pub cron: String,
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRun {
    pub id: String,
    pub dashboard_uri: Option<String>,
}

/// Desired state of the schedule for one submission key.
#[derive(Clone, Debug)]
pub struct ScheduleRequest {
    pub name: String,
    pub cron: String,
    pub pipeline: RemotePipeline,
    pub artifact: PipelineArtifact,
    pub pipeline_root: String,
    pub service_account: Sensitive<String>,
    pub max_concurrent_run_count: u32,
    pub labels: BTreeMap<String, String>,
}

/// One-off run of a stored pipeline.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub display_name: String,
    pub pipeline: RemotePipeline,
    pub artifact: PipelineArtifact,
    pub pipeline_root: String,
    pub service_account: Sensitive<String>,
    pub labels: BTreeMap<String, String>,
}

/// Managed pipeline and scheduling service.
/// ---
/// Pipelines and schedules are addressed by name. The orchestrator performs the
/// lookup itself and then calls exactly one of create or update, so
/// implementations never have to guess whether a call is an upsert.
#[async_trait]
pub trait ExecutionService: Send + Sync {
    async fn find_pipeline(&self, name: &str) -> Result<Option<RemotePipeline>, ServiceError>;

    async fn create_pipeline(
        &self,
        name: &str,
        artifact: &PipelineArtifact,
    ) -> Result<RemotePipeline, ServiceError>;

    async fn update_pipeline(
        &self,
        existing: &RemotePipeline,
        artifact: &PipelineArtifact,
    ) -> Result<RemotePipeline, ServiceError>;

    /// All schedules carrying `name`, oldest first.
    async fn list_schedules(&self, name: &str) -> Result<Vec<RemoteSchedule>, ServiceError>;

    async fn create_schedule(
        &self,
        request: &ScheduleRequest,
    ) -> Result<RemoteSchedule, ServiceError>;

    async fn update_schedule(
        &self,
        existing: &RemoteSchedule,
        request: &ScheduleRequest,
    ) -> Result<RemoteSchedule, ServiceError>;

    async fn delete_schedule(&self, existing: &RemoteSchedule) -> Result<(), ServiceError>;

    async fn launch_run(&self, request: &RunRequest) -> Result<RemoteRun, ServiceError>;
}
