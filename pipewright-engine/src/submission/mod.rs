use std::{collections::BTreeMap, future::Future, sync::Arc};

use pipewright_common::{
    context::ResolvedContext,
    error::Error,
    pipeline::{PipelineArtifact, PipelineGraph, SubmissionOutcome},
    service::{
        ExecutionService, RemotePipeline, RemoteSchedule, RunRequest, ScheduleRequest,
        ServiceError,
    },
};
use tracing::{info, instrument, warn};

use crate::compiler::{compile, sanitize_label};

mod memory;
mod retry;

pub use memory::{InMemoryConnector, InMemoryExecutionService};
pub use retry::RetryPolicy;

pub const LABEL_JOB: &str = "pipewright-job";
pub const LABEL_ENVIRONMENT: &str = "pipewright-environment";
pub const LABEL_TAG: &str = "pipewright-tag";

/// One schedule may run at a time; a late run never overlaps the next one.
const MAX_CONCURRENT_RUNS: u32 = 1;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Start a run right after the schedule is in place.
    pub launch_run: bool,
}

/// Publishes compiled pipelines and keeps exactly one schedule per key.
pub struct SubmissionOrchestrator {
    service: Arc<dyn ExecutionService>,
    retry: RetryPolicy,
}

impl SubmissionOrchestrator {
    pub fn new(service: Arc<dyn ExecutionService>, retry: RetryPolicy) -> Self {
        Self { service, retry }
    }

    /// Compiles `graph` and upserts its pipeline and schedule under the
    /// submission key of `context`.
    /// ---
    /// Each upsert is retried as a whole, lookup included, so a retry after a
    /// partially applied call sees the current remote state rather than
    /// creating a duplicate.
    #[instrument(skip_all, fields(key = %context.submission_key(), tag = %tag))]
    pub async fn submit(
        &self,
        graph: &PipelineGraph,
        context: &ResolvedContext,
        tag: &str,
        options: &SubmitOptions,
    ) -> Result<SubmissionOutcome, Error> {
        let key = context.submission_key();
        let pipeline_name = key.pipeline_name();

        if graph.environment != context.environment || graph.name != pipeline_name {
            return Err(Error::GraphBuild {
                job: key.job_name.clone(),
                field: "name".to_string(),
                message: format!(
                    "graph '{}' ({}) does not belong to {}",
                    graph.name, graph.environment, key
                ),
            });
        }
        if tag.trim().is_empty() {
            return Err(Error::GraphBuild {
                job: key.job_name.clone(),
                field: "tag".to_string(),
                message: "deployment tag is empty".to_string(),
            });
        }

        let artifact = compile(graph, &context.artifact_location)?;

        let (pipeline, pipeline_existed) = self
            .with_retry("upsert_pipeline", || {
                upsert_pipeline(self.service.as_ref(), &pipeline_name, &artifact)
            })
            .await?;
        info!(pipeline_id = %pipeline.id, updated = pipeline_existed, "Pipeline stored");

        let labels = BTreeMap::from([
            (LABEL_JOB.to_string(), sanitize_label(&key.job_name)),
            (LABEL_ENVIRONMENT.to_string(), key.environment.to_string()),
            (LABEL_TAG.to_string(), sanitize_label(tag)),
        ]);

        let request = ScheduleRequest {
            name: key.schedule_name(),
            cron: context.job.schedule.expression().to_string(),
            pipeline: pipeline.clone(),
            artifact: artifact.clone(),
            pipeline_root: context.artifact_location.clone(),
            service_account: context.service_identity.clone(),
            max_concurrent_run_count: MAX_CONCURRENT_RUNS,
            labels: labels.clone(),
        };

        let (schedule, schedule_existed) = self
            .with_retry("upsert_schedule", || {
                upsert_schedule(self.service.as_ref(), &request)
            })
            .await?;
        info!(schedule_id = %schedule.id, updated = schedule_existed, cron = %schedule.cron, "Schedule stored");

        let run_id = if options.launch_run {
            Some(
                self.launch(&pipeline, &artifact, context, labels)
                    .await?,
            )
        } else {
            None
        };

        Ok(SubmissionOutcome {
            key,
            pipeline_id: pipeline.id,
            schedule_id: schedule.id,
            replaced: pipeline_existed || schedule_existed,
            run_id,
        })
    }

    /// Launching is not idempotent, so it gets exactly one attempt.
    async fn launch(
        &self,
        pipeline: &RemotePipeline,
        artifact: &PipelineArtifact,
        context: &ResolvedContext,
        labels: BTreeMap<String, String>,
    ) -> Result<String, Error> {
        let request = RunRequest {
            display_name: format!(
                "{}-{}",
                pipeline.name,
                chrono::Utc::now().format("%Y%m%d%H%M%S")
            ),
            pipeline: pipeline.clone(),
            artifact: artifact.clone(),
            pipeline_root: context.artifact_location.clone(),
            service_account: context.service_identity.clone(),
            labels,
        };

        let run = self
            .service
            .launch_run(&request)
            .await
            .map_err(|e| service_error("launch_run", 1, e))?;

        info!(run_id = %run.id, dashboard = ?run.dashboard_uri, "Run launched");
        Ok(run.id)
    }

    async fn with_retry<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let attempts = self.retry.attempts();
        let mut attempt = 1;

        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(ServiceError::Transient(message)) if attempt < attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Transient service failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(service_error(operation, attempt, e)),
            }
        }
    }
}

async fn upsert_pipeline(
    service: &dyn ExecutionService,
    name: &str,
    artifact: &PipelineArtifact,
) -> Result<(RemotePipeline, bool), ServiceError> {
    match service.find_pipeline(name).await? {
        Some(existing) => Ok((service.update_pipeline(&existing, artifact).await?, true)),
        None => Ok((service.create_pipeline(name, artifact).await?, false)),
    }
}

/// Updates the oldest schedule of the key and deletes any duplicates.
async fn upsert_schedule(
    service: &dyn ExecutionService,
    request: &ScheduleRequest,
) -> Result<(RemoteSchedule, bool), ServiceError> {
    let mut existing = service.list_schedules(&request.name).await?.into_iter();

    let Some(first) = existing.next() else {
        return Ok((service.create_schedule(request).await?, false));
    };

    let updated = service.update_schedule(&first, request).await?;
    for duplicate in existing {
        warn!(schedule_id = %duplicate.id, name = %duplicate.name, "Deleting duplicate schedule");
        service.delete_schedule(&duplicate).await?;
    }

    Ok((updated, true))
}

fn service_error(operation: &str, attempts: u32, error: ServiceError) -> Error {
    match error {
        ServiceError::Transient(message) => Error::TransientService {
            operation: operation.to_string(),
            attempts,
            message,
        },
        ServiceError::Rejected(message) => Error::ServiceRejected {
            operation: operation.to_string(),
            message,
        },
    }
}
