use std::collections::BTreeMap;

use pipewright_common::{
    pipeline::PipelineArtifact,
    service::{RemotePipeline, RemoteRun, RemoteSchedule, RunRequest, ScheduleRequest},
};
use serde::{Deserialize, Serialize};

/// Fields a schedule update replaces.
pub(crate) const SCHEDULE_UPDATE_MASK: &str =
    "display_name,cron,max_concurrent_run_count,create_pipeline_job_request";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduleBody<'a> {
    pub display_name: &'a str,
    pub cron: &'a str,
    pub max_concurrent_run_count: String,
    pub create_pipeline_job_request: CreatePipelineJobRequest<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatePipelineJobRequest<'a> {
    pub parent: String,
    pub pipeline_job: PipelineJobBody<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PipelineJobBody<'a> {
    pub display_name: &'a str,
    pub pipeline_spec: &'a PipelineArtifact,
    pub runtime_config: RuntimeConfig<'a>,
    pub service_account: &'a str,
    pub labels: &'a BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RuntimeConfig<'a> {
    pub gcs_output_directory: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ListSchedulesResponse {
    #[serde(default)]
    pub schedules: Vec<ScheduleResource>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduleResource {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub cron: String,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub create_pipeline_job_request: Option<ScheduledJobRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ScheduledJobRequest {
    #[serde(default)]
    pub pipeline_job: Option<ScheduledJob>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScheduledJob {
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StorageObject {
    pub bucket: String,
    pub name: String,
    pub generation: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PipelineJobResource {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

pub(crate) fn schedule_body<'a>(parent: &str, request: &'a ScheduleRequest) -> ScheduleBody<'a> {
    ScheduleBody {
        display_name: &request.name,
        cron: &request.cron,
        max_concurrent_run_count: request.max_concurrent_run_count.to_string(),
        create_pipeline_job_request: CreatePipelineJobRequest {
            parent: parent.to_string(),
            pipeline_job: PipelineJobBody {
                display_name: &request.pipeline.name,
                pipeline_spec: &request.artifact,
                runtime_config: RuntimeConfig {
                    gcs_output_directory: &request.pipeline_root,
                },
                service_account: request.service_account.expose(),
                labels: &request.labels,
            },
        },
    }
}

pub(crate) fn run_body(request: &RunRequest) -> PipelineJobBody<'_> {
    PipelineJobBody {
        display_name: &request.display_name,
        pipeline_spec: &request.artifact,
        runtime_config: RuntimeConfig {
            gcs_output_directory: &request.pipeline_root,
        },
        service_account: request.service_account.expose(),
        labels: &request.labels,
    }
}

pub(crate) fn schedule_to_domain(resource: ScheduleResource) -> RemoteSchedule {
    let labels = resource
        .create_pipeline_job_request
        .and_then(|r| r.pipeline_job)
        .map(|job| job.labels)
        .unwrap_or_default();

    RemoteSchedule {
        id: resource.name,
        name: resource.display_name,
        cron: resource.cron,
        labels,
    }
}

/// Pipelines are identified by display name; the object carries the revision.
pub(crate) fn object_to_domain(pipeline_name: &str, object: StorageObject) -> RemotePipeline {
    RemotePipeline {
        id: format!("gs://{}/{}", object.bucket, object.name),
        name: pipeline_name.to_string(),
        revision: object.generation,
    }
}

pub(crate) fn run_to_domain(job: PipelineJobResource, project: &str, region: &str) -> RemoteRun {
    let job_id = job.name.rsplit('/').next().unwrap_or(job.name.as_str());
    let dashboard_uri = format!(
        "https://console.cloud.google.com/vertex-ai/locations/{}/pipelines/runs/{}?project={}",
        region, job_id, project
    );

    RemoteRun {
        id: job.name.clone(),
        dashboard_uri: Some(dashboard_uri),
    }
}

/// The service's own diagnostic from an error response, or the raw body.
pub(crate) fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => envelope.error.message,
        _ => body.trim().to_string(),
    }
}

/// Vertex job ids: lowercase letters, digits and `-`, starting with a letter.
pub(crate) fn job_id(display_name: &str, suffix: &str) -> String {
    let mut id: String = display_name
        .chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9') => c,
            _ => '-',
        })
        .collect();

    if !id.starts_with(|c: char| c.is_ascii_lowercase()) {
        id.insert_str(0, "run-");
    }

    id.truncate(128 - suffix.len() - 1);
    format!("{}-{}", id.trim_end_matches('-'), suffix)
}
