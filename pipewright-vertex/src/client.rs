use std::sync::Arc;

use async_trait::async_trait;
use pipewright_common::{
    context::ResolvedContext,
    error::Error,
    pipeline::PipelineArtifact,
    secret::Sensitive,
    service::{
        ExecutionService, RemotePipeline, RemoteRun, RemoteSchedule, RunRequest, ScheduleRequest,
        ServiceError,
    },
};
use pipewright_engine::ServiceConnector;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::mapping::{
    self, ListSchedulesResponse, PipelineJobResource, SCHEDULE_UPDATE_MASK, ScheduleResource,
    StorageObject,
};

/// Folder under the artifact bucket that holds compiled pipelines.
const TEMPLATE_PREFIX: &str = "pipelines/templates";

/// Base URLs of the two REST APIs in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexEndpoints {
    /// Regional Vertex AI API, up to and including the version (`.../v1`).
    pub aiplatform: String,
    pub storage: String,
}

impl VertexEndpoints {
    pub fn for_region(region: &str) -> Self {
        Self {
            aiplatform: format!("https://{}-aiplatform.googleapis.com/v1", region),
            storage: "https://storage.googleapis.com".to_string(),
        }
    }
}

/// Vertex AI Pipelines client.
/// ---
/// Compiled pipelines live as JSON objects in the artifact bucket, using the
/// object generation as revision. Schedules are Vertex AI schedules whose
/// job request embeds the compiled pipeline spec.
pub struct VertexClient {
    http: reqwest::Client,
    endpoints: VertexEndpoints,
    project: String,
    region: String,
    bucket: String,
    token: Sensitive<String>,
}

impl VertexClient {
    pub fn new(
        context: &ResolvedContext,
        token: Sensitive<String>,
        endpoints: VertexEndpoints,
    ) -> Result<Self, Error> {
        let bucket = bucket_of(&context.artifact_location).ok_or_else(|| {
            Error::Settings(format!(
                "artifact location '{}' is not a gs:// path",
                context.artifact_location
            ))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(concat!("pipewright/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoints,
            project: context.project_identity.clone(),
            region: context.compute_location.clone(),
            bucket,
            token,
        })
    }

    fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project, self.region)
    }

    fn url(&self, base: &str, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = Url::parse(base)
            .map_err(|e| ServiceError::Rejected(format!("invalid endpoint '{}': {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::Rejected(format!("endpoint '{}' cannot be a base", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn aiplatform_url(&self, resource: &str) -> Result<Url, ServiceError> {
        let segments: Vec<&str> = resource.split('/').collect();
        self.url(&self.endpoints.aiplatform, &segments)
    }

    fn object_name(&self, pipeline_name: &str) -> String {
        format!("{}/{}.json", TEMPLATE_PREFIX, pipeline_name)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(self.token.expose())
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ServiceError> {
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            return Err(classify(status, &body));
        }

        // DELETE and similar calls answer with an empty body.
        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| {
            ServiceError::Rejected(format!("unexpected response from service: {}", e))
        })
    }

    async fn upload(
        &self,
        pipeline_name: &str,
        artifact: &PipelineArtifact,
        if_generation_match: &str,
    ) -> Result<RemotePipeline, ServiceError> {
        let object = self.object_name(pipeline_name);
        let url = self.url(
            &self.endpoints.storage,
            &["upload", "storage", "v1", "b", &self.bucket, "o"],
        )?;

        let object: StorageObject = self
            .send(
                self.request(Method::POST, url)
                    .query(&[
                        ("uploadType", "media"),
                        ("name", object.as_str()),
                        ("ifGenerationMatch", if_generation_match),
                    ])
                    .json(artifact),
            )
            .await?;

        Ok(mapping::object_to_domain(pipeline_name, object))
    }
}

#[async_trait]
impl ExecutionService for VertexClient {
    #[instrument(skip(self))]
    async fn find_pipeline(&self, name: &str) -> Result<Option<RemotePipeline>, ServiceError> {
        let object = self.object_name(name);
        let url = self.url(
            &self.endpoints.storage,
            &["storage", "v1", "b", &self.bucket, "o", &object],
        )?;

        match self.send::<StorageObject>(self.request(Method::GET, url)).await {
            Ok(object) => Ok(Some(mapping::object_to_domain(name, object))),
            Err(ServiceError::Rejected(message)) if message.starts_with(NOT_FOUND_MARKER) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, artifact))]
    async fn create_pipeline(
        &self,
        name: &str,
        artifact: &PipelineArtifact,
    ) -> Result<RemotePipeline, ServiceError> {
        self.upload(name, artifact, "0").await
    }

    #[instrument(skip(self, artifact), fields(name = %existing.name, revision = %existing.revision))]
    async fn update_pipeline(
        &self,
        existing: &RemotePipeline,
        artifact: &PipelineArtifact,
    ) -> Result<RemotePipeline, ServiceError> {
        self.upload(&existing.name, artifact, &existing.revision)
            .await
    }

    #[instrument(skip(self))]
    async fn list_schedules(&self, name: &str) -> Result<Vec<RemoteSchedule>, ServiceError> {
        let url = self.aiplatform_url(&format!("{}/schedules", self.parent()))?;
        let filter = format!("display_name=\"{}\"", name);

        let mut resources: Vec<ScheduleResource> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut builder = self
                .request(Method::GET, url.clone())
                .query(&[("filter", filter.as_str())]);
            if let Some(token) = &page_token {
                builder = builder.query(&[("pageToken", token.as_str())]);
            }

            let page: ListSchedulesResponse = self.send(builder).await?;
            resources.extend(page.schedules);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        // Exact match only; the filter syntax also matches on prefixes in some API versions.
        resources.retain(|r| r.display_name == name);
        resources.sort_by(|a, b| a.create_time.cmp(&b.create_time));

        debug!(count = resources.len(), "Listed schedules");
        Ok(resources.into_iter().map(mapping::schedule_to_domain).collect())
    }

    #[instrument(skip_all, fields(name = %request.name))]
    async fn create_schedule(
        &self,
        request: &ScheduleRequest,
    ) -> Result<RemoteSchedule, ServiceError> {
        let parent = self.parent();
        let url = self.aiplatform_url(&format!("{}/schedules", parent))?;

        let resource: ScheduleResource = self
            .send(
                self.request(Method::POST, url)
                    .json(&mapping::schedule_body(&parent, request)),
            )
            .await?;

        Ok(mapping::schedule_to_domain(resource))
    }

    #[instrument(skip_all, fields(id = %existing.id))]
    async fn update_schedule(
        &self,
        existing: &RemoteSchedule,
        request: &ScheduleRequest,
    ) -> Result<RemoteSchedule, ServiceError> {
        let url = self.aiplatform_url(&existing.id)?;

        let resource: ScheduleResource = self
            .send(
                self.request(Method::PATCH, url)
                    .query(&[("updateMask", SCHEDULE_UPDATE_MASK)])
                    .json(&mapping::schedule_body(&self.parent(), request)),
            )
            .await?;

        Ok(mapping::schedule_to_domain(resource))
    }

    #[instrument(skip_all, fields(id = %existing.id))]
    async fn delete_schedule(&self, existing: &RemoteSchedule) -> Result<(), ServiceError> {
        let url = self.aiplatform_url(&existing.id)?;
        let _operation: serde_json::Value = self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }

    #[instrument(skip_all, fields(display_name = %request.display_name))]
    async fn launch_run(&self, request: &RunRequest) -> Result<RemoteRun, ServiceError> {
        let url = self.aiplatform_url(&format!("{}/pipelineJobs", self.parent()))?;
        let suffix = Uuid::new_v4().simple().to_string();
        let job_id = mapping::job_id(&request.display_name, &suffix[..8]);

        let job: PipelineJobResource = self
            .send(
                self.request(Method::POST, url)
                    .query(&[("pipelineJobId", job_id.as_str())])
                    .json(&mapping::run_body(request)),
            )
            .await?;

        Ok(mapping::run_to_domain(job, &self.project, &self.region))
    }
}

/// Builds a [`VertexClient`] for whichever environment is being deployed.
pub struct VertexConnector {
    token: Sensitive<String>,
    endpoints: Option<VertexEndpoints>,
}

impl VertexConnector {
    pub fn new(token: Sensitive<String>) -> Self {
        Self {
            token,
            endpoints: None,
        }
    }

    /// Targets fixed endpoints instead of the regional defaults.
    pub fn with_endpoints(mut self, endpoints: VertexEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }
}

#[async_trait]
impl ServiceConnector for VertexConnector {
    async fn connect(&self, context: &ResolvedContext) -> Result<Arc<dyn ExecutionService>, Error> {
        let endpoints = self
            .endpoints
            .clone()
            .unwrap_or_else(|| VertexEndpoints::for_region(&context.compute_location));

        debug!(aiplatform = %endpoints.aiplatform, "Connecting to Vertex AI");
        Ok(Arc::new(VertexClient::new(
            context,
            self.token.clone(),
            endpoints,
        )?))
    }
}

const NOT_FOUND_MARKER: &str = "404 Not Found";

fn classify(status: StatusCode, body: &str) -> ServiceError {
    let message = format!("{}: {}", status, mapping::error_message(body));

    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ServiceError::Transient(message)
    } else {
        ServiceError::Rejected(message)
    }
}

fn transport_error(e: reqwest::Error) -> ServiceError {
    ServiceError::Transient(format!("request failed: {}", e))
}

/// Bucket name of a `gs://bucket/path` location.
fn bucket_of(location: &str) -> Option<String> {
    let rest = location.strip_prefix("gs://")?;
    let bucket = rest.split('/').next()?;
    (!bucket.is_empty()).then(|| bucket.to_string())
}
