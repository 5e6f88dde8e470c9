use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use pipewright_common::{
    context::ResolvedContext,
    error::Error,
    pipeline::PipelineArtifact,
    service::{
        ExecutionService, RemotePipeline, RemoteRun, RemoteSchedule, RunRequest, ScheduleRequest,
        ServiceError,
    },
};
use tokio::sync::Mutex;
use tracing::info;

use crate::deploy::ServiceConnector;

#[derive(Default)]
struct ServiceState {
    pipelines: BTreeMap<String, (RemotePipeline, PipelineArtifact)>,
    schedules: Vec<RemoteSchedule>,
    runs: Vec<RemoteRun>,
    calls: Vec<String>,
    failures: VecDeque<ServiceError>,
    next_id: u64,
}

impl ServiceState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    /// Records the call and returns an injected failure, if one is queued.
    fn enter(&mut self, call: &str) -> Result<(), ServiceError> {
        self.calls.push(call.to_string());
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Execution service kept entirely in memory.
/// ---
/// Backs `deploy --dry-run` and the tests. Behaves like the remote service
/// for names, revisions and duplicates, and can be told to fail the next
/// calls to exercise retry handling.
#[derive(Default)]
pub struct InMemoryExecutionService {
    state: Mutex<ServiceState>,
}

impl InMemoryExecutionService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next call fail with `error`. Queued failures apply in order.
    pub async fn fail_next(&self, error: ServiceError) {
        self.state.lock().await.failures.push_back(error);
    }

    /// Adds a schedule as if an earlier tool had created it.
    pub async fn seed_schedule(&self, name: &str, cron: &str) -> RemoteSchedule {
        let mut state = self.state.lock().await;
        let schedule = RemoteSchedule {
            id: state.next_id("schedule"),
            name: name.to_string(),
            cron: cron.to_string(),
            labels: BTreeMap::new(),
        };
        state.schedules.push(schedule.clone());
        schedule
    }

    pub async fn schedules(&self) -> Vec<RemoteSchedule> {
        self.state.lock().await.schedules.clone()
    }

    pub async fn pipeline_artifact(&self, name: &str) -> Option<PipelineArtifact> {
        self.state
            .lock()
            .await
            .pipelines
            .get(name)
            .map(|(_, artifact)| artifact.clone())
    }

    pub async fn runs(&self) -> Vec<RemoteRun> {
        self.state.lock().await.runs.clone()
    }

    /// Names of every call received, in order.
    pub async fn calls(&self) -> Vec<String> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl ExecutionService for InMemoryExecutionService {
    async fn find_pipeline(&self, name: &str) -> Result<Option<RemotePipeline>, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("find_pipeline")?;
        Ok(state.pipelines.get(name).map(|(p, _)| p.clone()))
    }

    async fn create_pipeline(
        &self,
        name: &str,
        artifact: &PipelineArtifact,
    ) -> Result<RemotePipeline, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("create_pipeline")?;

        if state.pipelines.contains_key(name) {
            return Err(ServiceError::Rejected(format!(
                "pipeline '{}' already exists",
                name
            )));
        }

        let pipeline = RemotePipeline {
            id: state.next_id("pipeline"),
            name: name.to_string(),
            revision: "1".to_string(),
        };
        state
            .pipelines
            .insert(name.to_string(), (pipeline.clone(), artifact.clone()));
        Ok(pipeline)
    }

    async fn update_pipeline(
        &self,
        existing: &RemotePipeline,
        artifact: &PipelineArtifact,
    ) -> Result<RemotePipeline, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("update_pipeline")?;

        let Some((current, stored)) = state.pipelines.get_mut(&existing.name) else {
            return Err(ServiceError::Rejected(format!(
                "pipeline '{}' does not exist",
                existing.name
            )));
        };

        if current.revision != existing.revision {
            return Err(ServiceError::Rejected(format!(
                "pipeline '{}' changed concurrently (revision {} != {})",
                existing.name, current.revision, existing.revision
            )));
        }

        let revision = current.revision.parse::<u64>().unwrap_or(0) + 1;
        current.revision = revision.to_string();
        *stored = artifact.clone();
        Ok(current.clone())
    }

    async fn list_schedules(&self, name: &str) -> Result<Vec<RemoteSchedule>, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("list_schedules")?;
        Ok(state
            .schedules
            .iter()
            .filter(|s| s.name == name)
            .cloned()
            .collect())
    }

    async fn create_schedule(
        &self,
        request: &ScheduleRequest,
    ) -> Result<RemoteSchedule, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("create_schedule")?;

        if !state.pipelines.contains_key(&request.pipeline.name) {
            return Err(ServiceError::Rejected(format!(
                "schedule '{}' references unknown pipeline '{}'",
                request.name, request.pipeline.name
            )));
        }

        let schedule = RemoteSchedule {
            id: state.next_id("schedule"),
            name: request.name.clone(),
            cron: request.cron.clone(),
            labels: request.labels.clone(),
        };
        state.schedules.push(schedule.clone());
        Ok(schedule)
    }

    async fn update_schedule(
        &self,
        existing: &RemoteSchedule,
        request: &ScheduleRequest,
    ) -> Result<RemoteSchedule, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("update_schedule")?;

        let Some(schedule) = state.schedules.iter_mut().find(|s| s.id == existing.id) else {
            return Err(ServiceError::Rejected(format!(
                "schedule '{}' does not exist",
                existing.id
            )));
        };

        schedule.name = request.name.clone();
        schedule.cron = request.cron.clone();
        schedule.labels = request.labels.clone();
        Ok(schedule.clone())
    }

    async fn delete_schedule(&self, existing: &RemoteSchedule) -> Result<(), ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("delete_schedule")?;
        state.schedules.retain(|s| s.id != existing.id);
        Ok(())
    }

    async fn launch_run(&self, request: &RunRequest) -> Result<RemoteRun, ServiceError> {
        let mut state = self.state.lock().await;
        state.enter("launch_run")?;

        let run = RemoteRun {
            id: state.next_id("run"),
            dashboard_uri: None,
        };
        info!(run_id = %run.id, pipeline = %request.pipeline.name, "Recorded in-memory run");
        state.runs.push(run.clone());
        Ok(run)
    }
}

/// Hands out one shared [`InMemoryExecutionService`] and counts connections.
#[derive(Default, Clone)]
pub struct InMemoryConnector {
    service: Arc<InMemoryExecutionService>,
    connections: Arc<AtomicUsize>,
}

impl InMemoryConnector {
    pub fn new(service: Arc<InMemoryExecutionService>) -> Self {
        Self {
            service,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn service(&self) -> Arc<InMemoryExecutionService> {
        self.service.clone()
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceConnector for InMemoryConnector {
    async fn connect(&self, _context: &ResolvedContext) -> Result<Arc<dyn ExecutionService>, Error> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(self.service.clone())
    }
}
