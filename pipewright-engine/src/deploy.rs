use std::sync::Arc;

use async_trait::async_trait;
use pipewright_common::{
    context::ResolvedContext,
    error::Error,
    gate::GateRequest,
    pipeline::{PipelineGraph, SubmissionOutcome},
    service::ExecutionService,
};
use pipewright_registry::JobRegistry;
use tracing::{info, instrument};

use crate::{
    gate::EnvironmentGate,
    resolver::{ConfigResolver, Configuration},
    submission::{RetryPolicy, SubmissionOrchestrator, SubmitOptions},
    synth::GraphSynthesizer,
};

/// Opens a client for the execution service of a resolved environment.
#[async_trait]
pub trait ServiceConnector: Send + Sync {
    async fn connect(&self, context: &ResolvedContext) -> Result<Arc<dyn ExecutionService>, Error>;
}

pub struct DeployRequest<'a> {
    pub job: &'a str,
    pub configuration: &'a Configuration,
    pub tag: &'a str,
    pub actor: &'a str,

    /// Explicit image to deploy instead of the registry image at `tag`.
    pub image: Option<&'a str>,
    pub options: SubmitOptions,
}

/// Runs the full deployment flow for one job and environment.
/// ---
/// load, resolve, synthesize, gate, connect, submit. The gate is evaluated
/// before the connector is touched, so a refused submission never reaches
/// the execution service.
pub struct Deployer {
    registry: JobRegistry,
    resolver: ConfigResolver,
    synthesizer: GraphSynthesizer,
    gate: EnvironmentGate,
    connector: Arc<dyn ServiceConnector>,
    retry: RetryPolicy,
}

impl Deployer {
    pub fn new(
        registry: JobRegistry,
        gate: EnvironmentGate,
        connector: Arc<dyn ServiceConnector>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry,
            resolver: ConfigResolver::new(),
            synthesizer: GraphSynthesizer::new(),
            gate,
            connector,
            retry,
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Loads, resolves and synthesizes `job` without touching any service.
    pub fn prepare(
        &self,
        job: &str,
        configuration: &Configuration,
        tag: &str,
        image: Option<&str>,
    ) -> Result<(ResolvedContext, PipelineGraph), Error> {
        let descriptor = self.registry.load_descriptor(job)?;
        let context = self.resolver.resolve(&descriptor, configuration)?;

        let context = match image {
            Some(reference) => context.with_image(reference),
            None => context.pin_image_tag(tag),
        };

        let graph = self.synthesizer.synthesize(&context)?;
        Ok((context, graph))
    }

    #[instrument(skip_all, fields(job = %request.job, environment = %request.configuration.environment(), tag = %request.tag))]
    pub async fn deploy(&self, request: DeployRequest<'_>) -> Result<SubmissionOutcome, Error> {
        let (context, graph) = self.prepare(
            request.job,
            request.configuration,
            request.tag,
            request.image,
        )?;

        self.gate
            .enforce(&GateRequest {
                key: context.submission_key(),
                actor: request.actor.to_string(),
                tag: request.tag.to_string(),
            })
            .await?;

        let service = self.connector.connect(&context).await?;
        let orchestrator = SubmissionOrchestrator::new(service, self.retry.clone());
        let outcome = orchestrator
            .submit(&graph, &context, request.tag, &request.options)
            .await?;

        info!(
            pipeline_id = %outcome.pipeline_id,
            schedule_id = %outcome.schedule_id,
            replaced = outcome.replaced,
            "Deployment complete"
        );
        Ok(outcome)
    }
}
