use pipewright_common::{
    context::ResolvedContext,
    error::Error,
    job::IMAGE_PARAMETER,
    pipeline::{PipelineGraph, ResourceRequest, Step, StepRetryPolicy},
};
use tracing::{debug, instrument};

mod execution_graph;

pub use execution_graph::StepExecutionGraph;

/// Turns a resolved context into the executable graph of a pipeline.
/// ---
/// Synthesis is pure: the same context always produces the same graph.
#[derive(Debug, Clone, Default)]
pub struct GraphSynthesizer {
    retry: StepRetryPolicy,
}

impl GraphSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(skip_all, fields(job = %context.job.name, environment = %context.environment))]
    pub fn synthesize(&self, context: &ResolvedContext) -> Result<PipelineGraph, Error> {
        let job = &context.job;
        let fail = |field: &str, message: &str| Error::GraphBuild {
            job: job.name.clone(),
            field: field.to_string(),
            message: message.to_string(),
        };

        check_image_reference(&context.image_reference).map_err(|m| fail("image", m))?;

        if context.compute_location.trim().is_empty() {
            return Err(fail("location", "compute location is empty"));
        }
        if job.compute.cpu.millicores() == 0 {
            return Err(fail("compute.cpu", "cpu request must be positive"));
        }
        if job.compute.memory.bytes() == 0 {
            return Err(fail("compute.memory", "memory request must be positive"));
        }
        if job
            .compute
            .timeout
            .as_ref()
            .is_some_and(|t| t.duration().is_zero())
        {
            return Err(fail("compute.timeout", "timeout must be positive"));
        }

        let step = Step {
            id: format!("{}-task", job.name),
            image: context.image_reference.clone(),
            args: step_arguments(context),
            resources: ResourceRequest {
                cpu: job.compute.cpu.clone(),
                memory: job.compute.memory.clone(),
                timeout: job.compute.timeout.clone(),
            },
            retry: self.retry.clone(),
            depends_on: Vec::new(),
        };

        let graph = PipelineGraph {
            name: context.submission_key().pipeline_name(),
            description: job.pipeline_description(),
            environment: context.environment,
            location: context.compute_location.clone(),
            steps: vec![step],
        };

        let execution = StepExecutionGraph::new(&graph)?;
        debug!(
            steps = graph.steps.len(),
            order = ?execution.topological_order(),
            "Synthesized pipeline graph"
        );

        Ok(graph)
    }
}

/// `--key value` pairs in parameter order, with `_` in keys turned into `-`.
fn step_arguments(context: &ResolvedContext) -> Vec<String> {
    context
        .job
        .parameters
        .iter()
        .filter(|(key, _)| key.as_str() != IMAGE_PARAMETER)
        .flat_map(|(key, value)| [format!("--{}", key.replace('_', "-")), value.clone()])
        .collect()
}

fn check_image_reference(reference: &str) -> Result<(), &'static str> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err("image reference is empty");
    }

    let repo_start = reference.rfind('/').map_or(0, |idx| idx + 1);
    let last_segment = &reference[repo_start..];
    let tagged = last_segment
        .split_once(':')
        .is_some_and(|(_, tag)| !tag.is_empty());
    let pinned = reference.contains("@sha256:");

    if !tagged && !pinned {
        return Err("image reference has no tag");
    }
    Ok(())
}
