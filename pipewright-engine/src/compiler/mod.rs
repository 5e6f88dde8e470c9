use std::collections::BTreeMap;

use pipewright_common::{
    error::Error,
    pipeline::{
        ComponentRef, ComponentSpec, ContainerResources, ContainerSpec, DagSpec, DeploymentSpec,
        ExecutorSpec, PipelineArtifact, PipelineGraph, PipelineInfoSpec, RootSpec, TaskInfo,
        TaskRetryPolicy, TaskSpec,
    },
};
use tracing::instrument;

use crate::synth::StepExecutionGraph;

pub const SCHEMA_VERSION: &str = "2.1.0";
pub const SDK_VERSION: &str = concat!("pipewright-", env!("CARGO_PKG_VERSION"));

const MAX_LABEL_LEN: usize = 63;

/// Compiles a pipeline graph into the artifact the execution service stores.
/// ---
/// Output is deterministic: task, component and executor maps are keyed by
/// sanitized step ids and serialized in sorted order.
#[instrument(skip_all, fields(pipeline = %graph.name))]
pub fn compile(graph: &PipelineGraph, pipeline_root: &str) -> Result<PipelineArtifact, Error> {
    let execution = StepExecutionGraph::new(graph)?;

    let mut tasks = BTreeMap::new();
    let mut components = BTreeMap::new();
    let mut executors = BTreeMap::new();

    for step_id in execution.topological_order() {
        let Some(step) = execution.step(step_id) else {
            return Err(Error::Internal(format!(
                "step '{}' vanished from the execution graph",
                step_id
            )));
        };

        let task_name = sanitize_label(&step.id);
        let component_name = format!("comp-{}", task_name);
        let executor_label = format!("exec-{}", task_name);

        if tasks.contains_key(&task_name) {
            return Err(Error::GraphBuild {
                job: graph.name.clone(),
                field: "steps".to_string(),
                message: format!("step ids collide after sanitizing: '{}'", task_name),
            });
        }

        tasks.insert(
            task_name.clone(),
            TaskSpec {
                task_info: TaskInfo {
                    name: task_name.clone(),
                },
                component_ref: ComponentRef {
                    name: component_name.clone(),
                },
                dependent_tasks: execution
                    .dependencies_of(step_id)
                    .into_iter()
                    .map(sanitize_label)
                    .collect(),
                retry_policy: TaskRetryPolicy {
                    max_retry_count: step.retry.max_retries,
                    backoff_duration: format!("{}s", step.retry.backoff.as_secs()),
                    backoff_factor: step.retry.backoff_factor,
                },
                timeout: step
                    .resources
                    .timeout
                    .as_ref()
                    .map(|t| format!("{}s", t.duration().as_secs())),
            },
        );

        components.insert(
            component_name,
            ComponentSpec {
                executor_label: executor_label.clone(),
            },
        );

        executors.insert(
            executor_label,
            ExecutorSpec {
                container: ContainerSpec {
                    image: step.image.clone(),
                    args: step.args.clone(),
                    resources: ContainerResources {
                        cpu_limit: step.resources.cpu.cores(),
                        memory_limit: step.resources.memory.gigabytes(),
                        resource_cpu_limit: step.resources.cpu.to_string(),
                        resource_memory_limit: step.resources.memory.to_string(),
                    },
                },
            },
        );
    }

    Ok(PipelineArtifact {
        pipeline_info: PipelineInfoSpec {
            name: sanitize_label(&graph.name),
            description: graph.description.clone(),
        },
        schema_version: SCHEMA_VERSION.to_string(),
        sdk_version: SDK_VERSION.to_string(),
        default_pipeline_root: pipeline_root.to_string(),
        root: RootSpec {
            dag: DagSpec { tasks },
        },
        components,
        deployment_spec: DeploymentSpec { executors },
    })
}

/// Pretty JSON form of an artifact, as written by `compile`.
pub fn to_json(artifact: &PipelineArtifact) -> Result<String, Error> {
    Ok(serde_json::to_string_pretty(artifact)?)
}

/// Lowercase `[a-z0-9-]` label, at most 63 characters, no leading or trailing dash.
pub fn sanitize_label(value: &str) -> String {
    let mut label = String::with_capacity(value.len());
    for c in value.chars() {
        let c = c.to_ascii_lowercase();
        if c.is_ascii_alphanumeric() {
            label.push(c);
        } else if !label.ends_with('-') {
            label.push('-');
        }
    }

    let trimmed: String = label
        .trim_matches('-')
        .chars()
        .take(MAX_LABEL_LEN)
        .collect();
    trimmed.trim_end_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pipewright_common::{
        environment::Environment,
        job::{CpuQuantity, MemoryQuantity, TimeoutSpec},
        pipeline::{ResourceRequest, Step, StepRetryPolicy},
    };

    use super::*;

    fn graph() -> PipelineGraph {
        PipelineGraph {
            name: "sinadef-analysis-prod".to_string(),
            description: "ETL Pipeline for sinadef-analysis".to_string(),
            environment: Environment::Prod,
            location: "us-central1".to_string(),
            steps: vec![Step {
                id: "sinadef-analysis-task".to_string(),
                image: "gcr.io/acme-prod/sinadef-analysis:v3".to_string(),
                args: vec!["--output-path".to_string(), "gs://acme-pipes/out.csv".to_string()],
                resources: ResourceRequest {
                    cpu: CpuQuantity::parse("4").unwrap(),
                    memory: MemoryQuantity::parse("16Gi").unwrap(),
                    timeout: Some(TimeoutSpec::parse("2h").unwrap()),
                },
                retry: StepRetryPolicy {
                    max_retries: 2,
                    backoff: Duration::from_secs(60),
                    backoff_factor: 2.0,
                },
                depends_on: Vec::new(),
            }],
        }
    }

    #[test]
    fn test_compile_single_step() {
        let artifact = compile(&graph(), "gs://acme-pipes/pipelines").unwrap();

        assert_eq!(artifact.pipeline_info.name, "sinadef-analysis-prod");
        assert_eq!(artifact.default_pipeline_root, "gs://acme-pipes/pipelines");
        assert_eq!(artifact.schema_version, SCHEMA_VERSION);

        let task = &artifact.root.dag.tasks["sinadef-analysis-task"];
        assert_eq!(task.component_ref.name, "comp-sinadef-analysis-task");
        assert_eq!(task.retry_policy.max_retry_count, 2);
        assert_eq!(task.retry_policy.backoff_duration, "60s");
        assert_eq!(task.timeout.as_deref(), Some("7200s"));

        let component = &artifact.components["comp-sinadef-analysis-task"];
        let executor = &artifact.deployment_spec.executors[&component.executor_label];
        assert_eq!(executor.container.image, "gcr.io/acme-prod/sinadef-analysis:v3");
        assert_eq!(executor.container.resources.cpu_limit, 4.0);
        assert_eq!(executor.container.resources.resource_memory_limit, "16Gi");
    }

    #[test]
    fn test_json_is_stable_and_camel_case() {
        let first = to_json(&compile(&graph(), "gs://b/pipelines").unwrap()).unwrap();
        let second = to_json(&compile(&graph(), "gs://b/pipelines").unwrap()).unwrap();
        assert_eq!(first, second);
        assert!(first.contains("\"pipelineInfo\""));
        assert!(first.contains("\"deploymentSpec\""));
        assert!(!first.contains("dependentTasks"));
    }

    #[test]
    fn test_dependencies_are_compiled() {
        let mut g = graph();
        let mut second = g.steps[0].clone();
        second.id = "Publish_Report".to_string();
        second.depends_on = vec!["sinadef-analysis-task".to_string()];
        g.steps.push(second);

        let artifact = compile(&g, "gs://b/pipelines").unwrap();
        assert_eq!(
            artifact.root.dag.tasks["publish-report"].dependent_tasks,
            vec!["sinadef-analysis-task"]
        );
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("myFirstETL_task"), "myfirstetl-task");
        assert_eq!(sanitize_label("--a..b--"), "a-b");
        assert_eq!(sanitize_label(&"x".repeat(80)).len(), 63);
    }
}
