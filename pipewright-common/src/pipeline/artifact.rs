use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Pipeline spec in the execution service's native (KFP IR) shape.
/// ---
/// All maps are ordered so the serialized artifact is byte-for-byte stable
/// for a given graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineArtifact {
    pub pipeline_info: PipelineInfoSpec,
    pub schema_version: String,
    pub sdk_version: String,
    pub default_pipeline_root: String,
    pub root: RootSpec,
    pub components: BTreeMap<String, ComponentSpec>,
    pub deployment_spec: DeploymentSpec,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineInfoSpec {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootSpec {
    pub dag: DagSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DagSpec {
    pub tasks: BTreeMap<String, TaskSpec>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub task_info: TaskInfo,
    pub component_ref: ComponentRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependent_tasks: Vec<String>,
    pub retry_policy: TaskRetryPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRef {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRetryPolicy {
    pub max_retry_count: u32,
    pub backoff_duration: String,
    pub backoff_factor: f64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSpec {
    pub executor_label: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DeploymentSpec {
    pub executors: BTreeMap<String, ExecutorSpec>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutorSpec {
    pub container: ContainerSpec,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub args: Vec<String>,
    pub resources: ContainerResources,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerResources {
    pub cpu_limit: f64,
    /// Decimal gigabytes.
    pub memory_limit: f64,
    pub resource_cpu_limit: String,
    pub resource_memory_limit: String,
}
