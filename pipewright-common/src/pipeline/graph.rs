use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    environment::Environment,
    job::{CpuQuantity, MemoryQuantity, TimeoutSpec},
};

/// Ordered steps of one pipeline, as submitted to the execution service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineGraph {
    pub name: String,
    pub description: String,
    pub environment: Environment,

    /// Region every step executes in.
    pub location: String,

    /// Steps in dependency order; a step only depends on earlier steps.
    pub steps: Vec<Step>,
}

impl PipelineGraph {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.id == id)
    }
}

/// A single containerized unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,

    /// Fully qualified image the service pulls before running the step.
    pub image: String,

    /// Invocation arguments passed to the container entrypoint.
    pub args: Vec<String>,

    pub resources: ResourceRequest,
    pub retry: StepRetryPolicy,

    /// Ids of steps that must succeed before this one starts.
    pub depends_on: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub cpu: CpuQuantity,
    pub memory: MemoryQuantity,
    pub timeout: Option<TimeoutSpec>,
}

/// Retry behavior the execution service applies to a failed step run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepRetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
    pub backoff_factor: f64,
}

impl Default for StepRetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff: Duration::from_secs(60),
            backoff_factor: 2.0,
        }
    }
}
