use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ComputeSpec, CronSchedule};

/// Validated declarative description of one job.
/// ---
/// Built by the registry from `resources/config.yaml` and never mutated
/// afterwards; the resolver produces a new descriptor with placeholders
/// substituted rather than editing this one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    /// Unique key of the job; equals its directory name.
    pub name: String,
    pub description: Option<String>,
    pub schedule: CronSchedule,
    pub compute: ComputeSpec,

    /// Container arguments, keyed by parameter name.
    /// Values may hold `{{KEY}}` placeholders until resolved.
    pub parameters: BTreeMap<String, String>,
}

impl JobDescriptor {
    /// Description used for the pipeline, falling back to a generated one.
    pub fn pipeline_description(&self) -> String {
        self.description
            .clone()
            .unwrap_or_else(|| format!("ETL Pipeline for {}", self.name))
    }
}
