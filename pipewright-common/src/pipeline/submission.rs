use std::fmt;

use serde::{Deserialize, Serialize};

use crate::environment::Environment;

/// Identity of a deployment on the execution service.
/// ---
/// Submitting twice under the same key updates the existing pipeline and
/// schedule in place. Every remote name is derived from this value so the
/// lookup and the create/update always agree.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubmissionKey {
    pub job_name: String,
    pub environment: Environment,
}

impl SubmissionKey {
    pub fn new(job_name: impl Into<String>, environment: Environment) -> Self {
        Self {
            job_name: job_name.into(),
            environment,
        }
    }

    /// Name the compiled pipeline is stored under (`sinadef-analysis-dev`).
    pub fn pipeline_name(&self) -> String {
        format!("{}-{}", self.job_name, self.environment)
    }

    /// Display name of the schedule (`sinadef-analysis-schedule-dev`).
    pub fn schedule_name(&self) -> String {
        format!("{}-schedule-{}", self.job_name, self.environment)
    }
}

impl fmt::Display for SubmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.job_name, self.environment)
    }
}

/// Result of a successful submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionOutcome {
    pub key: SubmissionKey,
    pub pipeline_id: String,
    pub schedule_id: String,

    /// Whether an existing pipeline or schedule was updated in place.
    pub replaced: bool,

    /// Run launched as part of the submission, if one was requested.
    pub run_id: Option<String>,
}
