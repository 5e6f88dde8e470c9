use crate::{
    environment::Environment, job::JobDescriptor, pipeline::SubmissionKey, secret::Sensitive,
};

/// A job descriptor merged with the configuration of one environment.
/// ---
/// Every field is fully resolved: no `{{KEY}}` placeholder survives in
/// `job.parameters`, and identity values come only from the environment's own
/// configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedContext {
    pub environment: Environment,

    /// The descriptor with parameters substituted.
    pub job: JobDescriptor,

    pub project_identity: String,
    pub compute_location: String,
    pub service_identity: Sensitive<String>,

    /// Storage root for pipeline artifacts and run outputs (`gs://bucket/pipelines`).
    pub artifact_location: String,

    /// Registry prefix images are pulled from (`gcr.io/project`).
    pub registry_location: String,

    pub image_reference: String,
}

impl ResolvedContext {
    pub fn submission_key(&self) -> SubmissionKey {
        SubmissionKey::new(self.job.name.clone(), self.environment)
    }

    /// Replaces the tag of the image reference, keeping registry and repository.
    pub fn pin_image_tag(mut self, tag: &str) -> Self {
        let repo_start = self.image_reference.rfind('/').map_or(0, |idx| idx + 1);
        let untagged = match self.image_reference[repo_start..].find(':') {
            Some(idx) => &self.image_reference[..repo_start + idx],
            None => self.image_reference.as_str(),
        };
        self.image_reference = format!("{}:{}", untagged, tag);
        self
    }

    /// Targets an explicit, externally built image.
    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        self.image_reference = reference.into();
        self
    }
}
