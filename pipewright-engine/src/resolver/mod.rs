use std::collections::BTreeMap;

use pipewright_common::{
    context::ResolvedContext,
    error::{Error, ValidationIssue},
    job::JobDescriptor,
    secret::Sensitive,
};
use strum::IntoEnumIterator;
use tracing::{debug, instrument};

mod configuration;
pub mod template;

pub use configuration::{ConfigKey, Configuration, ENVIRONMENT_PLACEHOLDER};
use template::TemplateError;

/// Tag the default image reference points at until a deploy pins one.
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Merges a job descriptor with the configuration of one environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigResolver;

impl ConfigResolver {
    pub fn new() -> Self {
        Self
    }

    /// Produces a fully resolved context or fails without partial output.
    /// ---
    /// Every required key is checked before anything is substituted, so a
    /// missing value is always reported under its own name regardless of
    /// which parameters reference it.
    #[instrument(skip_all, fields(job = %descriptor.name, environment = %configuration.environment()))]
    pub fn resolve(
        &self,
        descriptor: &JobDescriptor,
        configuration: &Configuration,
    ) -> Result<ResolvedContext, Error> {
        for key in ConfigKey::iter() {
            configuration.require(key, "deployment context")?;
        }

        let mut parameters = BTreeMap::new();
        for (name, value) in &descriptor.parameters {
            let resolved = template::substitute(value, |placeholder| {
                configuration.placeholder_value(placeholder)
            })
            .map_err(|e| match e {
                TemplateError::Unknown(placeholder) => Error::MissingConfiguration {
                    environment: configuration.environment(),
                    key: placeholder,
                    required_by: format!("parameters.{}", name),
                },
                TemplateError::Unterminated => Error::Validation {
                    job: descriptor.name.clone(),
                    issues: vec![ValidationIssue::new(
                        format!("parameters.{}", name),
                        "unterminated '{{' placeholder",
                    )]
                    .into(),
                },
            })?;

            parameters.insert(name.clone(), resolved);
        }

        let bucket = configuration.require(ConfigKey::Bucket, "artifact location")?;
        let context = ResolvedContext {
            environment: configuration.environment(),
            job: JobDescriptor {
                parameters,
                ..descriptor.clone()
            },
            project_identity: configuration
                .require(ConfigKey::ProjectId, "deployment context")?
                .to_string(),
            compute_location: configuration
                .require(ConfigKey::Region, "deployment context")?
                .to_string(),
            service_identity: Sensitive::new(
                configuration
                    .require(ConfigKey::ServiceAccount, "deployment context")?
                    .to_string(),
            ),
            artifact_location: format!("gs://{}/pipelines", bucket),
            registry_location: configuration.registry_location()?,
            image_reference: configuration.image_for(&descriptor.name, DEFAULT_IMAGE_TAG)?,
        };

        debug!(
            parameters = context.job.parameters.len(),
            image = %context.image_reference,
            "Resolved job context"
        );
        Ok(context)
    }
}
