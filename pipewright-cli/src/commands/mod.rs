pub mod build;
pub mod compile;
pub mod deploy;
pub mod list;
pub mod validate;

use std::path::{Path, PathBuf};

use pipewright_common::{environment::Environment, error::Error};
use pipewright_engine::{Configuration, Settings};
use pipewright_registry::JobRegistry;
use tracing::debug;

/// Job and environment a command acts on.
#[derive(Debug, Clone)]
pub struct Target {
    pub job: String,
    pub environment: Environment,

    /// Explicit dotenv file; `.env.<environment>` next to the settings otherwise.
    pub env_file: Option<PathBuf>,
}

/// Settings of the working copy, with paths resolved against its root.
pub struct Workspace {
    pub root: PathBuf,
    pub settings: Settings,
}

impl Workspace {
    pub fn load(config: &Path) -> Result<Self, Error> {
        let root = match config.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let settings = Settings::load(config)?.relative_to(&root);
        Ok(Self { root, settings })
    }

    pub fn registry(&self) -> JobRegistry {
        JobRegistry::new(&self.settings.jobs_dir)
    }

    /// Reads the configuration of the target environment from its dotenv
    /// file and the `DEV_`/`PROD_` prefixed process variables.
    pub fn configuration(&self, target: &Target) -> Result<Configuration, Error> {
        let env_file = match &target.env_file {
            Some(path) => Some(path.clone()),
            None => {
                let default = self.root.join(format!(".env.{}", target.environment));
                default.is_file().then_some(default)
            }
        };

        if let Some(path) = &env_file {
            debug!(path = %path.display(), "Reading environment file");
        }

        Configuration::load(target.environment, env_file.as_deref(), std::env::vars())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pipewright_engine::ConfigKey;

    use super::*;

    #[test]
    fn test_workspace_resolves_paths_against_settings_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("pipewright.yaml");
        fs::write(&config, "jobs_dir: jobs\n").unwrap();

        let workspace = Workspace::load(&config).unwrap();
        assert_eq!(workspace.settings.jobs_dir, dir.path().join("jobs"));
        assert_eq!(workspace.registry().root(), dir.path().join("jobs"));
    }

    #[test]
    fn test_default_env_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(".env.prod"), "PROJECT_ID=acme-prod\n").unwrap();

        let workspace = Workspace::load(&dir.path().join("pipewright.yaml")).unwrap();
        let configuration = workspace
            .configuration(&Target {
                job: "sinadef-analysis".to_string(),
                environment: Environment::Prod,
                env_file: None,
            })
            .unwrap();

        assert_eq!(configuration.environment(), Environment::Prod);
        assert_eq!(configuration.get(ConfigKey::ProjectId), Some("acme-prod"));
    }

    #[test]
    fn test_explicit_env_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::load(&dir.path().join("pipewright.yaml")).unwrap();
        let result = workspace.configuration(&Target {
            job: "sinadef-analysis".to_string(),
            environment: Environment::Dev,
            env_file: Some(dir.path().join("missing.env")),
        });
        assert!(matches!(result, Err(Error::Settings(_))));
    }
}
