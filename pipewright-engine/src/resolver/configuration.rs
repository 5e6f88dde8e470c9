use std::{collections::BTreeMap, collections::HashMap, fmt, path::Path};

use pipewright_common::{environment::Environment, error::Error, secret::Sensitive};
use strum::IntoEnumIterator;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Placeholder name that expands to the environment itself (`dev` / `prod`).
pub const ENVIRONMENT_PLACEHOLDER: &str = "ENVIRONMENT";

/// Environment-scoped keys every deployment needs.
/// Declaration order is the order in which absence is reported.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display, EnumIter, AsRefStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigKey {
    ProjectId,
    Region,
    ServiceAccount,
    Bucket,
    ContainerRegistry,
    ContainerRegistryProject,
}

impl ConfigKey {
    /// Older variable names still found in CI secrets (`GCP_PROJECT_ID`).
    pub fn legacy_name(&self) -> Option<&'static str> {
        match self {
            ConfigKey::ProjectId => Some("GCP_PROJECT_ID"),
            ConfigKey::Region => Some("GCP_REGION"),
            ConfigKey::ServiceAccount => Some("GCP_SERVICE_ACCOUNT"),
            ConfigKey::Bucket => Some("GCP_BUCKET"),
            ConfigKey::ContainerRegistry | ConfigKey::ContainerRegistryProject => None,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        ConfigKey::iter().find(|key| key.as_ref() == name || key.legacy_name() == Some(name))
    }
}

/// Configuration of exactly one environment.
/// ---
/// Built once at the edge of the program and passed down explicitly; nothing
/// below the CLI reads process state. Values are kept in [`Sensitive`] so a
/// stray `{:?}` never prints an identity.
#[derive(Clone)]
pub struct Configuration {
    environment: Environment,
    values: BTreeMap<ConfigKey, Sensitive<String>>,
}

impl Configuration {
    /// Builds a configuration from variables already scoped to `environment`.
    /// Canonical names win over legacy aliases; empty values count as absent.
    pub fn from_vars<I, K, V>(environment: Environment, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let scoped: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_string(), v.into()))
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();

        let mut values = BTreeMap::new();
        for key in ConfigKey::iter() {
            let value = scoped
                .get(key.as_ref())
                .or_else(|| key.legacy_name().and_then(|name| scoped.get(name)));

            if let Some(value) = value {
                values.insert(key, Sensitive::new(value.trim().to_string()));
            }
        }

        Self {
            environment,
            values,
        }
    }

    /// Merges an environment file (plain names) with process variables
    /// carrying the environment prefix (`PROD_BUCKET`). Process variables win.
    pub fn from_sources<F, P>(environment: Environment, file_vars: F, process_vars: P) -> Self
    where
        F: IntoIterator<Item = (String, String)>,
        P: IntoIterator<Item = (String, String)>,
    {
        let prefix = environment.variable_prefix();
        let mut merged: HashMap<String, String> = file_vars.into_iter().collect();

        for (name, value) in process_vars {
            let Some(key) = name.strip_prefix(prefix).and_then(ConfigKey::from_name) else {
                continue;
            };
            if !value.trim().is_empty() {
                // Always under the canonical name.
                merged.insert(key.as_ref().to_string(), value);
            }
        }

        Self::from_vars(environment, merged)
    }

    /// Reads `env_file` (when given) and overlays the prefixed process variables.
    pub fn load<P>(environment: Environment, env_file: Option<&Path>, process_vars: P) -> Result<Self, Error>
    where
        P: IntoIterator<Item = (String, String)>,
    {
        let mut file_vars = Vec::new();

        if let Some(path) = env_file {
            let iter = dotenvy::from_path_iter(path).map_err(|e| {
                Error::Settings(format!("Failed to read env file {}: {}", path.display(), e))
            })?;

            for item in iter {
                let pair = item.map_err(|e| {
                    Error::Settings(format!("Invalid entry in env file {}: {}", path.display(), e))
                })?;
                file_vars.push(pair);
            }
        }

        Ok(Self::from_sources(environment, file_vars, process_vars))
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn get(&self, key: ConfigKey) -> Option<&str> {
        self.values.get(&key).map(|v| v.expose().as_str())
    }

    /// Fails with `MissingConfiguration` naming `key` when it is absent.
    pub fn require(&self, key: ConfigKey, required_by: &str) -> Result<&str, Error> {
        self.get(key).ok_or_else(|| Error::MissingConfiguration {
            environment: self.environment,
            key: key.to_string(),
            required_by: required_by.to_string(),
        })
    }

    /// Value a `{{name}}` placeholder expands to, if `name` is known.
    pub fn placeholder_value(&self, name: &str) -> Option<String> {
        if name == ENVIRONMENT_PLACEHOLDER {
            return Some(self.environment.to_string());
        }

        ConfigKey::from_name(name)
            .and_then(|key| self.get(key))
            .map(str::to_string)
    }

    /// Registry prefix images live under (`gcr.io/acme-dev`).
    pub fn registry_location(&self) -> Result<String, Error> {
        let registry = self.require(ConfigKey::ContainerRegistry, "container image location")?;
        let project = self.require(ConfigKey::ContainerRegistryProject, "container image location")?;
        Ok(format!("{}/{}", registry.trim_end_matches('/'), project))
    }

    /// Image reference for `job` at `tag`; registry and repository are lowercased.
    pub fn image_for(&self, job: &str, tag: &str) -> Result<String, Error> {
        let repository = format!("{}/{}", self.registry_location()?, job).to_lowercase();
        Ok(format!("{}:{}", repository, tag))
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("environment", &self.environment)
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_from_vars_reads_canonical_and_legacy_names() {
        let config = Configuration::from_vars(
            Environment::Dev,
            vars(&[
                ("PROJECT_ID", "acme-dev"),
                ("GCP_PROJECT_ID", "ignored"),
                ("GCP_BUCKET", "acme-dev-pipes"),
                ("REGION", "  "),
            ]),
        );

        assert_eq!(config.get(ConfigKey::ProjectId), Some("acme-dev"));
        assert_eq!(config.get(ConfigKey::Bucket), Some("acme-dev-pipes"));
        assert_eq!(config.get(ConfigKey::Region), None);
    }

    #[test]
    fn test_require_names_missing_key() {
        let config = Configuration::from_vars(Environment::Prod, Vec::<(String, String)>::new());
        match config.require(ConfigKey::Bucket, "artifact location") {
            Err(Error::MissingConfiguration {
                environment, key, ..
            }) => {
                assert_eq!(environment, Environment::Prod);
                assert_eq!(key, "BUCKET");
            }
            other => panic!("expected missing configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_from_sources_only_reads_own_prefix() {
        let config = Configuration::from_sources(
            Environment::Prod,
            vars(&[("BUCKET", "from-file"), ("REGION", "europe-west1")]),
            vars(&[
                ("PROD_BUCKET", "acme-prod-pipes"),
                ("DEV_REGION", "us-central1"),
                ("PROD_UNRELATED", "x"),
            ]),
        );

        assert_eq!(config.get(ConfigKey::Bucket), Some("acme-prod-pipes"));
        assert_eq!(config.get(ConfigKey::Region), Some("europe-west1"));
    }

    #[test]
    fn test_legacy_prefixed_variable_overrides_file() {
        let config = Configuration::from_sources(
            Environment::Prod,
            vars(&[("BUCKET", "from-file")]),
            vars(&[("PROD_GCP_BUCKET", "from-process")]),
        );

        assert_eq!(config.get(ConfigKey::Bucket), Some("from-process"));
    }

    #[test]
    fn test_load_reads_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "PROJECT_ID=acme-dev").unwrap();
        writeln!(file, "CONTAINER_REGISTRY=gcr.io").unwrap();
        writeln!(file, "CONTAINER_REGISTRY_PROJECT=Acme-Dev").unwrap();

        let config = Configuration::load(Environment::Dev, Some(file.path()), Vec::new()).unwrap();
        assert_eq!(config.get(ConfigKey::ProjectId), Some("acme-dev"));
        assert_eq!(
            config.image_for("myfirstETL", "v2").unwrap(),
            "gcr.io/acme-dev/myfirstetl:v2"
        );
    }

    #[test]
    fn test_load_missing_env_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Configuration::load(
            Environment::Dev,
            Some(&dir.path().join(".env.dev")),
            Vec::new(),
        );
        assert!(matches!(result, Err(Error::Settings(_))));
    }

    #[test]
    fn test_placeholder_values() {
        let config = Configuration::from_vars(Environment::Dev, vars(&[("BUCKET", "acme-pipes")]));
        assert_eq!(config.placeholder_value("BUCKET").as_deref(), Some("acme-pipes"));
        assert_eq!(config.placeholder_value("GCP_BUCKET").as_deref(), Some("acme-pipes"));
        assert_eq!(config.placeholder_value("ENVIRONMENT").as_deref(), Some("dev"));
        assert_eq!(config.placeholder_value("REGION"), None);
        assert_eq!(config.placeholder_value("HOME"), None);
    }

    #[test]
    fn test_debug_hides_values() {
        let config = Configuration::from_vars(
            Environment::Dev,
            vars(&[("SERVICE_ACCOUNT", "runner@acme-dev.iam.gserviceaccount.com")]),
        );
        let rendered = format!("{:?}", config);
        assert!(rendered.contains("ServiceAccount"));
        assert!(!rendered.contains("runner@"));
    }
}
