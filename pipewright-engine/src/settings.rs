use std::path::{Path, PathBuf};

use pipewright_common::error::Error;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{gate::GateSettings, submission::RetryPolicy};

pub const SETTINGS_FILE: &str = "pipewright.yaml";

/// Workspace settings read from `pipewright.yaml`.
/// ---
/// Every field is optional; a missing file yields the defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Directory holding one sub-directory per job.
    pub jobs_dir: PathBuf,
    pub approvals_file: PathBuf,
    pub gate: GateSettings,
    pub retry: RetryPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from("etls"),
            approvals_file: PathBuf::from("approvals.yaml"),
            gate: GateSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self, Error> {
        if !path.exists() {
            debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| Error::io(path.display(), e))?;
        Self::from_yaml(&contents)
            .map_err(|e| Error::Settings(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Resolves relative paths against `base`, the directory of the settings file.
    pub fn relative_to(mut self, base: &Path) -> Self {
        if self.jobs_dir.is_relative() {
            self.jobs_dir = base.join(&self.jobs_dir);
        }
        if self.approvals_file.is_relative() {
            self.approvals_file = base.join(&self.approvals_file);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::GatePolicy;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join(SETTINGS_FILE)).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(!settings.gate.dev.requires_approval);
        assert!(settings.gate.prod.requires_approval);
    }

    #[test]
    fn test_partial_settings() {
        let settings = Settings::from_yaml(
            r#"
jobs_dir: pipelines/etls
gate:
  prod:
    reviewers: [maria, jose]
retry:
  max_attempts: 6
"#,
        )
        .unwrap();

        assert_eq!(settings.jobs_dir, PathBuf::from("pipelines/etls"));
        assert_eq!(settings.gate.prod.reviewers, vec!["maria", "jose"]);
        assert!(settings.gate.prod.requires_approval);
        assert_eq!(settings.gate.dev, GatePolicy::open());
        assert_eq!(settings.retry.max_attempts, 6);
        assert_eq!(settings.retry.base_delay_ms, 500);
    }

    #[test]
    fn test_partial_dev_policy_stays_open() {
        let settings = Settings::from_yaml(
            r#"
gate:
  dev:
    allowed_actors: [ci]
"#,
        )
        .unwrap();

        assert!(!settings.gate.dev.requires_approval);
        assert_eq!(settings.gate.dev.allowed_actors, vec!["ci"]);
        assert_eq!(settings.gate.prod, GatePolicy::protected());
    }

    #[test]
    fn test_unknown_gate_keys_are_rejected() {
        let result = Settings::from_yaml(
            r#"
gate:
  dev:
    require_approval: true
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "job_dir: etls\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(Error::Settings(_))));
    }

    #[test]
    fn test_relative_paths() {
        let settings = Settings::default().relative_to(Path::new("/work/repo"));
        assert_eq!(settings.jobs_dir, PathBuf::from("/work/repo/etls"));
        assert_eq!(settings.approvals_file, PathBuf::from("/work/repo/approvals.yaml"));
    }
}
