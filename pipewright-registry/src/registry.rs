use std::path::{Path, PathBuf};

use pipewright_common::{
    error::{Error, ValidationIssues},
    job::JobDescriptor,
};
use tracing::{debug, instrument, warn};

use crate::{parse_yaml, validate_descriptor};

/// Location of a job's descriptor, relative to its directory.
pub const DESCRIPTOR_FILE: &str = "resources/config.yaml";

/// Discovers jobs under a root directory (`etls/<job>/resources/config.yaml`).
/// ---
/// All operations are pure reads of the filesystem.
#[derive(Debug, Clone)]
pub struct JobRegistry {
    root: PathBuf,
}

impl JobRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_dir(&self, job: &str) -> PathBuf {
        self.root.join(job)
    }

    pub fn descriptor_path(&self, job: &str) -> PathBuf {
        self.job_dir(job).join(DESCRIPTOR_FILE)
    }

    /// Names of all jobs that carry a descriptor, sorted.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn list_jobs(&self) -> Result<Vec<String>, Error> {
        let jobs: Vec<String> = self
            .job_directories()?
            .into_iter()
            .filter(|job| self.descriptor_path(job).is_file())
            .collect();

        debug!(count = jobs.len(), "Discovered jobs");
        Ok(jobs)
    }

    /// Loads and validates the descriptor of `job`.
    #[instrument(skip(self))]
    pub fn load_descriptor(&self, job: &str) -> Result<JobDescriptor, Error> {
        if !is_plain_name(job) {
            let mut issues = ValidationIssues::new();
            issues.push("name", "job names cannot contain path separators or start with '.'");
            return Err(Error::Validation {
                job: job.to_string(),
                issues,
            });
        }

        let path = self.descriptor_path(job);
        if !path.is_file() {
            return Err(Error::NotFound {
                resource_type: "job descriptor".to_string(),
                resource_id: path.display().to_string(),
            });
        }

        let contents =
            std::fs::read_to_string(&path).map_err(|e| Error::io(path.display(), e))?;

        let document = parse_yaml(&contents).map_err(|issue| Error::Validation {
            job: job.to_string(),
            issues: vec![issue].into(),
        })?;

        validate_descriptor(job, document)
    }

    /// Validates every job directory, including ones without a descriptor.
    /// Returns one result per directory, sorted by name.
    pub fn validate_all(&self) -> Result<Vec<(String, Result<JobDescriptor, Error>)>, Error> {
        let results = self
            .job_directories()?
            .into_iter()
            .map(|job| {
                let result = self.load_descriptor(&job);
                if let Err(e) = &result {
                    warn!(job = %job, error = %e, "Invalid job");
                }
                (job, result)
            })
            .collect();

        Ok(results)
    }

    fn job_directories(&self) -> Result<Vec<String>, Error> {
        if !self.root.is_dir() {
            return Err(Error::NotFound {
                resource_type: "jobs directory".to_string(),
                resource_id: self.root.display().to_string(),
            });
        }

        let entries =
            std::fs::read_dir(&self.root).map_err(|e| Error::io(self.root.display(), e))?;

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(self.root.display(), e))?;
            if !entry.path().is_dir() {
                continue;
            }

            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                warn!(path = %entry.path().display(), "Skipping non UTF-8 job directory");
                continue;
            };

            if !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}

fn is_plain_name(job: &str) -> bool {
    !job.is_empty() && !job.starts_with('.') && !job.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    const SINADEF: &str = r#"
name: sinadef-analysis
schedule: "0 9 * * *"
compute:
  cpu: "4"
  memory: 16Gi
parameters:
  output_path: "gs://{{BUCKET}}/data/homicidios_detallado.csv"
"#;

    fn write_job(root: &Path, job: &str, descriptor: Option<&str>) {
        let resources = root.join(job).join("resources");
        fs::create_dir_all(&resources).unwrap();
        if let Some(contents) = descriptor {
            fs::write(resources.join("config.yaml"), contents).unwrap();
        }
    }

    #[test]
    fn test_list_jobs_skips_hidden_and_incomplete_directories() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "sinadef-analysis", Some(SINADEF));
        write_job(dir.path(), "myfirstETL", Some("name: myfirstETL\n"));
        write_job(dir.path(), "scratch", None);
        write_job(dir.path(), ".template", Some(SINADEF));
        fs::write(dir.path().join("README.md"), "jobs").unwrap();

        let registry = JobRegistry::new(dir.path());
        assert_eq!(
            registry.list_jobs().unwrap(),
            vec!["myfirstETL".to_string(), "sinadef-analysis".to_string()]
        );
    }

    #[test]
    fn test_missing_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path().join("etls"));
        assert!(matches!(registry.list_jobs(), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_load_descriptor() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "sinadef-analysis", Some(SINADEF));

        let registry = JobRegistry::new(dir.path());
        let descriptor = registry.load_descriptor("sinadef-analysis").unwrap();
        assert_eq!(descriptor.name, "sinadef-analysis");
        assert_eq!(descriptor.compute.cpu.as_str(), "4");
    }

    #[test]
    fn test_load_unknown_job_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path());
        assert!(matches!(
            registry.load_descriptor("nope"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let registry = JobRegistry::new(dir.path());
        assert!(matches!(
            registry.load_descriptor("../secrets"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_missing_schedule_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_job(
            dir.path(),
            "sinadef-analysis",
            Some("name: sinadef-analysis\ncompute: {cpu: \"4\", memory: 16Gi}\nparameters: {}\n"),
        );

        let registry = JobRegistry::new(dir.path());
        match registry.load_descriptor("sinadef-analysis") {
            Err(Error::Validation { job, issues }) => {
                assert_eq!(job, "sinadef-analysis");
                assert!(issues.mentions("schedule"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_yaml_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "sinadef-analysis", Some("name: [oops\n"));

        let registry = JobRegistry::new(dir.path());
        assert!(matches!(
            registry.load_descriptor("sinadef-analysis"),
            Err(Error::Validation { .. })
        ));
    }

    #[test]
    fn test_validate_all_reports_every_directory() {
        let dir = tempfile::tempdir().unwrap();
        write_job(dir.path(), "sinadef-analysis", Some(SINADEF));
        write_job(dir.path(), "myfirstETL", Some("name: myfirstETL\n"));
        write_job(dir.path(), "scratch", None);

        let registry = JobRegistry::new(dir.path());
        let results = registry.validate_all().unwrap();

        let names: Vec<_> = results.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["myfirstETL", "scratch", "sinadef-analysis"]);
        assert!(matches!(results[0].1, Err(Error::Validation { .. })));
        assert!(matches!(results[1].1, Err(Error::NotFound { .. })));
        assert!(results[2].1.is_ok());
    }
}
