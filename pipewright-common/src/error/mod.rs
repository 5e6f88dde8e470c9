use std::fmt::{self, Debug};

use strum_macros::Display;

use crate::{environment::Environment, gate::Decision};

mod issue;
pub use issue::{ValidationIssue, ValidationIssues};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Resource Not Found: {resource_type} '{resource_id}'")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("Invalid descriptor for job '{job}': {issues}")]
    Validation {
        job: String,
        issues: ValidationIssues,
    },

    #[error("Missing configuration '{key}' for environment {environment} (required by {required_by})")]
    MissingConfiguration {
        environment: Environment,
        key: String,
        required_by: String,
    },

    #[error("Cannot build pipeline graph for job '{job}': {field}: {message}")]
    GraphBuild {
        job: String,
        field: String,
        message: String,
    },

    #[error("Execution service unavailable during {operation} after {attempts} attempt(s): {message}")]
    TransientService {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Execution service rejected {operation}: {message}")]
    ServiceRejected { operation: String, message: String },

    #[error("Submission of job '{job}' to {environment} by '{actor}' not authorized: {decision}")]
    Authorization {
        job: String,
        environment: Environment,
        actor: String,
        decision: Decision,
    },

    #[error("Settings Error: {0}")]
    Settings(String),

    #[error("IO Error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization Error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal Error: {0}")]
    Internal(String),
}

/// Coarse error class, reported by the CLI alongside the message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ErrorKind {
    NotFoundError,
    ValidationError,
    MissingConfigurationError,
    GraphBuildError,
    TransientServiceError,
    ServiceRejectedError,
    AuthorizationError,
    SettingsError,
    IoError,
    InternalError,
}

/// Component that raised an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum Component {
    JobRegistry,
    ConfigResolver,
    GraphSynthesizer,
    SubmissionOrchestrator,
    EnvironmentGate,
    Workspace,
}

impl Error {
    pub fn io(path: impl fmt::Display, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_string(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFoundError,
            Error::Validation { .. } => ErrorKind::ValidationError,
            Error::MissingConfiguration { .. } => ErrorKind::MissingConfigurationError,
            Error::GraphBuild { .. } => ErrorKind::GraphBuildError,
            Error::TransientService { .. } => ErrorKind::TransientServiceError,
            Error::ServiceRejected { .. } => ErrorKind::ServiceRejectedError,
            Error::Authorization { .. } => ErrorKind::AuthorizationError,
            Error::Settings(_) => ErrorKind::SettingsError,
            Error::Io { .. } => ErrorKind::IoError,
            Error::Serialization(_) | Error::Internal(_) => ErrorKind::InternalError,
        }
    }

    pub fn component(&self) -> Component {
        match self {
            Error::NotFound { .. } | Error::Validation { .. } => Component::JobRegistry,
            Error::MissingConfiguration { .. } => Component::ConfigResolver,
            Error::GraphBuild { .. } => Component::GraphSynthesizer,
            Error::TransientService { .. }
            | Error::ServiceRejected { .. }
            | Error::Serialization(_) => Component::SubmissionOrchestrator,
            Error::Authorization { .. } => Component::EnvironmentGate,
            Error::Settings(_) | Error::Io { .. } | Error::Internal(_) => Component::Workspace,
        }
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientService { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_configuration_names_key() {
        let err = Error::MissingConfiguration {
            environment: Environment::Prod,
            key: "BUCKET".to_string(),
            required_by: "parameters.output_path".to_string(),
        };

        assert_eq!(err.kind(), ErrorKind::MissingConfigurationError);
        assert_eq!(err.component(), Component::ConfigResolver);
        let msg = err.to_string();
        assert!(msg.contains("BUCKET"));
        assert!(msg.contains("prod"));
        assert!(msg.contains("parameters.output_path"));
    }

    #[test]
    fn test_authorization_error_reports_decision() {
        let err = Error::Authorization {
            job: "sinadef-analysis".to_string(),
            environment: Environment::Prod,
            actor: "ci".to_string(),
            decision: Decision::PendingApproval,
        };

        assert_eq!(err.kind().to_string(), "AuthorizationError");
        assert_eq!(err.component().to_string(), "EnvironmentGate");
        assert!(err.to_string().contains("PendingApproval"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        let transient = Error::TransientService {
            operation: "create_schedule".to_string(),
            attempts: 4,
            message: "503".to_string(),
        };
        let rejected = Error::ServiceRejected {
            operation: "create_schedule".to_string(),
            message: "invalid cron".to_string(),
        };

        assert!(transient.is_retryable());
        assert!(!rejected.is_retryable());
    }
}
