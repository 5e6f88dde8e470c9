use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::{environment::Environment, error::Error, pipeline::SubmissionKey};

/// Outcome of an environment gate check.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
pub enum Decision {
    Allow,
    Deny,
    PendingApproval,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Approved,
    Rejected,
}

/// A review recorded by the external approval mechanism.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    pub job: String,
    pub environment: Environment,

    /// Restricts the review to one tag; `None` covers any tag.
    #[serde(default)]
    pub tag: Option<String>,

    pub reviewer: String,
    pub status: ApprovalStatus,
    pub recorded_at: DateTime<Utc>,

    #[serde(default)]
    pub comment: Option<String>,
}

impl ApprovalRecord {
    pub fn applies_to(&self, key: &SubmissionKey, tag: &str) -> bool {
        self.job == key.job_name
            && self.environment == key.environment
            && self.tag.as_deref().is_none_or(|t| t == tag)
    }
}

/// Submission awaiting a gate decision.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GateRequest {
    pub key: SubmissionKey,
    pub actor: String,
    pub tag: String,
}

/// Source of recorded reviews.
#[async_trait]
pub trait ApprovalStore: Send + Sync {
    /// Every record for the key's job and environment, in any order.
    async fn approvals_for(&self, key: &SubmissionKey) -> Result<Vec<ApprovalRecord>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tag: Option<&str>) -> ApprovalRecord {
        ApprovalRecord {
            job: "sinadef-analysis".to_string(),
            environment: Environment::Prod,
            tag: tag.map(str::to_string),
            reviewer: "maria".to_string(),
            status: ApprovalStatus::Approved,
            recorded_at: Utc::now(),
            comment: None,
        }
    }

    #[test]
    fn test_applies_to_any_tag_when_unrestricted() {
        let key = SubmissionKey::new("sinadef-analysis", Environment::Prod);
        assert!(record(None).applies_to(&key, "v1"));
        assert!(record(None).applies_to(&key, "v2"));
    }

    #[test]
    fn test_applies_to_matching_tag_only() {
        let key = SubmissionKey::new("sinadef-analysis", Environment::Prod);
        assert!(record(Some("v1")).applies_to(&key, "v1"));
        assert!(!record(Some("v1")).applies_to(&key, "v2"));
    }

    #[test]
    fn test_never_applies_across_environments() {
        let key = SubmissionKey::new("sinadef-analysis", Environment::Dev);
        assert!(!record(None).applies_to(&key, "v1"));
    }
}
