use std::sync::Arc;

use pipewright_common::{
    environment::Environment,
    error::Error,
    gate::{ApprovalRecord, ApprovalStatus, ApprovalStore, Decision, GateRequest},
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

mod store;

pub use store::{FileApprovalStore, InMemoryApprovalStore};

/// Who may submit to one environment, and whether a review is needed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GatePolicy {
    pub requires_approval: bool,

    /// Reviewers whose records count. Empty means any reviewer.
    pub reviewers: Vec<String>,

    /// Actors allowed to submit at all. Empty means anyone.
    pub allowed_actors: Vec<String>,

    /// Ignore reviews recorded by the submitting actor.
    pub prevent_self_review: bool,
}

impl GatePolicy {
    /// Submissions are allowed without review.
    pub fn open() -> Self {
        Self {
            requires_approval: false,
            reviewers: Vec::new(),
            allowed_actors: Vec::new(),
            prevent_self_review: true,
        }
    }

    /// Submissions need an approval from someone other than the actor.
    pub fn protected() -> Self {
        Self {
            requires_approval: true,
            ..Self::open()
        }
    }

    fn is_reviewer(&self, reviewer: &str) -> bool {
        self.reviewers.is_empty() || self.reviewers.iter().any(|r| r == reviewer)
    }

    fn is_allowed_actor(&self, actor: &str) -> bool {
        self.allowed_actors.is_empty() || self.allowed_actors.iter().any(|a| a == actor)
    }
}

/// Per-environment policies. Fields left out of a settings file keep the
/// default of their own environment, so a partial `dev` block stays open.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "GateSettingsFile")]
pub struct GateSettings {
    pub dev: GatePolicy,
    pub prod: GatePolicy,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct GateSettingsFile {
    dev: PolicyOverrides,
    prod: PolicyOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct PolicyOverrides {
    requires_approval: Option<bool>,
    reviewers: Option<Vec<String>>,
    allowed_actors: Option<Vec<String>>,
    prevent_self_review: Option<bool>,
}

impl PolicyOverrides {
    fn apply(self, base: GatePolicy) -> GatePolicy {
        GatePolicy {
            requires_approval: self.requires_approval.unwrap_or(base.requires_approval),
            reviewers: self.reviewers.unwrap_or(base.reviewers),
            allowed_actors: self.allowed_actors.unwrap_or(base.allowed_actors),
            prevent_self_review: self.prevent_self_review.unwrap_or(base.prevent_self_review),
        }
    }
}

impl From<GateSettingsFile> for GateSettings {
    fn from(file: GateSettingsFile) -> Self {
        let defaults = GateSettings::default();
        Self {
            dev: file.dev.apply(defaults.dev),
            prod: file.prod.apply(defaults.prod),
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            dev: GatePolicy::open(),
            prod: GatePolicy::protected(),
        }
    }
}

impl GateSettings {
    pub fn policy(&self, environment: Environment) -> &GatePolicy {
        match environment {
            Environment::Dev => &self.dev,
            Environment::Prod => &self.prod,
        }
    }
}

/// Decides whether a submission may reach an environment.
/// ---
/// Checked before any connection to the execution service is opened. Only
/// [`Decision::Allow`] lets a deploy proceed.
///
/// The actor is whatever identity the caller declares; nothing here
/// authenticates it. `allowed_actors` and `prevent_self_review` therefore only
/// hold against honest callers and can be sidestepped by declaring another
/// name.
pub struct EnvironmentGate {
    settings: GateSettings,
    store: Arc<dyn ApprovalStore>,
}

impl EnvironmentGate {
    pub fn new(settings: GateSettings, store: Arc<dyn ApprovalStore>) -> Self {
        Self { settings, store }
    }

    pub fn settings(&self) -> &GateSettings {
        &self.settings
    }

    #[instrument(skip_all, fields(key = %request.key, actor = %request.actor, tag = %request.tag))]
    pub async fn authorize(&self, request: &GateRequest) -> Result<Decision, Error> {
        let policy = self.settings.policy(request.key.environment);

        if !policy.is_allowed_actor(&request.actor) {
            warn!("Actor is not allowed to submit to this environment");
            return Ok(Decision::Deny);
        }

        if !policy.requires_approval {
            return Ok(Decision::Allow);
        }

        let records = self.store.approvals_for(&request.key).await?;
        let decision = match newest_applicable(&records, policy, request) {
            Some(record) => {
                info!(reviewer = %record.reviewer, status = %record.status, "Found review");
                match record.status {
                    ApprovalStatus::Approved => Decision::Allow,
                    ApprovalStatus::Rejected => Decision::Deny,
                }
            }
            None => Decision::PendingApproval,
        };

        Ok(decision)
    }

    /// Like [`authorize`](Self::authorize), but anything other than `Allow` is an error.
    pub async fn enforce(&self, request: &GateRequest) -> Result<(), Error> {
        match self.authorize(request).await? {
            Decision::Allow => Ok(()),
            decision => Err(Error::Authorization {
                job: request.key.job_name.clone(),
                environment: request.key.environment,
                actor: request.actor.clone(),
                decision,
            }),
        }
    }
}

fn newest_applicable<'a>(
    records: &'a [ApprovalRecord],
    policy: &GatePolicy,
    request: &GateRequest,
) -> Option<&'a ApprovalRecord> {
    records
        .iter()
        .filter(|r| r.applies_to(&request.key, &request.tag))
        .filter(|r| policy.is_reviewer(&r.reviewer))
        .filter(|r| !(policy.prevent_self_review && r.reviewer == request.actor))
        .max_by_key(|r| r.recorded_at)
}
