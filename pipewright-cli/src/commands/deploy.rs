use std::sync::Arc;

use async_trait::async_trait;
use pipewright_common::{
    context::ResolvedContext, error::Error, secret::Sensitive, service::ExecutionService,
};
use pipewright_engine::{
    DeployRequest, Deployer, EnvironmentGate, FileApprovalStore, InMemoryConnector,
    ServiceConnector, SubmitOptions,
};
use pipewright_vertex::VertexConnector;
use tokio::process::Command;
use tracing::{info, warn};

use super::{Target, Workspace};

/// Variable holding a ready-made OAuth access token for the Google APIs.
const ACCESS_TOKEN_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

pub struct DeployArgs {
    pub tag: String,
    pub actor: Option<String>,
    pub image: Option<String>,
    pub launch_run: bool,
    pub dry_run: bool,
}

pub async fn execute(workspace: &Workspace, target: &Target, args: DeployArgs) -> Result<(), Error> {
    let configuration = workspace.configuration(target)?;
    let actor = args
        .actor
        .clone()
        .or_else(|| std::env::var("USER").ok())
        .unwrap_or_else(|| "unknown".to_string());

    let connector: Arc<dyn ServiceConnector> = if args.dry_run {
        warn!("Dry run: nothing is sent to Vertex AI");
        Arc::new(InMemoryConnector::default())
    } else {
        Arc::new(AuthenticatedConnector)
    };

    let gate = EnvironmentGate::new(
        workspace.settings.gate.clone(),
        Arc::new(FileApprovalStore::new(&workspace.settings.approvals_file)),
    );
    let deployer = Deployer::new(
        workspace.registry(),
        gate,
        connector,
        workspace.settings.retry.clone(),
    );

    let outcome = deployer
        .deploy(DeployRequest {
            job: &target.job,
            configuration: &configuration,
            tag: &args.tag,
            actor: &actor,
            image: args.image.as_deref(),
            options: SubmitOptions {
                launch_run: args.launch_run,
            },
        })
        .await?;

    info!(key = %outcome.key, "Deployed");
    println!("pipeline: {}", outcome.pipeline_id);
    println!("schedule: {}", outcome.schedule_id);
    println!("replaced: {}", outcome.replaced);
    if let Some(run_id) = &outcome.run_id {
        println!("run:      {}", run_id);
    }
    Ok(())
}

/// Obtains credentials only once the gate has allowed the deployment.
struct AuthenticatedConnector;

#[async_trait]
impl ServiceConnector for AuthenticatedConnector {
    async fn connect(&self, context: &ResolvedContext) -> Result<Arc<dyn ExecutionService>, Error> {
        VertexConnector::new(access_token().await?)
            .connect(context)
            .await
    }
}

/// Token from the environment, falling back to the local gcloud login.
async fn access_token() -> Result<Sensitive<String>, Error> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_VAR) {
        if !token.trim().is_empty() {
            return Ok(Sensitive::new(token.trim().to_string()));
        }
    }

    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .map_err(|e| {
            Error::Settings(format!(
                "Set {} or install gcloud to authenticate: {}",
                ACCESS_TOKEN_VAR, e
            ))
        })?;

    if !output.status.success() {
        return Err(Error::Settings(format!(
            "gcloud auth print-access-token failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if token.is_empty() {
        return Err(Error::Settings(
            "gcloud returned an empty access token".to_string(),
        ));
    }
    Ok(Sensitive::new(token))
}
