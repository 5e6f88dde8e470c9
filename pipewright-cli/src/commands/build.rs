use std::path::Path;

use pipewright_common::error::Error;
use tokio::process::Command;
use tracing::info;

use super::{Target, Workspace};

/// Builds `<registry>/<project>/<job>:<tag>` from the job directory and
/// optionally pushes it.
pub async fn execute(
    workspace: &Workspace,
    target: &Target,
    tag: &str,
    push: bool,
) -> Result<(), Error> {
    let registry = workspace.registry();
    let job_dir = registry.job_dir(&target.job);
    if !job_dir.is_dir() {
        return Err(Error::NotFound {
            resource_type: "job directory".to_string(),
            resource_id: job_dir.display().to_string(),
        });
    }

    let configuration = workspace.configuration(target)?;
    let image = configuration.image_for(&target.job, tag)?;

    info!(image = %image, dir = %job_dir.display(), environment = %target.environment, "Building image");
    docker(&job_dir, &["build", "-t", &image, "."]).await?;

    if push {
        info!(image = %image, "Pushing image");
        docker(&job_dir, &["push", &image]).await?;
    }

    println!("{}", image);
    Ok(())
}

async fn docker(dir: &Path, args: &[&str]) -> Result<(), Error> {
    let status = Command::new("docker")
        .args(args)
        .current_dir(dir)
        .status()
        .await
        .map_err(|e| Error::io("docker", e))?;

    if !status.success() {
        return Err(Error::Internal(format!(
            "docker {} exited with {}",
            args.first().copied().unwrap_or_default(),
            status
        )));
    }
    Ok(())
}
