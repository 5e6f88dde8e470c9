use pipewright_common::error::Error;

use super::Workspace;

pub fn execute(workspace: &Workspace) -> Result<(), Error> {
    let registry = workspace.registry();
    let jobs = registry.list_jobs()?;

    if jobs.is_empty() {
        println!("No jobs found in {}", registry.root().display());
        return Ok(());
    }

    for job in jobs {
        println!("{}", job);
    }
    Ok(())
}
