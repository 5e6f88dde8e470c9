use pipewright_common::error::Error;

use super::Workspace;

/// Validates every job directory and prints one line per job.
/// Fails with the first error found once all jobs were reported.
pub fn execute(workspace: &Workspace) -> Result<(), Error> {
    let results = workspace.registry().validate_all()?;
    let total = results.len();

    let mut first_error = None;
    let mut failed = 0;

    for (job, result) in results {
        match result {
            Ok(descriptor) => {
                println!("OK    {} ({})", job, descriptor.schedule.expression());
            }
            Err(e) => {
                failed += 1;
                println!("FAIL  {}", job);
                match &e {
                    Error::Validation { issues, .. } => {
                        for issue in issues.iter() {
                            println!("        {}", issue);
                        }
                    }
                    other => println!("        {}", other),
                }
                first_error.get_or_insert(e);
            }
        }
    }

    println!();
    println!("{} of {} jobs valid", total - failed, total);

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
