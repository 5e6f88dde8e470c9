mod commands;
mod logging;

use std::{path::PathBuf, process::ExitCode};

use clap::{Arg, ArgAction, ArgMatches, Command};
use pipewright_common::error::Error;
use tracing::debug;

use commands::{Target, Workspace};

fn etl_name_arg() -> Arg {
    Arg::new("etl_name")
        .long("etl-name")
        .help("Name of the job directory under the jobs root")
        .required(true)
        .action(ArgAction::Set)
}

fn environment_arg() -> Arg {
    Arg::new("environment")
        .short('e')
        .long("environment")
        .help("Target environment")
        .required(true)
        .value_parser(["dev", "prod"])
        .action(ArgAction::Set)
}

fn env_file_arg() -> Arg {
    Arg::new("env_file")
        .long("env-file")
        .help("Dotenv file with the environment's configuration (default: .env.<environment>)")
        .action(ArgAction::Set)
}

fn cli() -> Command {
    Command::new("pipewright")
        .about("Synthesizes and deploys scheduled container pipelines")
        .version(env!("CARGO_PKG_VERSION"))
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to the workspace settings file")
                .default_value("pipewright.yaml")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .help("Log level (error, warn, info, debug, trace)")
                .default_value("info")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(Command::new("list").about("Lists the jobs of the workspace"))
        .subcommand(
            Command::new("validate").about("Validates every job descriptor of the workspace"),
        )
        .subcommand(
            Command::new("compile")
                .about("Writes the compiled pipeline of a job to a file")
                .arg(etl_name_arg())
                .arg(environment_arg())
                .arg(env_file_arg())
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .help("Image tag the pipeline runs")
                        .default_value("latest")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help("Output file (default: /tmp/<job>_pipeline.json)")
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(
            Command::new("build")
                .about("Builds the container image of a job")
                .arg(etl_name_arg())
                .arg(environment_arg())
                .arg(env_file_arg())
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .help("Image tag")
                        .default_value("latest")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("push")
                        .long("push")
                        .help("Push the image after building it")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("deploy")
                .about("Publishes a job's pipeline and schedule to an environment")
                .arg(etl_name_arg())
                .arg(environment_arg())
                .arg(env_file_arg())
                .arg(
                    Arg::new("tag")
                        .long("tag")
                        .help("Image tag to deploy")
                        .required(true)
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("actor")
                        .long("actor")
                        .help("Identity requesting the deployment (default: $USER)")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("image")
                        .long("image")
                        .help("Deploy this image reference instead of the registry image at --tag")
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("launch_run")
                        .long("launch-run")
                        .help("Start a run right after deploying")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .help("Deploy against an in-memory service instead of Vertex AI")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn target(matches: &ArgMatches) -> Result<Target, Error> {
    let environment = matches
        .get_one::<String>("environment")
        .ok_or_else(|| Error::Internal("missing --environment".to_string()))?;

    Ok(Target {
        job: string_arg(matches, "etl_name")?,
        environment: environment
            .parse()
            .map_err(|_| Error::Settings(format!("unknown environment '{}'", environment)))?,
        env_file: matches.get_one::<String>("env_file").map(PathBuf::from),
    })
}

fn string_arg(matches: &ArgMatches, id: &str) -> Result<String, Error> {
    matches
        .get_one::<String>(id)
        .cloned()
        .ok_or_else(|| Error::Internal(format!("missing argument '{}'", id)))
}

async fn run(matches: ArgMatches) -> Result<(), Error> {
    let config = PathBuf::from(string_arg(&matches, "config")?);
    let workspace = Workspace::load(&config)?;
    debug!(jobs_dir = %workspace.settings.jobs_dir.display(), "Loaded workspace settings");

    match matches.subcommand() {
        Some(("list", _)) => commands::list::execute(&workspace),
        Some(("validate", _)) => commands::validate::execute(&workspace),
        Some(("compile", sub)) => {
            let output = sub.get_one::<String>("output").map(PathBuf::from);
            commands::compile::execute(
                &workspace,
                &target(sub)?,
                &string_arg(sub, "tag")?,
                output,
            )
        }
        Some(("build", sub)) => {
            commands::build::execute(
                &workspace,
                &target(sub)?,
                &string_arg(sub, "tag")?,
                sub.get_flag("push"),
            )
            .await
        }
        Some(("deploy", sub)) => {
            let args = commands::deploy::DeployArgs {
                tag: string_arg(sub, "tag")?,
                actor: sub.get_one::<String>("actor").cloned(),
                image: sub.get_one::<String>("image").cloned(),
                launch_run: sub.get_flag("launch_run"),
                dry_run: sub.get_flag("dry_run"),
            };
            commands::deploy::execute(&workspace, &target(sub)?, args).await
        }
        Some((other, _)) => Err(Error::Internal(format!("unknown command '{}'", other))),
        None => Err(Error::Internal("no command given".to_string())),
    }
}

fn report(error: &Error) {
    eprintln!("error[{}] in {}: {}", error.kind(), error.component(), error);

    if let Error::Validation { issues, .. } = error {
        for issue in issues.iter() {
            eprintln!("  - {}", issue);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();

    let level = matches
        .get_one::<String>("log_level")
        .map(String::as_str)
        .unwrap_or("info");
    logging::init(level);

    match run(matches).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
