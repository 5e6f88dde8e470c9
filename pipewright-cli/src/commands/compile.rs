use std::path::PathBuf;

use pipewright_common::error::Error;
use pipewright_engine::{ConfigResolver, GraphSynthesizer, compile, compiler::to_json};
use tracing::info;

use super::{Target, Workspace};

pub fn execute(
    workspace: &Workspace,
    target: &Target,
    tag: &str,
    output: Option<PathBuf>,
) -> Result<(), Error> {
    let configuration = workspace.configuration(target)?;
    let descriptor = workspace.registry().load_descriptor(&target.job)?;

    let context = ConfigResolver::new()
        .resolve(&descriptor, &configuration)?
        .pin_image_tag(tag);
    let graph = GraphSynthesizer::new().synthesize(&context)?;
    let artifact = compile(&graph, &context.artifact_location)?;

    let output =
        output.unwrap_or_else(|| PathBuf::from(format!("/tmp/{}_pipeline.json", target.job)));
    std::fs::write(&output, to_json(&artifact)?).map_err(|e| Error::io(output.display(), e))?;

    info!(pipeline = %graph.name, image = %context.image_reference, "Compiled pipeline");
    println!("{}", output.display());
    Ok(())
}
