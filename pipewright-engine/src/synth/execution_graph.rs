use std::collections::HashMap;

use pipewright_common::{
    error::Error,
    pipeline::{PipelineGraph, Step},
};
use petgraph::{
    Direction::Incoming,
    algo::{is_cyclic_directed, toposort},
    graph::{DiGraph, NodeIndex},
};
use tracing::warn;

/// Dependency view over the steps of a [`PipelineGraph`].
pub struct StepExecutionGraph<'a> {
    /// An edge from step A to step B means A must succeed before B starts.
    graph: DiGraph<&'a Step, ()>,

    step_id_to_node_idx: HashMap<&'a str, NodeIndex>,
}

impl<'a> StepExecutionGraph<'a> {
    /// Builds the dependency graph, rejecting duplicate ids, dependencies on
    /// unknown or later steps, and cycles.
    pub fn new(pipeline: &'a PipelineGraph) -> Result<Self, Error> {
        let mut graph = DiGraph::new();
        let mut step_id_to_node_idx = HashMap::new();

        if pipeline.steps.is_empty() {
            warn!(pipeline = %pipeline.name, "Building an execution graph without steps");
        }

        for step in &pipeline.steps {
            if step_id_to_node_idx.contains_key(step.id.as_str()) {
                return Err(graph_error(
                    pipeline,
                    "steps",
                    format!("duplicate step id '{}'", step.id),
                ));
            }

            let node_idx = graph.add_node(step);
            step_id_to_node_idx.insert(step.id.as_str(), node_idx);

            for dependency in &step.depends_on {
                let from_node_idx = step_id_to_node_idx.get(dependency.as_str()).ok_or_else(|| {
                    graph_error(
                        pipeline,
                        "steps",
                        format!(
                            "step '{}' depends on '{}', which is not an earlier step",
                            step.id, dependency
                        ),
                    )
                })?;

                graph.add_edge(*from_node_idx, node_idx, ());
            }
        }

        if is_cyclic_directed(&graph) {
            return Err(graph_error(pipeline, "steps", "cyclic step dependencies"));
        }

        Ok(Self {
            graph,
            step_id_to_node_idx,
        })
    }

    pub fn step(&self, id: &str) -> Option<&'a Step> {
        self.step_id_to_node_idx
            .get(id)
            .and_then(|node_idx| self.graph.node_weight(*node_idx))
            .copied()
    }

    /// Direct dependencies of `id`, sorted.
    pub fn dependencies_of(&self, id: &str) -> Vec<&'a str> {
        let Some(node_idx) = self.step_id_to_node_idx.get(id) else {
            return Vec::new();
        };

        let mut dependencies: Vec<&'a str> = self
            .graph
            .neighbors_directed(*node_idx, Incoming)
            .filter_map(|idx| self.graph.node_weight(idx))
            .map(|step| step.id.as_str())
            .collect();
        dependencies.sort_unstable();
        dependencies
    }

    /// Step ids in an order where every step follows its dependencies.
    pub fn topological_order(&self) -> Vec<&'a str> {
        // `new` rejects cycles, so toposort cannot fail here.
        toposort(&self.graph, None)
            .map(|order| {
                order
                    .into_iter()
                    .filter_map(|idx| self.graph.node_weight(idx))
                    .map(|step| step.id.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn graph_error(pipeline: &PipelineGraph, field: &str, message: impl Into<String>) -> Error {
    Error::GraphBuild {
        job: pipeline.name.clone(),
        field: field.to_string(),
        message: message.into(),
    }
}
