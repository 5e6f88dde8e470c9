mod artifact;
mod graph;
mod submission;

pub use artifact::*;
pub use graph::*;
pub use submission::*;
