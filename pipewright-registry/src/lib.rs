pub mod parser;
pub mod registry;
pub mod schema;
mod validate;

pub use parser::parse_yaml;
pub use registry::{DESCRIPTOR_FILE, JobRegistry};
pub use validate::validate_descriptor;
