pub mod compiler;
pub mod deploy;
pub mod gate;
pub mod resolver;
pub mod settings;
pub mod submission;
pub mod synth;

pub use compiler::compile;
pub use deploy::{DeployRequest, Deployer, ServiceConnector};
pub use gate::{EnvironmentGate, FileApprovalStore, GatePolicy, GateSettings, InMemoryApprovalStore};
pub use resolver::{ConfigKey, ConfigResolver, Configuration};
pub use settings::Settings;
pub use submission::{
    InMemoryConnector, InMemoryExecutionService, RetryPolicy, SubmissionOrchestrator,
    SubmitOptions,
};
pub use synth::GraphSynthesizer;
