pub mod context;
pub mod environment;
pub mod error;
pub mod gate;
pub mod job;
pub mod pipeline;
pub mod secret;
pub mod service;
