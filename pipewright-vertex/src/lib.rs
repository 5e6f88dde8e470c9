mod client;
mod mapping;

pub use client::{VertexClient, VertexConnector, VertexEndpoints};
