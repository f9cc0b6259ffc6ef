//! Workflow execution runtime
//!
//! This crate materializes templates into runnable graphs, executes them
//! with conditional edges and parallel vertices, and tracks each execution
//! attempt as a [`WorkflowInstance`].

mod executor;
mod instance;
mod manager;
mod registry;

pub use executor::{
    ExposeSpec, GraphBuilder, GraphWorkflow, RunnableWorkflow, SubgraphDefinition,
    WorkflowBuilder, SUBGRAPH_VERTEX_TYPE,
};
pub use instance::{InstanceRecord, InstanceStatus, WorkflowInstance};
pub use manager::{RuntimeConfig, WorkflowManager};
pub use registry::{PortDefinition, VertexFactory, VertexRegistry, VertexTypeMetadata};
