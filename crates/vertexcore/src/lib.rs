//! Core abstractions for Vertex Flow
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: values, typed edges, the per-run contexts
//! (outputs, streams, subgraphs), templates and execution events.

mod context;
mod edge;
mod error;
pub mod events;
mod stream;
mod subgraph;
mod template;
mod value;
mod vertex;

pub use context::{SharedContext, WorkflowContext};
pub use edge::{Edge, EdgeType, ALWAYS, CONDITION_FALSE, CONDITION_TRUE};
pub use error::{FlowError, InstanceError, VertexError, WorkflowError};
pub use events::*;
pub use stream::{
    CallbackId, SharedStream, StreamCallback, StreamCallbackError, StreamContext, StreamData,
    StreamEmitter, STREAM_BUFFER_CAPACITY,
};
pub use subgraph::SubgraphContext;
pub use template::{
    ErrorHandling, Position, TemplateId, VertexSpec, WorkflowSettings, WorkflowTemplate,
};
pub use value::{FieldAccessible, Value};
pub use vertex::{Vertex, VertexContext, VertexId, VertexMetadata, VertexOutput};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
