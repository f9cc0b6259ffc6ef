use crate::{FieldAccessible, SharedContext, StreamContext, Value, VertexId, WorkflowContext};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;

/// Context of a nested workflow run.
///
/// Holds the subgraph's private vertex outputs and the subset of them made
/// visible to the enclosing workflow. The parent context is referenced
/// weakly: a subgraph never keeps its parent alive.
#[derive(Debug)]
pub struct SubgraphContext {
    parent: Weak<RwLock<WorkflowContext>>,
    internal_outputs: HashMap<VertexId, Value>,
    exposed_variables: HashMap<String, Value>,
    stream_context: StreamContext,
}

impl SubgraphContext {
    pub fn new(parent: &SharedContext) -> Self {
        Self::with_stream(parent, StreamContext::new())
    }

    pub fn with_stream(parent: &SharedContext, stream_context: StreamContext) -> Self {
        Self {
            parent: Arc::downgrade(parent),
            internal_outputs: HashMap::new(),
            exposed_variables: HashMap::new(),
            stream_context,
        }
    }

    /// Detached subgraph with no enclosing run.
    pub fn detached() -> Self {
        Self {
            parent: Weak::new(),
            internal_outputs: HashMap::new(),
            exposed_variables: HashMap::new(),
            stream_context: StreamContext::new(),
        }
    }

    /// The enclosing run's context, if it is still alive.
    pub fn parent(&self) -> Option<SharedContext> {
        self.parent.upgrade()
    }

    pub fn store_internal_output(&mut self, vertex_id: impl Into<VertexId>, value: Value) {
        self.internal_outputs.insert(vertex_id.into(), value);
    }

    pub fn get_internal_output(&self, vertex_id: &str) -> Option<Value> {
        self.internal_outputs.get(vertex_id).cloned()
    }

    /// Publish an internal output (or one field of it) to the parent.
    ///
    /// `exposed_name` defaults to `variable_name`. With no `variable_name`
    /// the whole output is exposed. Nothing happens when there is no name to
    /// expose under, the vertex has no output, or the requested field is
    /// absent (including outputs that carry no fields at all).
    pub fn expose_variable(
        &mut self,
        internal_vertex_id: &str,
        variable_name: Option<&str>,
        exposed_name: Option<&str>,
    ) {
        let Some(exposed_name) = exposed_name.or(variable_name) else {
            return;
        };
        let Some(output) = self.internal_outputs.get(internal_vertex_id) else {
            return;
        };

        let value = match variable_name {
            None => Some(output.clone()),
            Some(field) => output.field(field),
        };

        if let Some(value) = value {
            self.exposed_variables.insert(exposed_name.to_string(), value);
        }
    }

    pub fn get_exposed_variables(&self) -> HashMap<String, Value> {
        self.exposed_variables.clone()
    }

    pub fn stream_context(&self) -> &StreamContext {
        &self.stream_context
    }

    pub fn stream_context_mut(&mut self) -> &mut StreamContext {
        &mut self.stream_context
    }

    /// Copy every output of a finished inner run into the internal store.
    pub fn absorb(&mut self, context: &WorkflowContext) {
        self.internal_outputs.extend(context.get_outputs());
    }
}
