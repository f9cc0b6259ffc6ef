use crate::{Value, VertexId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Context shared by every vertex task of one run.
pub type SharedContext = Arc<RwLock<WorkflowContext>>;

/// Per-run store of vertex outputs and free-form named state.
///
/// The store itself is not synchronized; a run that executes vertices
/// concurrently shares it as a [`SharedContext`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowContext {
    outputs: HashMap<VertexId, Value>,
    state: HashMap<String, Value>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedContext {
        Arc::new(RwLock::new(self))
    }

    /// Overwrites any previous output of the vertex.
    pub fn set_output(&mut self, vertex_id: impl Into<VertexId>, value: Value) {
        self.outputs.insert(vertex_id.into(), value);
    }

    pub fn get_output(&self, vertex_id: &str) -> Option<Value> {
        self.outputs.get(vertex_id).cloned()
    }

    pub fn has_output(&self, vertex_id: &str) -> bool {
        self.outputs.contains_key(vertex_id)
    }

    pub fn get_outputs(&self) -> HashMap<VertexId, Value> {
        self.outputs.clone()
    }

    pub fn set_state(&mut self, key: impl Into<String>, value: Value) {
        self.state.insert(key.into(), value);
    }

    pub fn get_state(&self, key: &str) -> Option<Value> {
        self.state.get(key).cloned()
    }

    pub fn has_state(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_absent_before_set() {
        let ctx = WorkflowContext::new();
        assert_eq!(ctx.get_output("llm"), None);
        assert!(!ctx.has_output("llm"));
    }

    #[test]
    fn test_output_last_write_wins() {
        let mut ctx = WorkflowContext::new();
        ctx.set_output("llm", Value::from("first"));
        ctx.set_output("llm", Value::from("second"));

        assert_eq!(ctx.get_output("llm"), Some(Value::from("second")));
        assert_eq!(ctx.get_outputs().len(), 1);
    }

    #[test]
    fn test_null_is_distinct_from_absent() {
        let mut ctx = WorkflowContext::new();
        ctx.set_output("sink", Value::Null);

        assert_eq!(ctx.get_output("sink"), Some(Value::Null));
        assert!(ctx.has_output("sink"));
    }

    #[test]
    fn test_state_independent_of_outputs() {
        let mut ctx = WorkflowContext::new();
        ctx.set_state("llm", Value::Number(1.0));

        assert_eq!(ctx.get_state("llm"), Some(Value::Number(1.0)));
        assert_eq!(ctx.get_output("llm"), None);
        assert!(ctx.has_state("llm"));
        assert_eq!(ctx.get_state("other"), None);
    }

    #[tokio::test]
    async fn test_shared_context() {
        let shared = WorkflowContext::new().shared();
        let writer = shared.clone();

        tokio::spawn(async move {
            writer.write().await.set_state("turns", Value::Number(3.0));
        })
        .await
        .unwrap();

        assert_eq!(shared.read().await.get_state("turns"), Some(Value::Number(3.0)));
    }
}
