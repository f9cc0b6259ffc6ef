use crate::{EventEmitter, SharedContext, StreamEmitter, Value, VertexError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type VertexId = String;

/// Core trait that all executable vertices implement
#[async_trait]
pub trait Vertex: Send + Sync {
    /// Unique type identifier (e.g., "template.render", "condition.compare")
    fn vertex_type(&self) -> &str;

    /// Execute the vertex with given context
    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError>;

    /// Optional: Initialize stateful resources
    async fn initialize(&mut self) -> Result<(), VertexError> {
        Ok(())
    }

    /// Optional: Validate configuration at workflow build time
    fn validate_config(&self, _config: &HashMap<String, Value>) -> Result<(), VertexError> {
        Ok(())
    }
}

/// Execution context passed to each vertex
#[derive(Clone)]
pub struct VertexContext {
    pub vertex_id: String,

    /// Workflow input overlaid with the outputs of active upstream vertices
    pub inputs: HashMap<String, Value>,

    /// Static configuration for this vertex
    pub config: HashMap<String, Value>,

    /// Outputs and shared state of the current run
    pub context: SharedContext,

    /// Incremental output channel for this vertex
    pub stream: StreamEmitter,

    /// Event emitter for real-time updates
    pub events: EventEmitter,

    /// Cancellation token for graceful shutdown
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl VertexContext {
    /// Get required input or return error
    pub fn require_input(&self, name: &str) -> Result<&Value, VertexError> {
        self.inputs
            .get(name)
            .ok_or_else(|| VertexError::MissingInput(name.to_string()))
    }

    /// Get a required string input
    pub fn require_str(&self, name: &str) -> Result<&str, VertexError> {
        self.require_input(name)?
            .as_str()
            .ok_or_else(|| VertexError::InvalidInputType {
                field: name.to_string(),
                expected: "string".to_string(),
                actual: "other".to_string(),
            })
    }

    /// Get config value or return error
    pub fn require_config(&self, name: &str) -> Result<&Value, VertexError> {
        self.config
            .get(name)
            .ok_or_else(|| VertexError::Configuration(format!("Missing config: {}", name)))
    }

    /// Get config with default
    pub fn get_config_or(&self, name: &str, default: Value) -> Value {
        self.config.get(name).cloned().unwrap_or(default)
    }
}

/// Output from vertex execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexOutput {
    /// The vertex's single output value for this run
    pub value: Value,

    /// Branch selected by a branching vertex; matched against `Condition` edges
    pub branch: Option<String>,

    /// Execution metadata
    pub metadata: VertexMetadata,
}

impl VertexOutput {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            branch: None,
            metadata: VertexMetadata::default(),
        }
    }

    /// An empty record, to be filled with [`VertexOutput::with_field`].
    pub fn record() -> Self {
        Self::new(Value::Object(HashMap::new()))
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self.value {
            Value::Object(map) => {
                map.insert(name.into(), value.into());
            }
            _ => {
                let mut map = HashMap::new();
                map.insert(name.into(), value.into());
                self.value = Value::Object(map);
            }
        }
        self
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }
}

impl Default for VertexOutput {
    fn default() -> Self {
        Self::new(Value::Null)
    }
}

/// Metadata about vertex execution
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VertexMetadata {
    pub execution_time_ms: u64,
    pub custom: HashMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let output = VertexOutput::record()
            .with_field("status", 200.0)
            .with_field("body", "ok")
            .with_branch("true");

        let map = output.value.as_object().unwrap();
        assert_eq!(map.get("status"), Some(&Value::Number(200.0)));
        assert_eq!(map.get("body"), Some(&Value::from("ok")));
        assert_eq!(output.branch.as_deref(), Some("true"));
    }

    #[test]
    fn test_with_field_replaces_scalar() {
        let output = VertexOutput::new("text").with_field("n", 1i64);
        assert_eq!(output.value.as_object().unwrap().len(), 1);
    }
}
