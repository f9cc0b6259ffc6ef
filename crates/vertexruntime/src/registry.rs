use std::collections::HashMap;
use std::sync::Arc;
use vertexcore::{Value, Vertex, VertexError, WorkflowError};

/// Factory trait for creating vertex instances
pub trait VertexFactory: Send + Sync {
    /// Create a new instance of the vertex with given configuration
    fn create(&self, config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError>;

    /// Get vertex type identifier
    fn vertex_type(&self) -> &str;

    /// Optional: Get vertex metadata (description, input/output schema, etc.)
    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata::default()
    }
}

/// Metadata about a vertex type
#[derive(Debug, Clone)]
pub struct VertexTypeMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for VertexTypeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub required: bool,
}

impl PortDefinition {
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: false,
        }
    }
}

/// Registry of available vertex types
pub struct VertexRegistry {
    factories: HashMap<String, Arc<dyn VertexFactory>>,
}

impl VertexRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a vertex factory
    pub fn register(&mut self, factory: Arc<dyn VertexFactory>) {
        let vertex_type = factory.vertex_type().to_string();
        tracing::info!("Registering vertex type: {}", vertex_type);
        self.factories.insert(vertex_type, factory);
    }

    pub fn contains(&self, vertex_type: &str) -> bool {
        self.factories.contains_key(vertex_type)
    }

    /// Create a vertex instance from a vertex type and config
    pub fn create_vertex(
        &self,
        vertex_type: &str,
        config: &HashMap<String, Value>,
    ) -> Result<Box<dyn Vertex>, WorkflowError> {
        let factory = self
            .factories
            .get(vertex_type)
            .ok_or_else(|| WorkflowError::UnknownVertexType(vertex_type.to_string()))?;

        let vertex = factory
            .create(config)
            .map_err(|e| WorkflowError::Invalid(format!("Failed to create vertex: {}", e)))?;
        vertex
            .validate_config(config)
            .map_err(|e| WorkflowError::Invalid(format!("Invalid {} config: {}", vertex_type, e)))?;
        Ok(vertex)
    }

    /// Get all registered vertex types, sorted
    pub fn list_vertex_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a vertex type
    pub fn get_metadata(&self, vertex_type: &str) -> Option<VertexTypeMetadata> {
        self.factories.get(vertex_type).map(|f| f.metadata())
    }
}

impl Default for VertexRegistry {
    fn default() -> Self {
        Self::new()
    }
}
