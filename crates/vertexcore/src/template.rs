use crate::{Edge, EdgeType, Value, VertexId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub type TemplateId = Uuid;

/// Serializable description of a workflow: vertices plus typed edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub nodes: Vec<VertexSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: WorkflowSettings,
}

impl WorkflowTemplate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            settings: WorkflowSettings::default(),
        }
    }

    pub fn add_vertex(&mut self, vertex: VertexSpec) -> VertexId {
        let id = vertex.id.clone();
        self.nodes.push(vertex);
        id
    }

    pub fn connect(&mut self, source: impl Into<VertexId>, target: impl Into<VertexId>) {
        self.edges.push(Edge::always(source, target));
    }

    /// Connect along the branch `branch` of a branching source vertex.
    pub fn connect_when(
        &mut self,
        source: impl Into<VertexId>,
        target: impl Into<VertexId>,
        branch: impl Into<String>,
    ) {
        self.edges.push(Edge::new(source, target, EdgeType::condition(branch)));
    }

    pub fn find_vertex(&self, id: &str) -> Option<&VertexSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Vertex declaration in a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VertexSpec {
    pub id: VertexId,
    pub vertex_type: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub config: HashMap<String, Value>,
    #[serde(default)]
    pub position: Option<Position>,
}

impl VertexSpec {
    pub fn new(id: impl Into<VertexId>, vertex_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            vertex_type: vertex_type.into(),
            name: None,
            config: HashMap::new(),
            position: None,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_position(mut self, x: f32, y: f32) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Vertex position in visual editor
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

/// Per-template execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Per-vertex execution deadline
    pub max_execution_time_ms: Option<u64>,
    pub max_parallel_vertices: usize,
    pub on_error: ErrorHandling,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_execution_time_ms: None,
            max_parallel_vertices: 10,
            on_error: ErrorHandling::StopWorkflow,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorHandling {
    StopWorkflow,
    ContinueOnError,
}
