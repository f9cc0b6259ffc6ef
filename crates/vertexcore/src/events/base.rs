use crate::{Value, VertexId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

pub type ExecutionId = Uuid;

/// Events emitted during workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExecutionEvent {
    WorkflowStarted {
        execution_id: ExecutionId,
        template_id: Uuid,
        timestamp: DateTime<Utc>,
    },
    WorkflowCompleted {
        execution_id: ExecutionId,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    VertexStarted {
        execution_id: ExecutionId,
        vertex_id: VertexId,
        vertex_type: String,
        timestamp: DateTime<Utc>,
    },
    VertexCompleted {
        execution_id: ExecutionId,
        vertex_id: VertexId,
        output: Value,
        branch: Option<String>,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    VertexFailed {
        execution_id: ExecutionId,
        vertex_id: VertexId,
        error: String,
        timestamp: DateTime<Utc>,
    },
    VertexSkipped {
        execution_id: ExecutionId,
        vertex_id: VertexId,
        timestamp: DateTime<Utc>,
    },
    VertexEvent {
        execution_id: ExecutionId,
        vertex_id: VertexId,
        event: VertexEvent,
        timestamp: DateTime<Utc>,
    },
    StreamChunk {
        execution_id: ExecutionId,
        vertex_id: VertexId,
        data: Value,
        is_final: bool,
        metadata: HashMap<String, Value>,
        timestamp: DateTime<Utc>,
    },
}

/// Events specific to vertex execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum VertexEvent {
    Info { message: String },
    Warning { message: String },
    Progress { percent: f64, message: Option<String> },
}

/// Event emitter for vertices to send real-time updates
#[derive(Clone)]
pub struct EventEmitter {
    execution_id: ExecutionId,
    vertex_id: VertexId,
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventEmitter {
    pub fn new(
        execution_id: ExecutionId,
        vertex_id: impl Into<VertexId>,
        sender: broadcast::Sender<ExecutionEvent>,
    ) -> Self {
        Self {
            execution_id,
            vertex_id: vertex_id.into(),
            sender,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    /// Emit a vertex-specific event
    pub fn emit(&self, event: VertexEvent) {
        let _ = self.sender.send(ExecutionEvent::VertexEvent {
            execution_id: self.execution_id,
            vertex_id: self.vertex_id.clone(),
            event,
            timestamp: Utc::now(),
        });
    }

    /// Emit info message
    pub fn info(&self, message: impl Into<String>) {
        self.emit(VertexEvent::Info {
            message: message.into(),
        });
    }

    /// Emit warning message
    pub fn warn(&self, message: impl Into<String>) {
        self.emit(VertexEvent::Warning {
            message: message.into(),
        });
    }

    /// Emit progress update
    pub fn progress(&self, percent: f64, message: Option<String>) {
        self.emit(VertexEvent::Progress { percent, message });
    }

    /// Forward a raw execution event on the same channel.
    pub fn publish(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: ExecutionEvent) {
        let _ = self.sender.send(event);
    }

    pub fn create_emitter(
        &self,
        execution_id: ExecutionId,
        vertex_id: impl Into<VertexId>,
    ) -> EventEmitter {
        EventEmitter::new(execution_id, vertex_id, self.sender.clone())
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}
