use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Vertex error: {0}")]
    Vertex(#[from] VertexError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Instance error: {0}")]
    Instance(#[from] InstanceError),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone)]
pub enum VertexError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Cancelled")]
    Cancelled,
}

#[derive(Error, Debug, Clone)]
pub enum WorkflowError {
    #[error("Workflow template not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow: {0}")]
    Invalid(String),

    #[error("Cyclic dependency detected")]
    CyclicDependency,

    #[error("Vertex not found: {0}")]
    VertexNotFound(String),

    #[error("Unknown vertex type: {0}")]
    UnknownVertexType(String),

    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
}

#[derive(Error, Debug, Clone)]
pub enum InstanceError {
    #[error("Instance {0} has already been executed")]
    AlreadyExecuted(String),

    #[error("Instance not found: {0}")]
    NotFound(String),

    #[error("Execution timed out after {millis}ms")]
    TimedOut { millis: u64 },
}
