use crate::executor::{GraphBuilder, RunnableWorkflow, WorkflowBuilder};
use crate::instance::{InstanceRecord, WorkflowInstance};
use crate::registry::VertexRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;
use vertexcore::{
    Edge, EventBus, ExecutionEvent, FlowError, InstanceError, TemplateId, Value, VertexSpec,
    WorkflowError, WorkflowTemplate, STREAM_BUFFER_CAPACITY,
};

/// Owns templates, builds runnable graphs and keeps instance records
pub struct WorkflowManager {
    builder: Arc<GraphBuilder>,
    event_bus: Arc<EventBus>,
    config: RuntimeConfig,
    templates: RwLock<HashMap<TemplateId, Arc<WorkflowTemplate>>>,
    instances: RwLock<HashMap<Uuid, InstanceRecord>>,
}

impl WorkflowManager {
    /// Create a manager with an empty registry and default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_registry(Arc::new(VertexRegistry::new()), config)
    }

    /// Create a manager with a pre-configured registry
    pub fn with_registry(registry: Arc<VertexRegistry>, config: RuntimeConfig) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));
        let builder = Arc::new(GraphBuilder::new(
            registry,
            event_bus.clone(),
            config.max_parallel_vertices,
            config.stream_buffer_capacity,
        ));

        Self {
            builder,
            event_bus,
            config,
            templates: RwLock::new(HashMap::new()),
            instances: RwLock::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<VertexRegistry> {
        self.builder.registry()
    }

    pub fn builder(&self) -> Arc<GraphBuilder> {
        self.builder.clone()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Check that a template builds against the registry without running it
    pub fn validate(&self, template: &WorkflowTemplate) -> Result<(), FlowError> {
        self.builder.create_workflow(template).map(|_| ())
    }

    /// Register a template, replacing any previous one with the same id
    pub async fn register_template(&self, template: WorkflowTemplate) -> TemplateId {
        let id = template.id;
        tracing::info!("Registering template {} ({})", template.name, id);
        self.templates.write().await.insert(id, Arc::new(template));
        id
    }

    pub async fn get_template(&self, id: TemplateId) -> Option<Arc<WorkflowTemplate>> {
        self.templates.read().await.get(&id).cloned()
    }

    pub async fn list_templates(&self) -> Vec<Arc<WorkflowTemplate>> {
        self.templates.read().await.values().cloned().collect()
    }

    pub async fn remove_template(&self, id: TemplateId) -> Option<Arc<WorkflowTemplate>> {
        self.templates.write().await.remove(&id)
    }

    /// Create a fresh instance of a registered template
    pub async fn create_instance(
        &self,
        template_id: TemplateId,
        input: HashMap<String, Value>,
    ) -> Result<WorkflowInstance, FlowError> {
        let template = self
            .get_template(template_id)
            .await
            .ok_or_else(|| WorkflowError::NotFound(template_id.to_string()))?;

        Ok(self.instantiate(template, input))
    }

    /// Create an instance of a template that is not registered
    pub fn instantiate(
        &self,
        template: Arc<WorkflowTemplate>,
        input: HashMap<String, Value>,
    ) -> WorkflowInstance {
        let builder: Arc<dyn WorkflowBuilder> = self.builder.clone();
        WorkflowInstance::new(template, builder, input)
    }

    /// Execute an instance to completion and store its record.
    ///
    /// Execution failures are part of the record, not an `Err`.
    pub async fn run_instance(&self, mut instance: WorkflowInstance) -> InstanceRecord {
        let result = match self.config.instance_timeout_ms {
            Some(millis) => instance.execute_with_timeout(Duration::from_millis(millis)).await,
            None => instance.execute().await,
        };
        if let Err(e) = result {
            tracing::warn!("Instance {} ended with error: {}", instance.id(), e);
        }

        let record = instance.to_record();
        self.instances.write().await.insert(record.id, record.clone());
        record
    }

    /// Create and run an instance of a registered template
    pub async fn run_template(
        &self,
        template_id: TemplateId,
        input: HashMap<String, Value>,
    ) -> Result<InstanceRecord, FlowError> {
        let instance = self.create_instance(template_id, input).await?;
        Ok(self.run_instance(instance).await)
    }

    pub async fn get_instance(&self, id: Uuid) -> Result<InstanceRecord, FlowError> {
        self.instances
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| InstanceError::NotFound(id.to_string()).into())
    }

    pub async fn list_instances(&self) -> Vec<InstanceRecord> {
        let mut records: Vec<_> = self.instances.read().await.values().cloned().collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl WorkflowBuilder for WorkflowManager {
    fn create_workflow_from_nodes_edges(
        &self,
        nodes: &[VertexSpec],
        edges: &[Edge],
    ) -> Result<Box<dyn RunnableWorkflow>, FlowError> {
        self.builder.create_workflow_from_nodes_edges(nodes, edges)
    }

    fn create_workflow(&self, template: &WorkflowTemplate) -> Result<Box<dyn RunnableWorkflow>, FlowError> {
        self.builder.create_workflow(template)
    }
}

impl Default for WorkflowManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub max_parallel_vertices: usize,
    pub event_buffer_size: usize,
    pub stream_buffer_capacity: usize,
    /// Deadline applied by [`WorkflowManager::run_instance`]
    pub instance_timeout_ms: Option<u64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_vertices: 10,
            event_buffer_size: 1000,
            stream_buffer_capacity: STREAM_BUFFER_CAPACITY,
            instance_timeout_ms: None,
        }
    }
}
