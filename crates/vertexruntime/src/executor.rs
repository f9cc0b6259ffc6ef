use crate::registry::VertexRegistry;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::BoxFuture;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError};
use std::time::Instant;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use vertexcore::{
    Edge, EdgeType, ErrorHandling, EventBus, ExecutionEvent, ExecutionId, FieldAccessible,
    FlowError, SharedContext, SharedStream, StreamContext, StreamEmitter, SubgraphContext,
    TemplateId, Value, Vertex, VertexContext, VertexError, VertexId, VertexOutput, VertexSpec,
    WorkflowContext, WorkflowError, WorkflowSettings, WorkflowTemplate,
};

/// Vertex type executed natively by the graph: runs an inline nested workflow.
pub const SUBGRAPH_VERTEX_TYPE: &str = "subgraph";

/// A materialized workflow that can be run once.
#[async_trait]
pub trait RunnableWorkflow: Send + Sync {
    async fn execute_workflow(&mut self, input: HashMap<String, Value>) -> Result<Value, FlowError>;

    /// Outputs and state of the run
    fn context(&self) -> SharedContext;

    /// Streamed output of the run
    fn stream(&self) -> SharedStream;
}

/// Turns template declarations into runnable workflows.
pub trait WorkflowBuilder: Send + Sync {
    fn create_workflow_from_nodes_edges(
        &self,
        nodes: &[VertexSpec],
        edges: &[Edge],
    ) -> Result<Box<dyn RunnableWorkflow>, FlowError>;

    fn create_workflow(&self, template: &WorkflowTemplate) -> Result<Box<dyn RunnableWorkflow>, FlowError> {
        self.create_workflow_from_nodes_edges(&template.nodes, &template.edges)
    }
}

/// Builds [`GraphWorkflow`]s against a vertex registry.
#[derive(Clone)]
pub struct GraphBuilder {
    registry: Arc<VertexRegistry>,
    event_bus: Arc<EventBus>,
    max_parallel: usize,
    stream_capacity: usize,
}

impl GraphBuilder {
    pub fn new(
        registry: Arc<VertexRegistry>,
        event_bus: Arc<EventBus>,
        max_parallel: usize,
        stream_capacity: usize,
    ) -> Self {
        Self {
            registry,
            event_bus,
            max_parallel: max_parallel.max(1),
            stream_capacity,
        }
    }

    pub fn registry(&self) -> &Arc<VertexRegistry> {
        &self.registry
    }

    /// Validate declarations and build the dependency graph
    pub fn build(
        &self,
        template_id: TemplateId,
        nodes: &[VertexSpec],
        edges: &[Edge],
        settings: WorkflowSettings,
    ) -> Result<GraphWorkflow, WorkflowError> {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        let mut specs = HashMap::new();

        for spec in nodes {
            if index.contains_key(&spec.id) {
                return Err(WorkflowError::Invalid(format!("Duplicate vertex id: {}", spec.id)));
            }
            if spec.vertex_type == SUBGRAPH_VERTEX_TYPE {
                let definition = SubgraphDefinition::from_config(&spec.config)?;
                self.build(template_id, &definition.nodes, &definition.edges, settings.clone())?;
            } else if !self.registry.contains(&spec.vertex_type) {
                return Err(WorkflowError::UnknownVertexType(spec.vertex_type.clone()));
            }

            let idx = graph.add_node(spec.id.clone());
            index.insert(spec.id.clone(), idx);
            specs.insert(spec.id.clone(), spec.clone());
        }

        for edge in edges {
            let from = index
                .get(&edge.source)
                .ok_or_else(|| WorkflowError::VertexNotFound(edge.source.clone()))?;
            let to = index
                .get(&edge.target)
                .ok_or_else(|| WorkflowError::VertexNotFound(edge.target.clone()))?;

            graph.add_edge(*from, *to, edge.edge_type.clone());
        }

        // Self-loops count as cycles here
        let order = toposort(&graph, None)
            .map_err(|_| WorkflowError::CyclicDependency)?
            .into_iter()
            .map(|idx| graph[idx].clone())
            .collect();

        Ok(GraphWorkflow {
            template_id,
            specs,
            order,
            graph,
            index,
            settings,
            builder: self.clone(),
            context: WorkflowContext::new().shared(),
            stream: StreamContext::with_capacity(self.stream_capacity).shared(),
        })
    }
}

impl WorkflowBuilder for GraphBuilder {
    fn create_workflow_from_nodes_edges(
        &self,
        nodes: &[VertexSpec],
        edges: &[Edge],
    ) -> Result<Box<dyn RunnableWorkflow>, FlowError> {
        let workflow = self.build(Uuid::nil(), nodes, edges, WorkflowSettings::default())?;
        Ok(Box::new(workflow))
    }

    fn create_workflow(&self, template: &WorkflowTemplate) -> Result<Box<dyn RunnableWorkflow>, FlowError> {
        let workflow = self.build(
            template.id,
            &template.nodes,
            &template.edges,
            template.settings.clone(),
        )?;
        Ok(Box::new(workflow))
    }
}

/// How a vertex ended up in this run
#[derive(Debug, Clone)]
enum Resolution {
    Completed { branch: Option<String> },
    Failed,
    Skipped,
}

/// Executes a workflow as a DAG of typed edges with parallel execution
pub struct GraphWorkflow {
    template_id: TemplateId,
    specs: HashMap<VertexId, VertexSpec>,
    order: Vec<VertexId>,
    graph: DiGraph<VertexId, EdgeType>,
    index: HashMap<VertexId, NodeIndex>,
    settings: WorkflowSettings,
    builder: GraphBuilder,
    context: SharedContext,
    stream: SharedStream,
}

impl GraphWorkflow {
    /// Vertex ids in a valid execution order
    pub fn execution_order(&self) -> &[VertexId] {
        &self.order
    }

    /// Execute the workflow and return its output
    pub async fn run(&mut self, input: HashMap<String, Value>) -> Result<Value, FlowError> {
        let execution_id = ExecutionId::new_v4();
        let start_time = Instant::now();
        let event_bus = self.builder.event_bus.clone();

        event_bus.emit(ExecutionEvent::WorkflowStarted {
            execution_id,
            template_id: self.template_id,
            timestamp: Utc::now(),
        });

        tracing::info!(
            "Starting workflow execution {} (template {}, {} vertices)",
            execution_id,
            self.template_id,
            self.order.len()
        );

        let result = self.execute_graph(execution_id, input).await;

        let duration_ms = start_time.elapsed().as_millis() as u64;
        match &result {
            Ok(_) => tracing::info!("Workflow execution {} completed in {}ms", execution_id, duration_ms),
            Err(e) => tracing::error!("Workflow execution {} failed after {}ms: {}", execution_id, duration_ms, e),
        }

        event_bus.emit(ExecutionEvent::WorkflowCompleted {
            execution_id,
            success: result.is_ok(),
            duration_ms,
            timestamp: Utc::now(),
        });

        result
    }

    async fn execute_graph(
        &self,
        execution_id: ExecutionId,
        input: HashMap<String, Value>,
    ) -> Result<Value, FlowError> {
        let event_bus = &self.builder.event_bus;

        // Create vertex instances
        let mut instances: HashMap<VertexId, Box<dyn Vertex>> = HashMap::new();
        for vertex_id in &self.order {
            let spec = &self.specs[vertex_id];
            if spec.vertex_type == SUBGRAPH_VERTEX_TYPE {
                continue;
            }

            let mut vertex = self.builder.registry.create_vertex(&spec.vertex_type, &spec.config)?;
            if let Err(e) = vertex.initialize().await {
                tracing::error!("Failed to initialize vertex {}: {}", vertex_id, e);
                return Err(FlowError::Execution(format!(
                    "Vertex {} initialization failed: {}",
                    vertex_id, e
                )));
            }
            instances.insert(vertex_id.clone(), vertex);
        }

        let cancellation = CancellationToken::new();
        let max_parallel = self
            .builder
            .max_parallel
            .min(self.settings.max_parallel_vertices)
            .max(1);
        let mut resolved: HashMap<VertexId, Resolution> = HashMap::new();
        let mut scheduled: HashSet<VertexId> = HashSet::new();
        let mut running = JoinSet::new();

        loop {
            let ready = self.advance(execution_id, &mut resolved, &scheduled);

            // Spawn tasks for ready vertices up to parallel limit
            for vertex_id in ready {
                if running.len() >= max_parallel {
                    break;
                }

                let spec = self
                    .specs
                    .get(&vertex_id)
                    .ok_or_else(|| WorkflowError::VertexNotFound(vertex_id.clone()))?;
                let inputs = self.collect_inputs(&vertex_id, &input, &resolved).await;
                let events = event_bus.create_emitter(execution_id, vertex_id.clone());

                let ctx = VertexContext {
                    vertex_id: vertex_id.clone(),
                    inputs,
                    config: spec.config.clone(),
                    context: self.context.clone(),
                    stream: StreamEmitter::new(vertex_id.clone(), self.stream.clone())
                        .with_events(events.clone()),
                    events,
                    cancellation: cancellation.child_token(),
                };

                event_bus.emit(ExecutionEvent::VertexStarted {
                    execution_id,
                    vertex_id: vertex_id.clone(),
                    vertex_type: spec.vertex_type.clone(),
                    timestamp: Utc::now(),
                });
                tracing::debug!("Starting vertex {} ({})", vertex_id, spec.vertex_type);

                let task: BoxFuture<'static, Result<VertexOutput, VertexError>> =
                    if spec.vertex_type == SUBGRAPH_VERTEX_TYPE {
                        run_subgraph(
                            self.builder.clone(),
                            self.template_id,
                            self.settings.clone(),
                            ctx,
                        )
                    } else {
                        let vertex = instances
                            .remove(&vertex_id)
                            .ok_or_else(|| WorkflowError::VertexNotFound(vertex_id.clone()))?;
                        Box::pin(async move { vertex.execute(ctx).await })
                    };

                let deadline = self.settings.max_execution_time_ms;
                let id = vertex_id.clone();
                scheduled.insert(vertex_id);

                running.spawn(async move {
                    let start = Instant::now();
                    let result = match deadline {
                        Some(millis) => timeout(Duration::from_millis(millis), task)
                            .await
                            .unwrap_or_else(|_| Err(VertexError::Timeout { millis })),
                        None => task.await,
                    };
                    (id, result, start.elapsed().as_millis() as u64)
                });
            }

            // If nothing is running and nothing is ready, we're done
            if running.is_empty() {
                break;
            }

            // Wait for next task to complete
            if let Some(joined) = running.join_next().await {
                let (vertex_id, result, duration_ms) =
                    joined.map_err(|e| FlowError::Execution(format!("Task join error: {}", e)))?;

                match result {
                    Ok(output) => {
                        tracing::debug!("Vertex {} completed in {}ms", vertex_id, duration_ms);

                        self.context
                            .write()
                            .await
                            .set_output(vertex_id.clone(), output.value.clone());

                        event_bus.emit(ExecutionEvent::VertexCompleted {
                            execution_id,
                            vertex_id: vertex_id.clone(),
                            output: output.value,
                            branch: output.branch.clone(),
                            duration_ms,
                            timestamp: Utc::now(),
                        });

                        resolved.insert(vertex_id, Resolution::Completed { branch: output.branch });
                    }
                    Err(e) => {
                        tracing::error!("Vertex {} failed: {}", vertex_id, e);

                        event_bus.emit(ExecutionEvent::VertexFailed {
                            execution_id,
                            vertex_id: vertex_id.clone(),
                            error: e.to_string(),
                            timestamp: Utc::now(),
                        });

                        match self.settings.on_error {
                            ErrorHandling::StopWorkflow => {
                                cancellation.cancel();
                                running.abort_all();
                                return Err(FlowError::Execution(format!(
                                    "Vertex {} failed: {}",
                                    vertex_id, e
                                )));
                            }
                            ErrorHandling::ContinueOnError => {
                                resolved.insert(vertex_id, Resolution::Failed);
                            }
                        }
                    }
                }
            }
        }

        Ok(self.workflow_output(&resolved).await)
    }

    /// Resolve skipped vertices and return those ready to run.
    ///
    /// A vertex is ready once every upstream vertex is resolved and at least
    /// one incoming edge is traversable; when none is, it is skipped. Walking
    /// in topological order lets skips cascade in a single pass.
    fn advance(
        &self,
        execution_id: ExecutionId,
        resolved: &mut HashMap<VertexId, Resolution>,
        scheduled: &HashSet<VertexId>,
    ) -> Vec<VertexId> {
        let mut ready = Vec::new();

        for vertex_id in &self.order {
            if resolved.contains_key(vertex_id) || scheduled.contains(vertex_id) {
                continue;
            }

            let mut has_incoming = false;
            let mut all_resolved = true;
            let mut any_active = false;
            for edge in self.graph.edges_directed(self.index[vertex_id], Direction::Incoming) {
                has_incoming = true;
                match resolved.get(&self.graph[edge.source()]) {
                    None => {
                        all_resolved = false;
                        break;
                    }
                    Some(Resolution::Completed { branch }) => {
                        if edge.weight().is_satisfied_by(branch.as_deref()) {
                            any_active = true;
                        }
                    }
                    Some(_) => {}
                }
            }

            if !has_incoming || (all_resolved && any_active) {
                ready.push(vertex_id.clone());
            } else if all_resolved {
                tracing::debug!("Skipping vertex {}: no traversable incoming edge", vertex_id);
                self.builder.event_bus.emit(ExecutionEvent::VertexSkipped {
                    execution_id,
                    vertex_id: vertex_id.clone(),
                    timestamp: Utc::now(),
                });
                resolved.insert(vertex_id.clone(), Resolution::Skipped);
            }
        }

        ready
    }

    /// Workflow input overlaid with the outputs of active upstream vertices.
    ///
    /// Record outputs contribute their fields; every output is also
    /// available under its vertex id.
    async fn collect_inputs(
        &self,
        vertex_id: &str,
        input: &HashMap<String, Value>,
        resolved: &HashMap<VertexId, Resolution>,
    ) -> HashMap<String, Value> {
        let mut inputs = input.clone();
        let context = self.context.read().await;

        for edge in self.graph.edges_directed(self.index[vertex_id], Direction::Incoming) {
            let source = &self.graph[edge.source()];
            let active = matches!(
                resolved.get(source),
                Some(Resolution::Completed { branch }) if edge.weight().is_satisfied_by(branch.as_deref())
            );
            if !active {
                continue;
            }

            if let Some(output) = context.get_output(source) {
                for name in output.field_names() {
                    if let Some(value) = output.field(&name) {
                        inputs.insert(name, value);
                    }
                }
                inputs.insert(source.clone(), output);
            }
        }

        inputs
    }

    /// The single completed sink's output, or a record of all completed sinks.
    async fn workflow_output(&self, resolved: &HashMap<VertexId, Resolution>) -> Value {
        let context = self.context.read().await;
        let sinks: Vec<&VertexId> = self
            .order
            .iter()
            .filter(|id| {
                self.graph
                    .edges_directed(self.index[*id], Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .filter(|id| matches!(resolved.get(*id), Some(Resolution::Completed { .. })))
            .collect();

        match sinks.as_slice() {
            [] => Value::Null,
            [only] => context.get_output(only).unwrap_or_default(),
            many => Value::Object(
                many.iter()
                    .filter_map(|id| context.get_output(id).map(|value| ((*id).clone(), value)))
                    .collect(),
            ),
        }
    }

    /// Take the run's stream context out of the workflow.
    fn into_stream_context(self) -> StreamContext {
        match Arc::try_unwrap(self.stream) {
            Ok(stream) => stream.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(_) => {
                tracing::warn!("Stream context still shared after run; starting a fresh one");
                StreamContext::new()
            }
        }
    }
}

#[async_trait]
impl RunnableWorkflow for GraphWorkflow {
    async fn execute_workflow(&mut self, input: HashMap<String, Value>) -> Result<Value, FlowError> {
        self.run(input).await
    }

    fn context(&self) -> SharedContext {
        self.context.clone()
    }

    fn stream(&self) -> SharedStream {
        self.stream.clone()
    }
}

/// Inline nested workflow carried in a `subgraph` vertex's config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubgraphDefinition {
    pub nodes: Vec<VertexSpec>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub expose: Vec<ExposeSpec>,
}

/// One variable a subgraph publishes to its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExposeSpec {
    pub vertex: VertexId,
    #[serde(default)]
    pub variable: Option<String>,
    #[serde(default, rename = "as")]
    pub exposed_as: Option<String>,
}

impl SubgraphDefinition {
    pub fn new(nodes: Vec<VertexSpec>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            expose: Vec::new(),
        }
    }

    pub fn expose(
        mut self,
        vertex: impl Into<VertexId>,
        variable: Option<&str>,
        exposed_as: Option<&str>,
    ) -> Self {
        self.expose.push(ExposeSpec {
            vertex: vertex.into(),
            variable: variable.map(str::to_string),
            exposed_as: exposed_as.map(str::to_string),
        });
        self
    }

    /// Wrap as a `subgraph` vertex declaration.
    pub fn into_vertex(self, id: impl Into<VertexId>) -> Result<VertexSpec, FlowError> {
        let config = serde_json::to_value(&self)?;
        Ok(VertexSpec::new(id, SUBGRAPH_VERTEX_TYPE).with_config("subgraph", Value::Json(config)))
    }

    fn from_config(config: &HashMap<String, Value>) -> Result<Self, WorkflowError> {
        let raw = config.get("subgraph").ok_or_else(|| {
            WorkflowError::Invalid("subgraph vertex requires a 'subgraph' config entry".to_string())
        })?;
        serde_json::from_value(raw.to_plain_json())
            .map_err(|e| WorkflowError::Invalid(format!("Invalid subgraph definition: {}", e)))
    }
}

/// Run a `subgraph` vertex: execute the inner workflow with the vertex's
/// inputs and return the variables it exposes.
fn run_subgraph(
    builder: GraphBuilder,
    template_id: TemplateId,
    settings: WorkflowSettings,
    ctx: VertexContext,
) -> BoxFuture<'static, Result<VertexOutput, VertexError>> {
    Box::pin(async move {
        let definition = SubgraphDefinition::from_config(&ctx.config)
            .map_err(|e| VertexError::Configuration(e.to_string()))?;
        let inner = builder
            .build(template_id, &definition.nodes, &definition.edges, settings)
            .map_err(|e| VertexError::Configuration(e.to_string()))?;

        ctx.events.info(format!(
            "Entering subgraph with {} vertices",
            definition.nodes.len()
        ));

        // Nested runs share the outer execution id and emit no workflow-level events.
        inner
            .execute_graph(ctx.events.execution_id(), ctx.inputs.clone())
            .await
            .map_err(|e| VertexError::ExecutionFailed(format!("Subgraph failed: {}", e)))?;

        let inner_context = inner.context.clone();
        let mut subgraph = SubgraphContext::with_stream(&ctx.context, inner.into_stream_context());
        subgraph.absorb(&*inner_context.read().await);

        for entry in &definition.expose {
            subgraph.expose_variable(
                &entry.vertex,
                entry.variable.as_deref(),
                entry.exposed_as.as_deref(),
            );
        }

        let mut output = VertexOutput::new(Value::Object(subgraph.get_exposed_variables()));
        let mut streamed = subgraph.stream_context().streamed_vertices();
        streamed.sort();
        output.metadata.custom.insert(
            "streamed_vertices".to_string(),
            Value::Array(streamed.into_iter().map(Value::String).collect()),
        );
        Ok(output)
    })
}
