// Shared test vertices for the runtime integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use vertexcore::{Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{RuntimeConfig, VertexFactory, VertexRegistry, WorkflowManager};

type Build = fn(&HashMap<String, Value>) -> Box<dyn Vertex>;

struct TestFactory {
    vertex_type: &'static str,
    build: Build,
}

impl VertexFactory for TestFactory {
    fn create(&self, config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok((self.build)(config))
    }

    fn vertex_type(&self) -> &str {
        self.vertex_type
    }
}

/// Outputs its `value` config
struct ConstVertex;

#[async_trait]
impl Vertex for ConstVertex {
    fn vertex_type(&self) -> &str {
        "test.const"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        Ok(VertexOutput::new(ctx.get_config_or("value", Value::Null)))
    }
}

/// Selects the branch named by its `branch` config
struct BranchVertex;

#[async_trait]
impl Vertex for BranchVertex {
    fn vertex_type(&self) -> &str {
        "test.branch"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let branch = ctx.require_config("branch")?.to_text();
        Ok(VertexOutput::new(branch.clone()).with_branch(branch))
    }
}

/// Always fails
struct FailVertex;

#[async_trait]
impl Vertex for FailVertex {
    fn vertex_type(&self) -> &str {
        "test.fail"
    }

    async fn execute(&self, _ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        Err(VertexError::ExecutionFailed("boom".to_string()))
    }
}

/// Returns all of its inputs as a record
struct EchoVertex;

#[async_trait]
impl Vertex for EchoVertex {
    fn vertex_type(&self) -> &str {
        "test.echo"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        Ok(VertexOutput::new(Value::Object(ctx.inputs)))
    }
}

/// Streams `chunks` numbered chunks, the last one final
struct StreamVertex;

#[async_trait]
impl Vertex for StreamVertex {
    fn vertex_type(&self) -> &str {
        "test.stream"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let chunks = ctx.get_config_or("chunks", Value::Number(3.0)).as_f64().unwrap_or(3.0) as usize;
        let mut text = String::new();
        for i in 0..chunks {
            text.push_str(&i.to_string());
            if i + 1 == chunks {
                ctx.stream.finish(text.clone());
            } else {
                ctx.stream.chunk(i.to_string());
            }
        }
        Ok(VertexOutput::new(text))
    }
}

/// Sleeps for `ms` milliseconds unless cancelled
struct SleepVertex;

#[async_trait]
impl Vertex for SleepVertex {
    fn vertex_type(&self) -> &str {
        "test.sleep"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let ms = ctx.get_config_or("ms", Value::Number(10.0)).as_f64().unwrap_or(10.0) as u64;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(VertexOutput::new("slept")),
            _ = ctx.cancellation.cancelled() => Err(VertexError::Cancelled),
        }
    }
}

/// Counts its visits in the shared run state
struct CounterVertex;

#[async_trait]
impl Vertex for CounterVertex {
    fn vertex_type(&self) -> &str {
        "test.counter"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let mut context = ctx.context.write().await;
        let visits = context.get_state("visits").and_then(|v| v.as_f64()).unwrap_or(0.0) + 1.0;
        context.set_state("visits", Value::Number(visits));
        Ok(VertexOutput::new(visits))
    }
}

pub fn registry() -> VertexRegistry {
    let factories: [(&'static str, Build); 7] = [
        ("test.const", |_| Box::new(ConstVertex)),
        ("test.branch", |_| Box::new(BranchVertex)),
        ("test.fail", |_| Box::new(FailVertex)),
        ("test.echo", |_| Box::new(EchoVertex)),
        ("test.stream", |_| Box::new(StreamVertex)),
        ("test.sleep", |_| Box::new(SleepVertex)),
        ("test.counter", |_| Box::new(CounterVertex)),
    ];

    let mut registry = VertexRegistry::new();
    for (vertex_type, build) in factories {
        registry.register(Arc::new(TestFactory { vertex_type, build }));
    }
    registry
}

pub fn manager() -> WorkflowManager {
    WorkflowManager::with_registry(Arc::new(registry()), RuntimeConfig::default())
}

pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .with_test_writer()
        .try_init();
}
