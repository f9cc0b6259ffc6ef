//! Standard vertex library
//!
//! Collection of built-in vertices for common workflow steps

mod condition;
mod debug;
mod http;
mod template;
mod text;
mod time;
mod transform;

pub use condition::{evaluate_condition, ConditionVertex};
pub use debug::DebugVertex;
pub use http::HttpRequestVertex;
pub use template::{render_template, TemplateVertex};
pub use text::TextStreamVertex;
pub use time::DelayVertex;
pub use transform::{JsonParseVertex, JsonStringifyVertex};
use vertexruntime::VertexRegistry;

use std::sync::Arc;

/// Register all standard vertices with a registry
pub fn register_all(registry: &mut VertexRegistry) {
    registry.register(Arc::new(condition::ConditionVertexFactory));
    registry.register(Arc::new(debug::DebugVertexFactory));
    registry.register(Arc::new(http::HttpRequestVertexFactory));
    registry.register(Arc::new(template::TemplateVertexFactory));
    registry.register(Arc::new(text::TextStreamVertexFactory));
    registry.register(Arc::new(transform::JsonParseVertexFactory));
    registry.register(Arc::new(transform::JsonStringifyVertexFactory));
    registry.register(Arc::new(time::DelayVertexFactory));
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::HashMap;
    use tokio_util::sync::CancellationToken;
    use vertexcore::{
        EventBus, ExecutionId, SharedStream, StreamContext, StreamEmitter, Value, VertexContext,
        WorkflowContext,
    };

    /// A standalone vertex context plus the stream it writes to.
    pub fn context(
        vertex_id: &str,
        inputs: &[(&str, Value)],
        config: &[(&str, Value)],
    ) -> (VertexContext, SharedStream) {
        let bus = EventBus::default();
        let stream = StreamContext::new().shared();
        let events = bus.create_emitter(ExecutionId::nil(), vertex_id);
        let to_map = |pairs: &[(&str, Value)]| -> HashMap<String, Value> {
            pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
        };

        let ctx = VertexContext {
            vertex_id: vertex_id.to_string(),
            inputs: to_map(inputs),
            config: to_map(config),
            context: WorkflowContext::new().shared(),
            stream: StreamEmitter::new(vertex_id, stream.clone()),
            events,
            cancellation: CancellationToken::new(),
        };
        (ctx, stream)
    }
}
