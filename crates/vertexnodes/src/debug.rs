use async_trait::async_trait;
use std::collections::HashMap;
use vertexcore::{Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{PortDefinition, VertexFactory, VertexTypeMetadata};

/// Logs its inputs and passes the message through
pub struct DebugVertex;

#[async_trait]
impl Vertex for DebugVertex {
    fn vertex_type(&self) -> &str {
        "debug.log"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let message = ctx
            .inputs
            .get("message")
            .map(Value::to_text)
            .unwrap_or_else(|| "(no message)".to_string());

        tracing::info!(vertex = %ctx.vertex_id, "DEBUG: {}", message);
        ctx.events.info(format!("DEBUG: {}", message));

        let mut keys: Vec<&String> = ctx.inputs.keys().collect();
        keys.sort();
        for key in keys {
            ctx.events.info(format!("  {}: {}", key, ctx.inputs[key].to_text()));
        }

        Ok(VertexOutput::record().with_field("message", message))
    }
}

pub struct DebugVertexFactory;

impl VertexFactory for DebugVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(DebugVertex))
    }

    fn vertex_type(&self) -> &str {
        "debug.log"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
            inputs: vec![PortDefinition::optional("message", "Text to log")],
            outputs: vec![PortDefinition::required("message", "The logged text")],
        }
    }
}
