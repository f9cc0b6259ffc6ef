use async_trait::async_trait;
use std::collections::HashMap;
use vertexcore::{Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{PortDefinition, VertexFactory, VertexTypeMetadata};

/// Parse a JSON string into a value
pub struct JsonParseVertex;

#[async_trait]
impl Vertex for JsonParseVertex {
    fn vertex_type(&self) -> &str {
        "transform.json_parse"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let input = ctx.require_str("json")?;

        let parsed: serde_json::Value = serde_json::from_str(input)
            .map_err(|e| VertexError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        Ok(VertexOutput::record().with_field("parsed", Value::Json(parsed)))
    }
}

pub struct JsonParseVertexFactory;

impl VertexFactory for JsonParseVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(JsonParseVertex))
    }

    fn vertex_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortDefinition::required("json", "JSON text")],
            outputs: vec![PortDefinition::required("parsed", "Parsed document")],
        }
    }
}

/// Render a value as pretty-printed JSON
pub struct JsonStringifyVertex;

#[async_trait]
impl Vertex for JsonStringifyVertex {
    fn vertex_type(&self) -> &str {
        "transform.json_stringify"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let value = ctx.require_input("value")?;

        let json = serde_json::to_string_pretty(&value.to_plain_json())
            .map_err(|e| VertexError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        Ok(VertexOutput::record().with_field("json", json))
    }
}

pub struct JsonStringifyVertexFactory;

impl VertexFactory for JsonStringifyVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(JsonStringifyVertex))
    }

    fn vertex_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortDefinition::required("value", "Any value")],
            outputs: vec![PortDefinition::required("json", "JSON text")],
        }
    }
}
