use async_trait::async_trait;
use std::collections::HashMap;
use vertexcore::{Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{PortDefinition, VertexFactory, VertexTypeMetadata};

/// Streams a text in fixed-size chunks; the last chunk carries the full text
/// and is marked final.
pub struct TextStreamVertex;

#[async_trait]
impl Vertex for TextStreamVertex {
    fn vertex_type(&self) -> &str {
        "text.stream"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let text = match ctx.inputs.get("text") {
            Some(value) => value.to_text(),
            None => ctx.require_config("text")?.to_text(),
        };
        let chunk_size = ctx
            .get_config_or("chunk_size", Value::Number(16.0))
            .as_f64()
            .unwrap_or(16.0)
            .max(1.0) as usize;

        let chars: Vec<char> = text.chars().collect();
        let chunks: Vec<String> = chars.chunks(chunk_size).map(|c| c.iter().collect()).collect();

        for (i, chunk) in chunks.iter().enumerate() {
            if ctx.cancellation.is_cancelled() {
                return Err(VertexError::Cancelled);
            }

            let mut metadata = HashMap::new();
            metadata.insert("index".to_string(), Value::Number(i as f64));
            if i + 1 == chunks.len() {
                ctx.stream.emit(Value::from(text.as_str()), true, Some(metadata));
            } else {
                ctx.stream.emit(Value::from(chunk.as_str()), false, Some(metadata));
            }
            tokio::task::yield_now().await;
        }

        if chunks.is_empty() {
            ctx.stream.finish(String::new());
        }

        Ok(VertexOutput::record()
            .with_field("text", text)
            .with_field("chunks", chunks.len() as f64))
    }
}

pub struct TextStreamVertexFactory;

impl VertexFactory for TextStreamVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(TextStreamVertex))
    }

    fn vertex_type(&self) -> &str {
        "text.stream"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Emit text incrementally on the vertex stream".to_string(),
            category: "text".to_string(),
            inputs: vec![PortDefinition::optional("text", "Text to stream, falls back to config")],
            outputs: vec![
                PortDefinition::required("text", "The full text"),
                PortDefinition::required("chunks", "Number of chunks emitted"),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_streams_chunks_then_final_text() {
        let (ctx, stream) = testing::context(
            "writer",
            &[("text", Value::from("hello world"))],
            &[("chunk_size", Value::Number(4.0))],
        );
        let output = TextStreamVertex.execute(ctx).await.unwrap();
        assert_eq!(output.value.as_object().unwrap().get("chunks"), Some(&Value::Number(3.0)));

        let stream = stream.lock().unwrap();
        let buffer = stream.get_stream_buffer("writer");
        let parts: Vec<String> = buffer.iter().map(|d| d.data.to_text()).collect();
        assert_eq!(parts, vec!["hell", "o wo", "hello world"]);
        assert!(buffer[2].is_final);
        assert_eq!(stream.get_final_output("writer"), Some(Value::from("hello world")));
    }

    #[tokio::test]
    async fn test_empty_text_is_final() {
        let (ctx, stream) = testing::context("writer", &[], &[("text", Value::from(""))]);
        TextStreamVertex.execute(ctx).await.unwrap();
        assert_eq!(stream.lock().unwrap().get_final_output("writer"), Some(Value::from("")));
    }
}
