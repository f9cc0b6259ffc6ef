use async_trait::async_trait;
use std::collections::HashMap;
use tokio::time::{sleep, Duration};
use vertexcore::{Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{VertexFactory, VertexTypeMetadata};

/// Delay execution for a configured duration, then pass inputs through
pub struct DelayVertex;

#[async_trait]
impl Vertex for DelayVertex {
    fn vertex_type(&self) -> &str {
        "time.delay"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let delay_ms = ctx
            .config
            .get("delay_ms")
            .and_then(|v| v.as_f64())
            .unwrap_or(1000.0) as u64;

        ctx.events.info(format!("Delaying for {}ms", delay_ms));

        tokio::select! {
            _ = sleep(Duration::from_millis(delay_ms)) => {}
            _ = ctx.cancellation.cancelled() => return Err(VertexError::Cancelled),
        }

        Ok(VertexOutput::new(Value::Object(ctx.inputs)))
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), VertexError> {
        match config.get("delay_ms") {
            Some(v) if v.as_f64().map_or(true, |ms| ms < 0.0) => Err(VertexError::Configuration(
                "delay_ms must be a non-negative number".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

pub struct DelayVertexFactory;

impl VertexFactory for DelayVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(DelayVertex))
    }

    fn vertex_type(&self) -> &str {
        "time.delay"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Delay execution for specified milliseconds".to_string(),
            category: "time".to_string(),
            inputs: vec![],
            outputs: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[tokio::test]
    async fn test_delay_passes_inputs_through() {
        let (ctx, _) = testing::context(
            "wait",
            &[("topic", Value::from("rust"))],
            &[("delay_ms", Value::Number(1.0))],
        );
        let output = DelayVertex.execute(ctx).await.unwrap();
        assert_eq!(output.value.as_object().unwrap().get("topic"), Some(&Value::from("rust")));
    }

    #[tokio::test]
    async fn test_delay_honours_cancellation() {
        let (ctx, _) = testing::context("wait", &[], &[("delay_ms", Value::Number(60_000.0))]);
        ctx.cancellation.cancel();
        let err = DelayVertex.execute(ctx).await.unwrap_err();
        assert!(matches!(err, VertexError::Cancelled));
    }

    #[test]
    fn test_delay_config_validation() {
        let mut config = HashMap::new();
        config.insert("delay_ms".to_string(), Value::Number(-5.0));
        assert!(DelayVertex.validate_config(&config).is_err());

        config.insert("delay_ms".to_string(), Value::from("soon"));
        assert!(DelayVertex.validate_config(&config).is_err());

        config.insert("delay_ms".to_string(), Value::Number(5.0));
        assert!(DelayVertex.validate_config(&config).is_ok());
    }
}
