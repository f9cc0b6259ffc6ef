use async_trait::async_trait;
use std::collections::HashMap;
use vertexcore::{Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{PortDefinition, VertexFactory, VertexTypeMetadata};

/// HTTP request vertex
pub struct HttpRequestVertex {
    client: reqwest::Client,
}

impl HttpRequestVertex {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpRequestVertex {
    fn default() -> Self {
        Self::new()
    }
}

fn with_body(mut request: reqwest::RequestBuilder, body: Option<&Value>) -> reqwest::RequestBuilder {
    match body {
        Some(Value::String(text)) => request = request.body(text.clone()),
        Some(Value::Null) | None => {}
        Some(other) => request = request.json(&other.to_plain_json()),
    }
    request
}

#[async_trait]
impl Vertex for HttpRequestVertex {
    fn vertex_type(&self) -> &str {
        "http.request"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let url = match ctx.inputs.get("url") {
            Some(_) => ctx.require_str("url")?.to_string(),
            None => ctx
                .require_config("url")?
                .as_str()
                .ok_or_else(|| VertexError::Configuration("url must be a string".to_string()))?
                .to_string(),
        };
        let method = ctx
            .get_config_or("method", Value::from("GET"))
            .to_text()
            .to_uppercase();

        ctx.events.info(format!("{} {}", method, url));
        tracing::debug!(vertex = %ctx.vertex_id, "{} {}", method, url);

        let body = ctx.inputs.get("body");
        let request = match method.as_str() {
            "GET" => self.client.get(&url),
            "POST" => with_body(self.client.post(&url), body),
            "PUT" => with_body(self.client.put(&url), body),
            "DELETE" => self.client.delete(&url),
            _ => return Err(VertexError::Configuration(format!("Unsupported method: {}", method))),
        };

        let request = match ctx.config.get("headers") {
            Some(Value::Object(headers)) => headers.iter().fold(request, |req, (key, value)| {
                req.header(key.as_str(), value.to_text())
            }),
            _ => request,
        };

        let response = tokio::select! {
            response = request.send() => response
                .map_err(|e| VertexError::ExecutionFailed(format!("HTTP request failed: {}", e)))?,
            _ = ctx.cancellation.cancelled() => return Err(VertexError::Cancelled),
        };

        let status = response.status().as_u16();
        let headers: HashMap<String, Value> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_str().unwrap_or("").to_string())))
            .collect();

        let body_text = response
            .text()
            .await
            .map_err(|e| VertexError::ExecutionFailed(format!("Failed to read response: {}", e)))?;

        ctx.events.info(format!("Response status: {}", status));

        Ok(VertexOutput::record()
            .with_field("status", status as f64)
            .with_field("body", body_text)
            .with_field("headers", Value::Object(headers)))
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), VertexError> {
        if let Some(method) = config.get("method") {
            let method = method.to_text().to_uppercase();
            if !matches!(method.as_str(), "GET" | "POST" | "PUT" | "DELETE") {
                return Err(VertexError::Configuration(format!("Unsupported method: {}", method)));
            }
        }
        Ok(())
    }
}

pub struct HttpRequestVertexFactory;

impl VertexFactory for HttpRequestVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(HttpRequestVertex::new()))
    }

    fn vertex_type(&self) -> &str {
        "http.request"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Make HTTP requests".to_string(),
            category: "http".to_string(),
            inputs: vec![
                PortDefinition::optional("url", "Request URL, falls back to config"),
                PortDefinition::optional("body", "Request body for POST and PUT"),
            ],
            outputs: vec![
                PortDefinition::required("status", "HTTP status code"),
                PortDefinition::required("body", "Response body text"),
                PortDefinition::required("headers", "Response headers"),
            ],
        }
    }
}
