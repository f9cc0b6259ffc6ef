use async_trait::async_trait;
use std::collections::HashMap;
use vertexcore::{Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{PortDefinition, VertexFactory, VertexTypeMetadata};

const OPERATORS: [&str; 3] = ["==", "!=", "contains"];

/// Evaluate `key == "v"`, `key != "v"` or `key contains "v"` against a set
/// of values. A missing key never matches.
pub fn evaluate_condition(expr: &str, values: &HashMap<String, Value>) -> bool {
    let Some((key, op, expected)) = parse_expression(expr) else {
        return false;
    };
    let Some(actual) = values.get(key).map(Value::to_text) else {
        return false;
    };

    match op {
        "contains" => actual.contains(expected),
        "!=" => actual != expected,
        _ => actual == expected,
    }
}

/// Split `key OP "value"` into its parts. The operator must directly follow
/// the key, so operator text inside the value is left alone.
fn parse_expression(expr: &str) -> Option<(&str, &'static str, &str)> {
    let expr = expr.trim();
    let key_end = expr
        .find(|c: char| !(c.is_alphanumeric() || matches!(c, '_' | '.' | '-')))
        .unwrap_or(expr.len());
    let (key, rest) = expr.split_at(key_end);
    if key.is_empty() {
        return None;
    }

    let spaced = rest.starts_with(char::is_whitespace);
    let rest = rest.trim_start();
    let (op, value) = OPERATORS.iter().find_map(|op| {
        let value = rest.strip_prefix(*op)?;
        // `contains` is a word and needs separating from its neighbours
        if op.starts_with(char::is_alphabetic)
            && !(spaced && value.starts_with(|c: char| c.is_whitespace() || c == '"'))
        {
            return None;
        }
        Some((*op, value))
    })?;

    Some((key, op, value.trim().trim_matches('"')))
}

/// Branches on a comparison over its inputs: selects `"true"` or `"false"`
pub struct ConditionVertex;

#[async_trait]
impl Vertex for ConditionVertex {
    fn vertex_type(&self) -> &str {
        "condition.compare"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let expression = ctx.require_config("expression")?.to_text();
        let result = evaluate_condition(&expression, &ctx.inputs);

        tracing::debug!(vertex = %ctx.vertex_id, "{} => {}", expression, result);

        Ok(VertexOutput::record()
            .with_field("result", result)
            .with_branch(result.to_string()))
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), VertexError> {
        let expression = config
            .get("expression")
            .ok_or_else(|| VertexError::Configuration("Missing config: expression".to_string()))?
            .to_text();
        parse_expression(&expression)
            .map(|_| ())
            .ok_or_else(|| VertexError::Configuration(format!("Unsupported expression: {}", expression)))
    }
}

pub struct ConditionVertexFactory;

impl VertexFactory for ConditionVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(ConditionVertex))
    }

    fn vertex_type(&self) -> &str {
        "condition.compare"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Compare an input and take the \"true\" or \"false\" branch".to_string(),
            category: "logic".to_string(),
            inputs: vec![],
            outputs: vec![PortDefinition::required("result", "Outcome of the comparison")],
        }
    }
}
