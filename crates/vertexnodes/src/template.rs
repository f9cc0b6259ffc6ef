use async_trait::async_trait;
use std::collections::HashMap;
use vertexcore::{FieldAccessible, Value, Vertex, VertexContext, VertexError, VertexOutput};
use vertexruntime::{PortDefinition, VertexFactory, VertexTypeMetadata};

/// Interpolate `{{name}}` placeholders with values. Dotted names such as
/// `{{judge.score}}` read record fields.
///
/// Returns the rendered text and the placeholders that had no value; those
/// are left in the text untouched.
pub fn render_template(template: &str, values: &HashMap<String, Value>) -> (String, Vec<String>) {
    let mut rendered = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        rendered.push_str(&rest[..start]);

        let placeholder = &rest[start..start + len + 4];
        let name = rest[start + 2..start + 2 + len].trim();
        match lookup(name, values) {
            Some(value) => rendered.push_str(&value.to_text()),
            None => {
                missing.push(name.to_string());
                rendered.push_str(placeholder);
            }
        }
        rest = &rest[start + len + 4..];
    }

    rendered.push_str(rest);
    (rendered, missing)
}

fn lookup(path: &str, values: &HashMap<String, Value>) -> Option<Value> {
    let mut parts = path.split('.');
    let root = values.get(parts.next()?)?.clone();
    parts.try_fold(root, |value, field| value.field(field))
}

/// Renders its `template` config against its inputs
pub struct TemplateVertex;

#[async_trait]
impl Vertex for TemplateVertex {
    fn vertex_type(&self) -> &str {
        "template.render"
    }

    async fn execute(&self, ctx: VertexContext) -> Result<VertexOutput, VertexError> {
        let template = ctx.require_config("template")?.to_text();
        let strict = ctx
            .get_config_or("strict", Value::Bool(false))
            .as_bool()
            .unwrap_or(false);

        let (text, missing) = render_template(&template, &ctx.inputs);
        if !missing.is_empty() {
            if strict {
                return Err(VertexError::MissingInput(missing.join(", ")));
            }
            ctx.events.warn(format!("Unresolved placeholders: {}", missing.join(", ")));
        }

        Ok(VertexOutput::record().with_field("text", text))
    }

    fn validate_config(&self, config: &HashMap<String, Value>) -> Result<(), VertexError> {
        match config.get("template") {
            Some(_) => Ok(()),
            None => Err(VertexError::Configuration("Missing config: template".to_string())),
        }
    }
}

pub struct TemplateVertexFactory;

impl VertexFactory for TemplateVertexFactory {
    fn create(&self, _config: &HashMap<String, Value>) -> Result<Box<dyn Vertex>, VertexError> {
        Ok(Box::new(TemplateVertex))
    }

    fn vertex_type(&self) -> &str {
        "template.render"
    }

    fn metadata(&self) -> VertexTypeMetadata {
        VertexTypeMetadata {
            description: "Fill {{name}} placeholders from inputs".to_string(),
            category: "text".to_string(),
            inputs: vec![],
            outputs: vec![PortDefinition::required("text", "Rendered text")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn test_render() {
        let mut values = HashMap::new();
        values.insert("name".to_string(), Value::from("Ada"));
        let mut judge = HashMap::new();
        judge.insert("score".to_string(), Value::Number(9.0));
        values.insert("judge".to_string(), Value::Object(judge));

        let (text, missing) = render_template("Hi {{ name }}, score {{judge.score}}{{x}}!", &values);
        assert_eq!(text, "Hi Ada, score 9{{x}}!");
        assert_eq!(missing, vec!["x"]);
    }

    #[test]
    fn test_unterminated_placeholder() {
        let (text, missing) = render_template("open {{ never", &HashMap::new());
        assert_eq!(text, "open {{ never");
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_strict_mode() {
        let (ctx, _) = testing::context(
            "prompt",
            &[],
            &[("template", Value::from("{{topic}}")), ("strict", Value::Bool(true))],
        );
        let err = TemplateVertex.execute(ctx).await.unwrap_err();
        assert!(matches!(err, VertexError::MissingInput(name) if name == "topic"));
    }
}
