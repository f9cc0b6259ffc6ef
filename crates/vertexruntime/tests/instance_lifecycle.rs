mod common;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use vertexcore::{
    FlowError, InstanceError, StreamCallbackError, StreamData, Value, VertexSpec, WorkflowError,
    WorkflowTemplate,
};
use vertexruntime::{InstanceStatus, RuntimeConfig, WorkflowManager};

fn single(vertex: VertexSpec) -> Arc<WorkflowTemplate> {
    let mut template = WorkflowTemplate::new("single");
    template.add_vertex(vertex);
    Arc::new(template)
}

fn input() -> HashMap<String, Value> {
    let mut input = HashMap::new();
    input.insert("topic".to_string(), Value::from("rust"));
    input
}

#[test]
fn test_fresh_instance_record() {
    let manager = common::manager();
    let template = single(VertexSpec::new("a", "test.const").with_config("value", "x"));
    let instance = manager.instantiate(template.clone(), input());

    assert_eq!(instance.status(), InstanceStatus::Created);
    assert_eq!(instance.workflow_template_id(), template.id);

    let json = serde_json::to_value(instance.to_record()).unwrap();
    assert_eq!(json["status"], "created");
    assert_eq!(json["input_data"]["topic"], "rust");
    assert!(json["output_data"].is_null());
    assert!(json["started_at"].is_null());
    assert!(json["completed_at"].is_null());
    assert!(json["error_message"].is_null());
    assert!(json["created_at"].is_string());
    assert_eq!(json["node_outputs"], serde_json::json!({}));
}

#[tokio::test]
async fn test_successful_execution() {
    common::init_tracing();
    let manager = common::manager();
    let template = single(VertexSpec::new("a", "test.const").with_config("value", "done"));
    let mut instance = manager.instantiate(template, input());

    let output = instance.execute().await.unwrap();

    assert_eq!(output, Value::from("done"));
    assert_eq!(instance.status(), InstanceStatus::Completed);
    assert_eq!(instance.output_data(), Some(&Value::from("done")));
    assert_eq!(instance.node_outputs().get("a"), Some(&Value::from("done")));
    assert!(instance.error_message().is_none());

    let started = instance.started_at().unwrap();
    let completed = instance.completed_at().unwrap();
    assert!(started >= instance.created_at());
    assert!(completed >= started);

    let json = serde_json::to_value(instance.to_record()).unwrap();
    assert_eq!(json["status"], "completed");
    assert_eq!(json["output_data"], "done");
    assert_eq!(json["node_outputs"]["a"], "done");
}

#[tokio::test]
async fn test_failed_execution_reraises() {
    let manager = common::manager();
    let mut template = WorkflowTemplate::new("failing");
    template.add_vertex(VertexSpec::new("ok", "test.const").with_config("value", 1i64));
    template.add_vertex(VertexSpec::new("bad", "test.fail"));
    template.connect("ok", "bad");
    let mut instance = manager.instantiate(Arc::new(template), HashMap::new());

    let err = instance.execute().await.unwrap_err();

    assert_eq!(instance.status(), InstanceStatus::Failed);
    assert_eq!(instance.error_message(), Some(err.to_string().as_str()));
    assert!(instance.completed_at().is_some());
    assert!(instance.output_data().is_none());
    assert!(instance.node_outputs().is_empty());
}

#[tokio::test]
async fn test_build_error_fails_instance() {
    let manager = common::manager();
    let template = single(VertexSpec::new("x", "llm.chat"));
    let mut instance = manager.instantiate(template, HashMap::new());

    let err = instance.execute().await.unwrap_err();

    assert!(matches!(err, FlowError::Workflow(WorkflowError::UnknownVertexType(_))));
    assert_eq!(instance.status(), InstanceStatus::Failed);
    assert_eq!(
        instance.error_message(),
        Some("Workflow error: Unknown vertex type: llm.chat")
    );
}

#[tokio::test]
async fn test_instance_runs_once() {
    let manager = common::manager();
    let template = single(VertexSpec::new("a", "test.const").with_config("value", 1i64));
    let mut instance = manager.instantiate(template, HashMap::new());

    instance.execute().await.unwrap();
    let err = instance.execute().await.unwrap_err();

    assert!(matches!(err, FlowError::Instance(InstanceError::AlreadyExecuted(_))));
    assert_eq!(instance.status(), InstanceStatus::Completed);
}

#[tokio::test]
async fn test_execute_with_timeout() {
    let manager = common::manager();
    let template = single(VertexSpec::new("slow", "test.sleep").with_config("ms", 5_000i64));
    let mut instance = manager.instantiate(template, HashMap::new());

    let err = instance
        .execute_with_timeout(Duration::from_millis(20))
        .await
        .unwrap_err();

    assert!(matches!(err, FlowError::Instance(InstanceError::TimedOut { millis: 20 })));
    assert_eq!(instance.status(), InstanceStatus::Failed);
    assert_eq!(instance.error_message(), Some("Execution timed out after 20ms"));
}

#[tokio::test]
async fn test_stream_subscription() {
    let manager = common::manager();
    let template = single(VertexSpec::new("llm", "test.stream").with_config("chunks", 2i64));
    let mut instance = manager.instantiate(template, HashMap::new());

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    instance.on_stream("llm", move |record: &StreamData| -> Result<(), StreamCallbackError> {
        sink.lock().unwrap().push((record.data.to_text(), record.is_final));
        Ok(())
    });
    instance.on_stream("llm", |_: &StreamData| -> Result<(), StreamCallbackError> {
        Err("subscriber down".into())
    });

    let output = instance.execute().await.unwrap();

    assert_eq!(output, Value::from("01"));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![("0".to_string(), false), ("01".to_string(), true)]
    );
}

#[tokio::test]
async fn test_manager_runs_registered_template() {
    let manager = common::manager();
    let mut template = WorkflowTemplate::new("greeting");
    template.add_vertex(VertexSpec::new("echo", "test.echo"));
    let template_id = manager.register_template(template).await;

    let record = manager.run_template(template_id, input()).await.unwrap();

    assert_eq!(record.status, InstanceStatus::Completed);
    assert_eq!(record.template_name, "greeting");
    assert_eq!(record.output_data, Some(serde_json::json!({ "topic": "rust" })));

    let stored = manager.get_instance(record.id).await.unwrap();
    assert_eq!(stored.id, record.id);
    assert_eq!(manager.list_instances().await.len(), 1);
}

#[tokio::test]
async fn test_manager_records_failures() {
    let manager = common::manager();
    let mut template = WorkflowTemplate::new("broken");
    template.add_vertex(VertexSpec::new("bad", "test.fail"));
    let template_id = manager.register_template(template).await;

    let record = manager.run_template(template_id, HashMap::new()).await.unwrap();

    assert_eq!(record.status, InstanceStatus::Failed);
    assert!(record.error_message.unwrap().contains("boom"));
}

#[tokio::test]
async fn test_manager_lookup_errors() {
    let manager = common::manager();

    let err = manager.run_template(Uuid::new_v4(), HashMap::new()).await.unwrap_err();
    assert!(matches!(err, FlowError::Workflow(WorkflowError::NotFound(_))));

    let err = manager.get_instance(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, FlowError::Instance(InstanceError::NotFound(_))));
}

#[tokio::test]
async fn test_manager_instance_timeout() {
    let config = RuntimeConfig {
        instance_timeout_ms: Some(20),
        ..RuntimeConfig::default()
    };
    let manager = WorkflowManager::with_registry(Arc::new(common::registry()), config);
    let template_id = manager
        .register_template({
            let mut template = WorkflowTemplate::new("slow");
            template.add_vertex(VertexSpec::new("slow", "test.sleep").with_config("ms", 5_000i64));
            template
        })
        .await;

    let record = manager.run_template(template_id, HashMap::new()).await.unwrap();
    assert_eq!(record.status, InstanceStatus::Failed);
    assert_eq!(record.error_message.as_deref(), Some("Execution timed out after 20ms"));
}

#[tokio::test]
async fn test_manager_template_registry() {
    let manager = common::manager();
    let template_id = manager.register_template(WorkflowTemplate::new("kept")).await;

    assert!(manager.get_template(template_id).await.is_some());
    assert_eq!(manager.list_templates().await.len(), 1);
    assert!(manager.remove_template(template_id).await.is_some());
    assert!(manager.get_template(template_id).await.is_none());
}

#[test]
fn test_manager_validate() {
    let manager = common::manager();
    let mut template = WorkflowTemplate::new("cyclic");
    template.add_vertex(VertexSpec::new("a", "test.echo"));
    template.add_vertex(VertexSpec::new("b", "test.echo"));
    template.connect("a", "b");
    template.connect("b", "a");

    let err = manager.validate(&template).unwrap_err();
    assert!(matches!(err, FlowError::Workflow(WorkflowError::CyclicDependency)));
}

#[tokio::test]
async fn test_manager_is_a_workflow_builder() {
    let manager: Arc<dyn vertexruntime::WorkflowBuilder> = Arc::new(common::manager());
    let template = single(VertexSpec::new("a", "test.const").with_config("value", "via manager"));
    let mut instance = vertexruntime::WorkflowInstance::new(template, manager, HashMap::new());

    assert_eq!(instance.execute().await.unwrap(), Value::from("via manager"));
}

#[tokio::test]
async fn test_unbounded_timeout_completes() {
    let manager = common::manager();
    let template = single(VertexSpec::new("a", "test.const").with_config("value", "quick"));
    let mut instance = manager.instantiate(template, HashMap::new());

    let output = instance.execute_with_timeout(Duration::MAX).await.unwrap();
    assert_eq!(output, Value::from("quick"));
    assert_eq!(instance.status(), InstanceStatus::Completed);
}

#[tokio::test]
async fn test_zero_event_buffer_is_usable() {
    let config = RuntimeConfig {
        event_buffer_size: 0,
        ..RuntimeConfig::default()
    };
    let manager = WorkflowManager::with_registry(Arc::new(common::registry()), config);
    let template_id = manager.register_template({
        let mut template = WorkflowTemplate::new("tiny");
        template.add_vertex(VertexSpec::new("a", "test.const").with_config("value", 1i64));
        template
    })
    .await;

    let record = manager.run_template(template_id, HashMap::new()).await.unwrap();
    assert_eq!(record.status, InstanceStatus::Completed);
}
