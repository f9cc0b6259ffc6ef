use crate::executor::WorkflowBuilder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use vertexcore::{
    FlowError, InstanceError, StreamCallback, StreamCallbackError, StreamData, TemplateId, Value,
    VertexId, WorkflowTemplate,
};

/// Lifecycle of a workflow instance: `Created -> Running -> Completed | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl InstanceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, InstanceStatus::Completed | InstanceStatus::Failed)
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstanceStatus::Created => "created",
            InstanceStatus::Running => "running",
            InstanceStatus::Completed => "completed",
            InstanceStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Serializable snapshot of an instance. Timestamps are RFC 3339 strings,
/// unset fields are `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub id: Uuid,
    pub workflow_template_id: TemplateId,
    pub template_name: String,
    pub input_data: serde_json::Value,
    pub output_data: Option<serde_json::Value>,
    pub status: InstanceStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub node_outputs: serde_json::Value,
}

/// A single execution attempt of a workflow template.
pub struct WorkflowInstance {
    id: Uuid,
    workflow_template_id: TemplateId,
    template: Arc<WorkflowTemplate>,
    manager: Arc<dyn WorkflowBuilder>,
    input_data: HashMap<String, Value>,
    output_data: Option<Value>,
    status: InstanceStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    error_message: Option<String>,
    node_outputs: HashMap<VertexId, Value>,
    stream_subscribers: Vec<(VertexId, StreamCallback)>,
}

impl WorkflowInstance {
    pub fn new(
        template: Arc<WorkflowTemplate>,
        manager: Arc<dyn WorkflowBuilder>,
        input_data: HashMap<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_template_id: template.id,
            template,
            manager,
            input_data,
            output_data: None,
            status: InstanceStatus::Created,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            node_outputs: HashMap::new(),
            stream_subscribers: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workflow_template_id(&self) -> TemplateId {
        self.workflow_template_id
    }

    pub fn template(&self) -> &WorkflowTemplate {
        &self.template
    }

    pub fn status(&self) -> InstanceStatus {
        self.status
    }

    pub fn input_data(&self) -> &HashMap<String, Value> {
        &self.input_data
    }

    pub fn output_data(&self) -> Option<&Value> {
        self.output_data.as_ref()
    }

    pub fn node_outputs(&self) -> &HashMap<VertexId, Value> {
        &self.node_outputs
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Subscribe to a vertex's stream for the upcoming run.
    pub fn on_stream<F>(&mut self, vertex_id: impl Into<VertexId>, callback: F)
    where
        F: Fn(&StreamData) -> Result<(), StreamCallbackError> + Send + Sync + 'static,
    {
        self.stream_subscribers.push((vertex_id.into(), Arc::new(callback)));
    }

    /// Run the template once.
    ///
    /// A failure is recorded on the instance and also returned. Outputs are
    /// only captured when the whole run succeeds.
    pub async fn execute(&mut self) -> Result<Value, FlowError> {
        if self.status != InstanceStatus::Created {
            return Err(InstanceError::AlreadyExecuted(self.id.to_string()).into());
        }

        self.status = InstanceStatus::Running;
        self.started_at = Some(Utc::now());
        tracing::info!(
            "Executing instance {} of template {} ({})",
            self.id,
            self.template.name,
            self.workflow_template_id
        );

        match self.run().await {
            Ok((output, node_outputs)) => {
                self.output_data = Some(output.clone());
                self.node_outputs = node_outputs;
                self.status = InstanceStatus::Completed;
                self.completed_at = Some(Utc::now());
                tracing::info!("Instance {} completed", self.id);
                Ok(output)
            }
            Err(e) => {
                self.fail(e.to_string());
                Err(e)
            }
        }
    }

    /// [`WorkflowInstance::execute`] under a deadline; expiry fails the instance.
    pub async fn execute_with_timeout(&mut self, limit: Duration) -> Result<Value, FlowError> {
        let result = tokio::time::timeout(limit, self.execute()).await;
        match result {
            Ok(result) => result,
            Err(_) => {
                let error = InstanceError::TimedOut {
                    millis: whole_millis(limit),
                };
                self.fail(error.to_string());
                Err(error.into())
            }
        }
    }

    async fn run(&mut self) -> Result<(Value, HashMap<VertexId, Value>), FlowError> {
        let mut workflow = self.manager.create_workflow(&self.template)?;

        {
            let stream = workflow.stream();
            let mut stream = stream.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            for (vertex_id, callback) in &self.stream_subscribers {
                stream.add_stream_callback(vertex_id.clone(), callback.clone());
            }
        }

        let output = workflow.execute_workflow(self.input_data.clone()).await?;
        let node_outputs = workflow.context().read().await.get_outputs();
        Ok((output, node_outputs))
    }

    fn fail(&mut self, message: String) {
        tracing::error!("Instance {} failed: {}", self.id, message);
        self.status = InstanceStatus::Failed;
        self.error_message = Some(message);
        self.completed_at = Some(Utc::now());
    }

    pub fn to_record(&self) -> InstanceRecord {
        InstanceRecord {
            id: self.id,
            workflow_template_id: self.workflow_template_id,
            template_name: self.template.name.clone(),
            input_data: plain_map(&self.input_data),
            output_data: self.output_data.as_ref().map(Value::to_plain_json),
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            error_message: self.error_message.clone(),
            node_outputs: plain_map(&self.node_outputs),
        }
    }
}

/// Saturates instead of truncating limits past `u64::MAX` milliseconds.
fn whole_millis(limit: Duration) -> u64 {
    u64::try_from(limit.as_millis()).unwrap_or(u64::MAX)
}

fn plain_map(map: &HashMap<String, Value>) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), v.to_plain_json()))
            .collect(),
    )
}

impl fmt::Debug for WorkflowInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowInstance")
            .field("id", &self.id)
            .field("workflow_template_id", &self.workflow_template_id)
            .field("status", &self.status)
            .field("error_message", &self.error_message)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whole_millis_saturates() {
        assert_eq!(whole_millis(Duration::from_millis(20)), 20);
        assert_eq!(whole_millis(Duration::from_micros(1_500)), 1);
        assert_eq!(whole_millis(Duration::MAX), u64::MAX);
    }
}
