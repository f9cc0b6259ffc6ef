use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder, Result as ActixResult};
use actix_ws::Message;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use vertexcore::{FlowError, Value, WorkflowError, WorkflowTemplate};
use vertexruntime::{RuntimeConfig, VertexRegistry, WorkflowManager, SUBGRAPH_VERTEX_TYPE};

/// Application state shared across handlers
struct AppState {
    manager: Arc<WorkflowManager>,
}

/// Request body for instance creation
#[derive(Debug, Default, Deserialize)]
struct InstanceRequest {
    #[serde(default)]
    inputs: HashMap<String, serde_json::Value>,
}

/// Response for template creation
#[derive(Debug, Serialize)]
struct TemplateResponse {
    id: Uuid,
    message: String,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn not_found(what: &str, id: Uuid) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: format!("{} {} not found", what, id),
    })
}

/// Health check endpoint
#[get("/health")]
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "vertexflow"
    }))
}

/// List all templates
#[get("/api/templates")]
async fn list_templates(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let templates: Vec<_> = data
        .manager
        .list_templates()
        .await
        .iter()
        .map(|t| {
            serde_json::json!({
                "id": t.id,
                "name": t.name,
                "description": t.description,
                "vertices": t.nodes.len(),
                "edges": t.edges.len(),
            })
        })
        .collect();

    Ok(HttpResponse::Ok().json(templates))
}

/// Register a new template after checking it builds
#[post("/api/templates")]
async fn create_template(
    data: web::Data<AppState>,
    template: web::Json<WorkflowTemplate>,
) -> ActixResult<impl Responder> {
    let template = template.into_inner();

    if let Err(e) = data.manager.validate(&template) {
        warn!("Rejected template {}: {}", template.name, e);
        return Ok(HttpResponse::BadRequest().json(ErrorResponse { error: e.to_string() }));
    }

    info!("Creating template: {} ({})", template.name, template.id);
    let id = data.manager.register_template(template).await;

    Ok(HttpResponse::Created().json(TemplateResponse {
        id,
        message: "Template created successfully".to_string(),
    }))
}

/// Get a specific template
#[get("/api/templates/{id}")]
async fn get_template(data: web::Data<AppState>, path: web::Path<Uuid>) -> ActixResult<impl Responder> {
    let template_id = path.into_inner();

    match data.manager.get_template(template_id).await {
        Some(template) => Ok(HttpResponse::Ok().json(&*template)),
        None => Ok(not_found("Template", template_id)),
    }
}

/// Delete a template
#[actix_web::delete("/api/templates/{id}")]
async fn delete_template(data: web::Data<AppState>, path: web::Path<Uuid>) -> ActixResult<impl Responder> {
    let template_id = path.into_inner();

    match data.manager.remove_template(template_id).await {
        Some(_) => {
            info!("Deleted template: {}", template_id);
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "message": "Template deleted successfully"
            })))
        }
        None => Ok(not_found("Template", template_id)),
    }
}

/// Create and run an instance of a template
#[post("/api/templates/{id}/instances")]
async fn create_instance(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    req: Option<web::Json<InstanceRequest>>,
) -> ActixResult<impl Responder> {
    let template_id = path.into_inner();
    let inputs: HashMap<String, Value> = req
        .map(|r| r.into_inner())
        .unwrap_or_default()
        .inputs
        .into_iter()
        .map(|(k, v)| (k, Value::from_plain_json(v)))
        .collect();

    info!("Running template: {}", template_id);

    match data.manager.run_template(template_id, inputs).await {
        Ok(record) => {
            info!("Instance {} of template {} is {}", record.id, template_id, record.status);
            Ok(HttpResponse::Created().json(record))
        }
        Err(FlowError::Workflow(WorkflowError::NotFound(_))) => Ok(not_found("Template", template_id)),
        Err(e) => {
            error!("Template {} could not be run: {}", template_id, e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse { error: e.to_string() }))
        }
    }
}

/// List instance records
#[get("/api/instances")]
async fn list_instances(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    Ok(HttpResponse::Ok().json(data.manager.list_instances().await))
}

/// Get an instance record
#[get("/api/instances/{id}")]
async fn get_instance(data: web::Data<AppState>, path: web::Path<Uuid>) -> ActixResult<impl Responder> {
    let instance_id = path.into_inner();

    match data.manager.get_instance(instance_id).await {
        Ok(record) => Ok(HttpResponse::Ok().json(record)),
        Err(_) => Ok(not_found("Instance", instance_id)),
    }
}

/// WebSocket endpoint for real-time events
#[get("/api/events")]
async fn websocket_events(
    req: actix_web::HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let (res, mut session, mut msg_stream) = actix_ws::handle(&req, stream)?;

    info!("WebSocket client connected");

    let mut events = data.manager.subscribe_events();

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if let Ok(json) = serde_json::to_string(&event) {
                                if session.text(json).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("WebSocket client lagged, {} events dropped", skipped);
                        }
                        Err(_) => break,
                    }
                }

                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }

                else => break,
            }
        }

        info!("WebSocket client disconnected");
        let _ = session.close(None).await;
    });

    Ok(res)
}

/// List available vertex types
#[get("/api/vertices")]
async fn list_vertex_types(data: web::Data<AppState>) -> ActixResult<impl Responder> {
    let registry = data.manager.registry();

    let mut vertices: Vec<_> = registry
        .list_vertex_types()
        .iter()
        .map(|vertex_type| {
            let metadata = registry.get_metadata(vertex_type);
            serde_json::json!({
                "type": vertex_type,
                "description": metadata.as_ref().map(|m| m.description.clone()).unwrap_or_default(),
                "category": metadata.as_ref().map(|m| m.category.clone()).unwrap_or_default(),
            })
        })
        .collect();
    vertices.push(serde_json::json!({
        "type": SUBGRAPH_VERTEX_TYPE,
        "description": "Run a nested workflow and expose selected variables",
        "category": "core",
    }));

    Ok(HttpResponse::Ok().json(vertices))
}

fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(list_templates)
        .service(create_template)
        .service(get_template)
        .service(delete_template)
        .service(create_instance)
        .service(list_instances)
        .service(get_instance)
        .service(websocket_events)
        .service(list_vertex_types);
}

fn app_state() -> web::Data<AppState> {
    let mut registry = VertexRegistry::new();
    vertexnodes::register_all(&mut registry);

    let manager = WorkflowManager::with_registry(Arc::new(registry), RuntimeConfig::default());
    web::Data::new(AppState {
        manager: Arc::new(manager),
    })
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Starting Vertex Flow Server");

    let app_state = app_state();
    info!("✅ Manager initialized with standard vertices");

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .configure(configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test};
    use vertexcore::VertexSpec;

    fn greeting() -> WorkflowTemplate {
        let mut template = WorkflowTemplate::new("greeting");
        template.add_vertex(
            VertexSpec::new("render", "template.render").with_config("template", "Hello {{name}}"),
        );
        template
    }

    #[actix_web::test]
    async fn test_template_and_instance_roundtrip() {
        let state = app_state();
        let app = test::init_service(App::new().app_data(state.clone()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/api/templates")
            .set_json(greeting())
            .to_request();
        let created: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        let id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::post()
            .uri(&format!("/api/templates/{}/instances", id))
            .set_json(serde_json::json!({ "inputs": { "name": "Ada" } }))
            .to_request();
        let record: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(record["status"], "completed");
        assert_eq!(record["output_data"]["text"], "Hello Ada");

        let req = test::TestRequest::get()
            .uri(&format!("/api/instances/{}", record["id"].as_str().unwrap()))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_invalid_template_is_rejected() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;

        let mut template = greeting();
        template.add_vertex(VertexSpec::new("mystery", "llm.chat"));
        let req = test::TestRequest::post()
            .uri("/api/templates")
            .set_json(template)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_unknown_ids_are_404() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri(&format!("/api/templates/{}/instances", Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::get()
            .uri(&format!("/api/instances/{}", Uuid::new_v4()))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
