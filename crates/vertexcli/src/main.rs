// crates/vertexcli/src/main.rs

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use vertexcore::{ExecutionEvent, Value, VertexEvent, VertexSpec, WorkflowTemplate};
use vertexruntime::{InstanceStatus, RuntimeConfig, VertexRegistry, WorkflowManager, SUBGRAPH_VERTEX_TYPE};

#[derive(Parser)]
#[command(name = "vertex")]
#[command(about = "Vertex Flow CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a workflow template file
    Run {
        /// Path to workflow template JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Input data as a JSON object
        #[arg(short, long)]
        input: Option<String>,

        /// Show verbose output
        #[arg(short, long)]
        verbose: bool,

        /// Fail the instance if it runs longer than this
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Validate a workflow template file
    Validate {
        /// Path to workflow template JSON file
        file: PathBuf,
    },

    /// List available vertex types
    Vertices,

    /// Create a new example workflow template
    Init {
        /// Output file path
        #[arg(short, long, default_value = "workflow.json")]
        output: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .init();
}

fn registry() -> VertexRegistry {
    let mut registry = VertexRegistry::new();
    vertexnodes::register_all(&mut registry);
    registry
}

fn load_template(file: &Path) -> Result<WorkflowTemplate> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid workflow template in {}", file.display()))
}

fn parse_input(input: Option<String>) -> Result<HashMap<String, Value>> {
    let Some(input) = input else {
        return Ok(HashMap::new());
    };
    match serde_json::from_str(&input)? {
        serde_json::Value::Object(obj) => Ok(obj
            .into_iter()
            .map(|(k, v)| (k, Value::from_plain_json(v)))
            .collect()),
        _ => bail!("Input must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { file, input, verbose, timeout_ms } => {
            init_tracing(verbose);
            run_workflow(&file, input, timeout_ms).await?;
        }

        Commands::Validate { file } => {
            init_tracing(false);
            validate_workflow(&file)?;
        }

        Commands::Vertices => {
            list_vertices();
        }

        Commands::Init { output } => {
            create_example_workflow(&output)?;
        }
    }

    Ok(())
}

fn print_event(event: ExecutionEvent) {
    match event {
        ExecutionEvent::WorkflowStarted { template_id, .. } => {
            println!("▶️  Workflow started ({})", template_id);
        }
        ExecutionEvent::VertexStarted { vertex_id, vertex_type, .. } => {
            println!("  ⚡ Starting vertex: {} ({})", vertex_id, vertex_type);
        }
        ExecutionEvent::VertexCompleted { vertex_id, branch, duration_ms, .. } => match branch {
            Some(branch) => println!("  ✅ Vertex {} completed in {}ms -> {}", vertex_id, duration_ms, branch),
            None => println!("  ✅ Vertex {} completed in {}ms", vertex_id, duration_ms),
        },
        ExecutionEvent::VertexFailed { vertex_id, error, .. } => {
            println!("  ❌ Vertex {} failed: {}", vertex_id, error);
        }
        ExecutionEvent::VertexSkipped { vertex_id, .. } => {
            println!("  ⏭️  Vertex {} skipped", vertex_id);
        }
        ExecutionEvent::VertexEvent { vertex_id, event, .. } => match event {
            VertexEvent::Info { message } => println!("     ℹ️  [{}] {}", vertex_id, message),
            VertexEvent::Warning { message } => println!("     ⚠️  [{}] {}", vertex_id, message),
            VertexEvent::Progress { percent, message: Some(msg) } => {
                println!("     📊 [{}] {}% - {}", vertex_id, percent, msg)
            }
            VertexEvent::Progress { percent, message: None } => {
                println!("     📊 [{}] {}%", vertex_id, percent)
            }
        },
        ExecutionEvent::StreamChunk { vertex_id, data, is_final, .. } => {
            if is_final {
                println!();
                println!("  📝 [{}] final: {}", vertex_id, data.to_text());
            } else {
                print!("{}", data.to_text());
                let _ = std::io::stdout().flush();
            }
        }
        ExecutionEvent::WorkflowCompleted { success, duration_ms, .. } => {
            if success {
                println!("✨ Workflow completed successfully in {}ms", duration_ms);
            } else {
                println!("💥 Workflow failed after {}ms", duration_ms);
            }
        }
    }
}

async fn run_workflow(file: &Path, input: Option<String>, timeout_ms: Option<u64>) -> Result<()> {
    println!("🚀 Loading workflow from: {}", file.display());

    let template = load_template(file)?;
    println!("📋 Workflow: {}", template.name);
    println!("   Vertices: {}", template.nodes.len());
    println!("   Edges: {}", template.edges.len());
    println!();

    let inputs = parse_input(input)?;

    let config = RuntimeConfig {
        instance_timeout_ms: timeout_ms,
        ..RuntimeConfig::default()
    };
    let manager = WorkflowManager::with_registry(Arc::new(registry()), config);

    // Subscribe to events for real-time output
    let mut events = manager.subscribe_events();
    let event_task = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(event);
        }
    });

    let instance = manager.instantiate(Arc::new(template), inputs);
    let record = manager.run_instance(instance).await;

    // Wait for events to finish printing
    tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    event_task.abort();

    println!();
    println!("📊 Instance record:");
    println!("{}", serde_json::to_string_pretty(&record)?);

    if record.status == InstanceStatus::Failed {
        bail!(
            "Instance {} failed: {}",
            record.id,
            record.error_message.unwrap_or_default()
        );
    }
    Ok(())
}

fn validate_workflow(file: &Path) -> Result<()> {
    println!("🔍 Validating workflow: {}", file.display());

    let template = load_template(file)?;
    let manager = WorkflowManager::with_registry(Arc::new(registry()), RuntimeConfig::default());
    manager.validate(&template)?;

    println!("✅ Workflow is valid:");
    println!("   Name: {}", template.name);
    println!("   Vertices: {}", template.nodes.len());
    println!("   Edges: {}", template.edges.len());

    Ok(())
}

fn list_vertices() {
    println!("📦 Available Vertex Types:");
    println!();

    let registry = registry();
    for vertex_type in registry.list_vertex_types() {
        if let Some(metadata) = registry.get_metadata(&vertex_type) {
            println!("  • {} ({})", vertex_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", vertex_type);
        }
    }
    println!("  • {} (core)", SUBGRAPH_VERTEX_TYPE);
    println!("    Run a nested workflow and expose selected variables");
}

fn example_template() -> WorkflowTemplate {
    let mut template = WorkflowTemplate::new("Example review workflow");
    template.description = Some("Checks a status and streams a reply on the matching branch".to_string());

    let check = template.add_vertex(
        VertexSpec::new("check", "condition.compare")
            .with_name("Check status")
            .with_config("expression", r#"status == "approved""#)
            .with_position(100.0, 100.0),
    );
    let accepted = template.add_vertex(
        VertexSpec::new("accepted", "template.render")
            .with_name("Accepted reply")
            .with_config("template", "Great news {{name}}, your request was approved.")
            .with_position(300.0, 50.0),
    );
    let rejected = template.add_vertex(
        VertexSpec::new("rejected", "template.render")
            .with_name("Rejected reply")
            .with_config("template", "Sorry {{name}}, your request is {{status}}.")
            .with_position(300.0, 150.0),
    );
    let reply = template.add_vertex(
        VertexSpec::new("reply", "text.stream")
            .with_name("Stream reply")
            .with_config("chunk_size", 8i64)
            .with_position(500.0, 100.0),
    );

    template.connect_when(&check, &accepted, "true");
    template.connect_when(&check, &rejected, "false");
    template.connect(&accepted, &reply);
    template.connect(&rejected, &reply);
    template
}

fn create_example_workflow(output: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&example_template())?;
    std::fs::write(output, json)?;

    println!("✨ Created example workflow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  vertex run --file {} --input '{{\"name\": \"Ada\", \"status\": \"approved\"}}'",
        output.display()
    );

    Ok(())
}
