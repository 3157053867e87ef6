use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};

use workflow_field::{config, init_telemetry, RawValue, StateField, Workflow, WorkflowFieldConfig};

#[derive(Parser)]
#[command(name = "workflow-field")]
#[command(about = "Inspect workflow-backed state fields and their transition logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the choices, default and storage snapshot of a workflow's state field
    Describe {
        /// Workflow definition (TOML)
        workflow: PathBuf,
    },
    /// Decode a stored value against a workflow
    Decode {
        /// Workflow definition (TOML)
        workflow: PathBuf,
        /// Stored state name; omit to resolve the default
        value: Option<String>,
    },
    /// List logged transitions for one record
    History {
        #[arg(long, help = "Model label, e.g. tracker.Ticket")]
        model: String,
        #[arg(long, help = "Record id")]
        id: i64,
    },
    /// Fill in missing from/to states of logged transitions
    RebuildLogStates {
        /// Workflow definition (TOML)
        workflow: PathBuf,
        #[arg(long, help = "Model label, e.g. tracker.Ticket")]
        model: String,
        #[arg(long, default_value = "state", help = "State field name on the model")]
        field: String,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match config() {
        Ok(settings) => settings.clone(),
        Err(e) => {
            eprintln!("warning: {e}; using default configuration");
            WorkflowFieldConfig::default()
        }
    };
    init_telemetry(&settings.observability)?;

    match cli.command {
        Commands::Describe { workflow } => describe_command(&settings, &workflow),
        Commands::Decode { workflow, value } => decode_command(&settings, &workflow, value),
        Commands::History { model, id } => tokio::runtime::Runtime::new()?
            .block_on(async { history_command(&settings, &model, id).await }),
        Commands::RebuildLogStates { workflow, model, field } => tokio::runtime::Runtime::new()?
            .block_on(async { rebuild_command(&settings, &workflow, &model, &field).await }),
    }
}

fn load_field(settings: &WorkflowFieldConfig, path: &Path) -> Result<StateField> {
    let workflow = Workflow::from_toml_file(path)
        .with_context(|| format!("Failed to load workflow from {}", path.display()))?;
    Ok(StateField::new(workflow)?.with_max_length(settings.field.default_max_length))
}

fn describe_command(settings: &WorkflowFieldConfig, path: &Path) -> Result<()> {
    let field = load_field(settings, path)?;
    let workflow = field.workflow();

    let transitions: Vec<_> = workflow
        .transitions()
        .iter()
        .map(|t| json!({ "name": t.name(), "source": t.sources(), "target": t.target() }))
        .collect();

    let description = json!({
        "workflow": workflow.name(),
        "default": field.default_name(),
        "max_length": field.max_length(),
        "choices": field.choices(),
        "transitions": transitions,
        "descriptor": field.deconstruct(),
    });
    println!("{}", serde_json::to_string_pretty(&description)?);
    Ok(())
}

fn decode_command(settings: &WorkflowFieldConfig, path: &Path, value: Option<String>) -> Result<()> {
    let field = load_field(settings, path)?;
    let decoded = field.decode(RawValue::from(value))?;
    println!("{} ({})", decoded.name(), field.display_label(&decoded));

    let available: Vec<_> = field
        .workflow()
        .available_transitions(decoded.state())
        .map(|t| format!("{} -> {}", t.name(), t.target()))
        .collect();
    if !available.is_empty() {
        println!("available transitions: {}", available.join(", "));
    }
    Ok(())
}

#[cfg(feature = "database")]
async fn open_database(settings: &WorkflowFieldConfig) -> Result<workflow_field::DatabaseManager> {
    let db = settings
        .database
        .as_ref()
        .context("No database configured; set [database] in workflow-field.toml")?;
    workflow_field::DatabaseManager::new(&db.url, db.max_connections, db.auto_migrate).await
}

#[cfg(feature = "database")]
async fn history_command(settings: &WorkflowFieldConfig, model: &str, id: i64) -> Result<()> {
    use tracing::Instrument;
    use workflow_field::{LogSink, RecordKey};

    let db = open_database(settings).await?;
    let log = db
        .configured_log(&settings.logging, model)
        .context("Transition logging is disabled; no history to show")?;
    let subject = settings.logging.subject.subject_for(&RecordKey::new(model, id));

    let entries = log
        .history(&subject)
        .instrument(workflow_field::create_field_span("history", model, Some(id), "*"))
        .await?;
    if entries.is_empty() {
        println!("No transitions logged for {subject}");
    }
    for entry in entries {
        let actor = entry.actor.as_deref().unwrap_or("-");
        println!("{} [{}] by {}", entry, entry.transition, actor);
    }
    db.shutdown().await;
    Ok(())
}

#[cfg(feature = "database")]
async fn rebuild_command(settings: &WorkflowFieldConfig, path: &Path, model: &str, field: &str) -> Result<()> {
    use workflow_field::{rebuild_log_states, ModelSchema};

    let state_field = load_field(settings, path)?;
    let schema = ModelSchema::builder(model).state_field(field, state_field).build()?;

    let db = open_database(settings).await?;
    let store = db.record_store();
    let log = db
        .configured_log(&settings.logging, model)
        .with_context(|| format!("Transition logging is disabled; nothing to rebuild for {model}.{field}"))?;

    println!("Rebuilding transition log states for {model}.{field}");
    let report = rebuild_log_states(&schema, field, &store, &log).await?;
    for unknown in &report.unknown_transitions {
        eprintln!(
            "Unknown transition {} in log {:?} for {} {}",
            unknown.transition, unknown.log_id, model, unknown.record_id
        );
    }
    println!(
        "{} records scanned, {} log entries updated",
        report.records_scanned, report.entries_updated
    );
    db.shutdown().await;
    Ok(())
}

#[cfg(not(feature = "database"))]
async fn history_command(_settings: &WorkflowFieldConfig, _model: &str, _id: i64) -> Result<()> {
    anyhow::bail!("history requires the 'database' feature")
}

#[cfg(not(feature = "database"))]
async fn rebuild_command(_settings: &WorkflowFieldConfig, _path: &Path, _model: &str, _field: &str) -> Result<()> {
    anyhow::bail!("rebuild-log-states requires the 'database' feature")
}
