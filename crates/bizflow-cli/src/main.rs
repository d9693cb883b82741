mod config;
mod prompt;

use bizflow_agent::{default_agents, ClaudeBackend, LlmBackend, LlmReasoner};
use bizflow_core::{Notifier, Reasoner, WorkflowEvent};
use bizflow_gateway::{ConnectionManager, GatewayServer};
use bizflow_journal::{FileJournal, Journal};
use bizflow_orchestrator::{
    AgentRegistry, BroadcastNotifier, Orchestrator, WorkflowJournal, WorkflowState,
};
use clap::{Parser, Subcommand};
use config::BizflowConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "bizflow", about = "bizflow: business workflows with human approval gates")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "bizflow.toml")]
    config: PathBuf,

    /// Model API key (fills `[model].api_key` when it is blank)
    #[arg(long, env = "BIZFLOW_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the gateway server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one workflow, answering the approval gates in this terminal
    Run {
        /// What the workflow should accomplish
        #[arg(short, long)]
        task: String,
        /// Submitting user
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Print the journaled history of a workflow
    History {
        workflow_id: Uuid,
        /// Print the raw journal records instead of the rebuilt state
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    let mut config = BizflowConfig::load(&cli.config).await?;
    config.apply_api_key(cli.api_key);

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Run { task, user } => {
            let user = user.unwrap_or_else(prompt::reviewer_name);
            run_interactive(config, &user, &task).await
        }
        Commands::History { workflow_id, raw } => history(config, workflow_id, raw).await,
    }
}

/// Agents and planner backend for the configured model, or offline ones.
fn collaborators(config: &BizflowConfig) -> (AgentRegistry, Option<Arc<dyn Reasoner>>) {
    let backend: Option<Arc<dyn LlmBackend>> = match &config.model {
        Some(model) if !model.api_key.is_empty() => {
            info!(model = %model.model_id, "Using model-backed agents");
            Some(Arc::new(ClaudeBackend::new(model.clone())))
        }
        Some(model) => {
            warn!(model = %model.model_id, "No API key configured, running offline agents");
            None
        }
        None => {
            info!("No model configured, running offline agents");
            None
        }
    };

    let mut agents = AgentRegistry::new();
    for agent in default_agents(backend.clone()) {
        agents.register(agent);
    }
    let reasoner = backend.map(|b| Arc::new(LlmReasoner::new(b)) as Arc<dyn Reasoner>);
    (agents, reasoner)
}

async fn open_journal(config: &BizflowConfig) -> anyhow::Result<Arc<dyn Journal>> {
    let journal = FileJournal::new(config.journal_dir()).await?;
    Ok(Arc::new(journal))
}

async fn serve(config: BizflowConfig, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);

    info!("Starting bizflow gateway on {}:{}", host, port);

    let journal = open_journal(&config).await?;
    let (agents, reasoner) = collaborators(&config);
    let connections = ConnectionManager::new();
    let notifier: Arc<dyn Notifier> = connections.clone();
    let orchestrator = Arc::new(Orchestrator::new(
        config.workflow.clone(),
        agents,
        reasoner,
        notifier,
        journal,
    ));

    let app = GatewayServer::build(orchestrator, connections);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("bizflow gateway listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn run_interactive(config: BizflowConfig, user: &str, task: &str) -> anyhow::Result<()> {
    let journal = open_journal(&config).await?;
    let (agents, reasoner) = collaborators(&config);
    let notifier = Arc::new(BroadcastNotifier::new(256));
    let mut events = notifier.subscribe();
    let orchestrator = Arc::new(Orchestrator::new(
        config.workflow.clone(),
        agents,
        reasoner,
        notifier,
        journal,
    ));

    let handle = orchestrator.submit(user, task).await?;
    let workflow_id = handle.workflow_id;
    eprintln!("Workflow {workflow_id} submitted");

    loop {
        let notification = match events.recv().await {
            Ok(n) => n,
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "Terminal reviewer fell behind");
                continue;
            }
            Err(RecvError::Closed) => break,
        };
        if notification.workflow_id != workflow_id {
            continue;
        }

        if let Some(line) = prompt::format_status_line(&notification.event) {
            eprintln!("{line}");
        }
        if matches!(
            notification.event,
            WorkflowEvent::WorkflowCompleted { .. }
                | WorkflowEvent::WorkflowError { .. }
                | WorkflowEvent::WorkflowCancelled { .. }
        ) {
            break;
        }

        let request_id = match &notification.event {
            WorkflowEvent::PlanApprovalRequest { request_id, .. }
            | WorkflowEvent::FinalResultsApprovalRequest { request_id, .. } => request_id.clone(),
            _ => continue,
        };
        if let Some(text) = prompt::format_gate_prompt(&notification.event) {
            answer_gate(&orchestrator, &request_id, &text).await?;
        }
    }

    let state = handle.wait().await?;
    print_state(&state)?;
    Ok(())
}

/// Prompt until the gate accepts an answer or stops waiting for one.
async fn answer_gate(
    orchestrator: &Orchestrator,
    request_id: &str,
    prompt_text: &str,
) -> anyhow::Result<()> {
    loop {
        eprint!("{prompt_text}");
        let line = tokio::task::spawn_blocking(|| {
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).map(|_| input)
        })
        .await??;

        let mut response = prompt::parse_reply(&line, request_id);
        response.reviewer = Some(prompt::reviewer_name());
        match orchestrator.respond(response).await {
            Ok(_) => return Ok(()),
            Err(e) => eprintln!("\x1b[33m  {e}\x1b[0m"),
        }
    }
}

fn print_state(state: &WorkflowState) -> anyhow::Result<()> {
    let out = serde_json::json!({
        "workflow_id": state.workflow_id,
        "status": state.status,
        "iterations": state.iteration,
        "failure_reason": state.failure_reason,
        "results": state.accumulated_results,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn history(config: BizflowConfig, workflow_id: Uuid, raw: bool) -> anyhow::Result<()> {
    let journal = WorkflowJournal::new(open_journal(&config).await?);

    if raw {
        let records = journal.records(workflow_id).await?;
        if records.is_empty() {
            anyhow::bail!("No journal records for workflow {workflow_id}");
        }
        for record in records {
            println!("{}", serde_json::to_string(&record)?);
        }
        return Ok(());
    }

    let state = journal
        .replay(workflow_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("No journal records for workflow {workflow_id}"))?;
    println!("Workflow {} ({})", state.workflow_id, state.status);
    println!("Task: {}", state.task_description());
    println!("Sequence: {:?}", state.agent_sequence);
    for entry in &state.execution_history {
        println!(
            "  iter {} step {} {:<12} {:?}  {}",
            entry.iteration,
            entry.step,
            entry.agent.as_str(),
            entry.outcome,
            entry.result_summary
        );
    }
    if let Some(reason) = &state.failure_reason {
        println!("Reason: {reason}");
    }
    Ok(())
}
