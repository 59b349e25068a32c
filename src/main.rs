use anyhow::{Context, Result};
use clap::Parser;
use rxmesh::agents::workflow::CHECKOUT_WORKFLOW;
use rxmesh::agents::{AgentRequest, Payload, WorkflowDefinition};
use rxmesh::cli::{Cli, Commands};
use rxmesh::{utils, Agent, Settings, System};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::new()?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let system = System::from_settings(settings)?;

    match cli.command {
        Commands::Route { message, user } => handle_route(&system, message, user).await,
        Commands::Intent {
            intent,
            payload,
            user,
        } => handle_intent(&system, intent, payload, user).await,
        Commands::Workflow { file, user } => handle_workflow(&system, file, user).await,
        Commands::Checkout { payload, user } => handle_checkout(&system, payload, user).await,
        Commands::Agents => handle_agents(&system),
    }
}

fn parse_payload(raw: Option<String>) -> Result<Payload> {
    match raw {
        None => Ok(Payload::new()),
        Some(raw) => serde_json::from_str(&raw).context("--payload must be a JSON object"),
    }
}

fn with_user(request: AgentRequest, user: Option<String>) -> AgentRequest {
    match user {
        Some(user) => request.with_user(user),
        None => request,
    }
}

async fn handle_route(system: &System, message: String, user: Option<String>) -> Result<()> {
    utils::print_info("Routing request...");
    let request = with_user(AgentRequest::from_message(message), user);
    let response = system.process(&request).await;
    utils::print_response(&response);
    Ok(())
}

async fn handle_intent(
    system: &System,
    intent: String,
    payload: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let payload = parse_payload(payload)?;
    let request = with_user(AgentRequest::from_intent(intent, payload), user);
    let response = system.process(&request).await;
    utils::print_response(&response);
    Ok(())
}

async fn handle_workflow(system: &System, file: String, user: Option<String>) -> Result<()> {
    let definition = WorkflowDefinition::from_file(&file)?;
    utils::print_header(&format!(
        "Workflow '{}' ({} steps)",
        definition.name,
        definition.steps.len()
    ));
    let template = with_user(AgentRequest::default(), user);
    let response = system
        .orchestrator()
        .run_workflow(&definition, &template)
        .await;
    utils::print_response(&response);
    Ok(())
}

async fn handle_checkout(
    system: &System,
    payload: Option<String>,
    user: Option<String>,
) -> Result<()> {
    let definition = WorkflowDefinition::builtin(CHECKOUT_WORKFLOW)
        .context("checkout workflow is not defined")?;
    utils::print_header("Checkout");
    let template = with_user(AgentRequest::new(parse_payload(payload)?), user);
    let response = system
        .orchestrator()
        .run_workflow(&definition, &template)
        .await;
    utils::print_response(&response);
    Ok(())
}

fn handle_agents(system: &System) -> Result<()> {
    utils::print_header("Registered agents");
    for id in system.registry().list_ids() {
        let Some(agent) = system.registry().get(&id) else {
            continue;
        };
        utils::print_success(&format!("{} - {}", id, agent.description()));
        for tool in agent.tool_names() {
            println!("    {}", tool);
        }
    }
    Ok(())
}
