use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use assist_core::{Config, WorkspacePaths};
use assist_db::SessionDbPool;
use assist_gateway::agent::Agent;
use assist_gateway::prompt::{DEFAULT_DESCRIPTION, DEFAULT_INSTRUCTIONS, load_prompt};
use assist_gateway::providers::gemini::GeminiClient;
use assist_gateway::server;
use assist_gateway::state::AppState;
use assist_gateway::tools::ToolManager;
use assist_knowledge::{GeminiEmbedder, UrlKnowledge};

/// Knowledge-backed assistant with a playground HTTP API
#[derive(Debug, Parser)]
#[command(name = "assist-gateway", version, about)]
struct Cli {
    /// Settings file (defaults to ~/.config/assist/config.toml)
    #[arg(long, env = "ASSIST_CONFIG")]
    config: Option<PathBuf>,

    /// Ingest the configured knowledge sources before serving
    #[arg(long)]
    load_knowledge: bool,

    /// Drop the knowledge collection before loading it (with --load-knowledge
    /// or knowledge.load_on_startup)
    #[arg(long)]
    recreate: bool,

    /// Override gateway.host
    #[arg(long)]
    host: Option<String>,

    /// Override gateway.port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    assist_core::load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.settings.gateway.host = host;
    }
    if let Some(port) = cli.port {
        config.settings.gateway.port = port;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.settings.logging.level.as_str().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = &config.settings;
    info!(
        agent = %settings.agent.name,
        model = %settings.model.id,
        "configuration loaded"
    );

    let paths = WorkspacePaths::resolve(settings)?;
    paths.ensure()?;

    let sessions = SessionDbPool::open(&paths.session_db, &settings.storage.table_name).await?;
    info!(namespace = %settings.storage.table_name, "session store opened");

    let mut embedder =
        GeminiEmbedder::new(config.gemini_api_key(), settings.knowledge.embedder_id.clone())?;
    if let Some(base_url) = settings.knowledge.embedder_base_url.as_deref() {
        embedder = embedder.with_base_url(base_url);
    }
    let knowledge = Arc::new(
        UrlKnowledge::open(
            settings.knowledge.clone(),
            &paths.knowledge_db,
            Arc::new(embedder),
        )
        .await?,
    );

    let mut model = GeminiClient::new(config.gemini_api_key(), settings.model.id.clone())?
        .with_max_output_tokens(settings.model.max_output_tokens);
    if let Some(base_url) = settings.model.base_url.as_deref() {
        model = model.with_base_url(base_url);
    }

    let tools = ToolManager::from_config(&config, &paths)?;
    let description = load_prompt(settings.agent.description_path.as_deref(), DEFAULT_DESCRIPTION)?;
    let instructions =
        load_prompt(settings.agent.instructions_path.as_deref(), DEFAULT_INSTRUCTIONS)?;

    let agent = Agent::new(Arc::new(model), sessions, tools, settings.agent.clone())
        .with_description(description)
        .with_instructions(instructions)
        .with_knowledge(Arc::clone(&knowledge));
    info!(id = agent.id(), tools = ?agent.tool_names(), "agent ready");

    if cli.load_knowledge || settings.knowledge.load_on_startup {
        let recreate = cli.recreate || settings.knowledge.recreate;
        let report = knowledge.load(recreate).await?;
        info!(
            indexed = report.documents_indexed,
            skipped = report.documents_skipped,
            chunks = report.chunks,
            failed = report.failed.len(),
            "knowledge loaded"
        );
        for failure in &report.failed {
            warn!(url = %failure.url, error = %failure.error, "knowledge source failed");
        }
    }

    // Security: Verify localhost-only binding
    if settings.gateway.host != "127.0.0.1" && settings.gateway.host != "localhost" {
        warn!(
            "Gateway binding to non-localhost address: {}. This may expose the API to remote access.",
            settings.gateway.host
        );
    }

    let state = Arc::new(AppState::new(vec![agent]));
    let bind_addr = config.bind_addr();
    info!("Starting playground on http://{}/v1/playground", bind_addr);

    server::run(state, &bind_addr).await
}
