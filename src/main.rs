mod cli;

use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use broker_core::{EphemeralHistory, TurnConfig, TurnEngine, TurnRequest};
use broker_intent::ModelIntentExtractor;
use broker_memory::Store;
use broker_model::HttpProvider;
use broker_rag::IndexRouter;
use broker_rpc::{AppState, Dispatcher, SwitchableModel};
use broker_tools::ToolCatalog;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = broker_config::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Completions { shell } => {
            cli::print_completions(shell);
            Ok(())
        }
        Commands::Serve => run_serve(config).await,
        Commands::Repl => run_repl(config).await,
    }
}

/// `RUST_LOG`-driven tracing to stderr; stdout is reserved for the
/// JSON-RPC wire in `serve` mode. `--verbose` forces the debug tier
/// regardless of the environment.
fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    tracing_subscriber::registry().with(fmt::layer().with_writer(std::io::stderr)).with(filter).init();
}

/// Builds the shared state every run mode needs: the session store, the
/// codebase index router, the switchable model provider, and the turn
/// engine wired with intent extraction and the tool catalog populated from
/// `config.tool_servers`.
async fn build_state(config: broker_config::Config) -> anyhow::Result<AppState> {
    let store = Store::open(&config.session_db_path)
        .with_context(|| format!("opening session store at {}", config.session_db_path))?;
    let index_router = Arc::new(IndexRouter::new());

    let provider = HttpProvider::new(config.endpoint.clone(), config.api_key.clone(), config.model.clone());
    let model = Arc::new(SwitchableModel::new(Arc::new(provider)));

    let intent_provider = model.clone() as Arc<dyn broker_model::ModelProvider>;
    let intent = Some(Arc::new(ModelIntentExtractor::new(intent_provider)) as Arc<dyn broker_intent::IntentExtractor>);
    let tools = Some(Arc::new(build_tool_catalog(&config.tool_servers).await));

    let turn_config = TurnConfig {
        context: broker_context::ContextConfig {
            max_tokens: config.context_max_tokens,
            reserved_for_response: config.reserved_for_response,
            recent_messages: config.recent_messages,
            always_include_system: true,
            summarize_after: config.summarize_after,
            summary_max_tokens: 500,
            max_rag_tokens: config.max_rag_tokens,
            max_rag_chunks: config.max_rag_chunks,
        },
        max_rag_tokens: config.max_rag_tokens,
        max_rag_chunks: config.max_rag_chunks,
        max_tool_iterations: 10,
    };
    let turn_engine = TurnEngine::new(model.clone() as Arc<dyn broker_model::ModelProvider>, intent, Some(index_router.clone()), tools, turn_config);

    Ok(AppState::new(config, store, index_router, model, turn_engine))
}

/// Spawns and registers every configured external tool server. A server that
/// fails to start (bad command, crashes during `initialize`) is logged and
/// skipped rather than aborting startup — the rest of the catalog, and the
/// turn engine's non-tool paths, still work without it.
async fn build_tool_catalog(servers: &[broker_config::ToolServerConfig]) -> ToolCatalog {
    let catalog = ToolCatalog::new();
    for server in servers {
        let config = broker_tools::McpServerConfig {
            name: server.name.clone(),
            command: server.command.clone(),
            env: server.env.clone(),
            cwd: server.cwd.as_ref().map(std::path::PathBuf::from),
        };
        let name = server.name.clone();
        if let Err(e) = catalog.add_server(config).await {
            tracing::warn!(server = %name, error = %e, "failed to start configured tool server");
        }
    }
    catalog
}

/// Runs the JSON-RPC dispatcher over stdin/stdout until EOF or a fatal I/O
/// error. Exit code 0 on clean shutdown, 1 on a startup failure.
async fn run_serve(config: broker_config::Config) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    let mut dispatcher = Dispatcher::new(tokio::io::stdin(), tokio::io::stdout(), state);
    dispatcher.run().await
}

/// A thin stdin-prompt loop over the turn engine, for local manual testing
/// without a frontend driving the JSON-RPC wire. History is in-memory only
/// and dropped when the process exits.
async fn run_repl(config: broker_config::Config) -> anyhow::Result<()> {
    if config.endpoint.trim().is_empty() {
        println!("No model endpoint is configured. Set `endpoint` (and `api_key` if required) before starting the REPL.");
        return Ok(());
    }

    let state = build_state(config).await?;
    let history = EphemeralHistory::new();
    let ledger = state.ledger_for("repl");

    println!("brokerd repl — type a message and press enter; Ctrl-D to quit.");
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut line = String::new();
        let bytes_read = stdin.lock().read_line(&mut line).context("reading repl input")?;
        if bytes_read == 0 {
            break;
        }
        let message = line.trim().to_string();
        if message.is_empty() {
            continue;
        }

        let request = TurnRequest { message, use_rag: false, stream: false };
        match state.turn_engine.run("repl", &history, &ledger, request, None, None).await {
            Ok(outcome) => println!("{}", outcome.response),
            Err(e) => println!("error: {e:#}"),
        }
    }
    Ok(())
}
