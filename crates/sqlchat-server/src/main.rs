//! sqlchat-server: natural-language-to-SQL chat over HTTP

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use sqlchat_core::logging::Logger;
use sqlchat_core::{
    log_info, CancellationCoordinator, ConsoleLogger, ConversationOrchestrator, CoreConfig,
    DriverRegistry, EnvSecretStore, MemoryPersistence, OrchestratorSettings, ProviderRegistry,
    QueryEngine,
};
use sqlchat_server::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "sqlchat-server")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Streaming natural-language-to-SQL chat server")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "SQLCHAT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on; overrides `server.bind` from the config file
    #[arg(long, env = "SQLCHAT_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(CoreConfig::default_path);
    let config = CoreConfig::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());

    let logger: Arc<dyn Logger> = Arc::new(ConsoleLogger::new().with_level(config.log_level));
    let persistence = Arc::new(MemoryPersistence::with_connections(config.connections.clone()));
    let coordinator = Arc::new(CancellationCoordinator::new());

    let orchestrator = ConversationOrchestrator::new(
        persistence.clone(),
        ProviderRegistry::with_defaults(config.pacing(), Arc::clone(&logger)),
        Arc::new(EnvSecretStore::new()),
        Arc::clone(&coordinator),
        OrchestratorSettings::from(&config),
        Arc::clone(&logger),
    );
    let engine = QueryEngine::new(
        persistence,
        DriverRegistry::with_defaults(Arc::clone(&logger)),
        coordinator,
        Arc::clone(&logger),
    );

    let app = router(AppState::new(orchestrator, engine, Arc::clone(&logger)));
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {}", bind))?;

    log_info!(
        logger,
        "[Server] Listening on {} ({} connections configured)",
        bind,
        config.connections.len()
    );
    axum::serve(listener, app).await.context("server terminated")?;
    Ok(())
}
