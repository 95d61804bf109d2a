use anyhow::Context;
use bundle_settlement::auth::{EcdsaVerifier, HookRegistry};
use bundle_settlement::{
    api, config::Config, db::init_db, BlockSource, Repository, RpcBlockSource, SettlementService,
};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let pool = init_db(&config.database_path)
        .await
        .context("Failed to initialize database")?;
    let repo = Arc::new(Repository::new(pool));
    let blocks: Arc<dyn BlockSource> = Arc::new(RpcBlockSource::new(config.rpc_url.clone()));

    let service = SettlementService::bootstrap(
        &config,
        Arc::new(EcdsaVerifier),
        HookRegistry::new(),
        repo,
        blocks,
    )
    .await
    .context("Failed to restore settlement state")?;

    let app = api::create_router(api::AppState::new(Arc::new(service)));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!(
        nodes = config.node_addresses.len(),
        "Server listening on {}",
        addr
    );

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
