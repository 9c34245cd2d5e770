//! Trading chain node
//!
//! Runs the command router either behind an external CometBFT engine (ABCI
//! socket) or on the local null-chain with its time-forward endpoint.

use anyhow::Context;
use consensus::{AbciServer, App, Application};
use nullchain::{NodeConfig, NullChain, NullGenesis, Provider, SystemClock, TxJournal};
use protocol_core::EnvelopeCodec;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    info!("Starting trading chain node");

    // Load configuration
    let config = if let Ok(config_path) = std::env::var("TRADECHAIN_CONFIG") {
        info!("Loading config from: {}", config_path);
        NodeConfig::from_file(&config_path)?
    } else {
        info!("Loading config from environment variables");
        NodeConfig::from_env()?
    };

    // Build the router
    let journal = TxJournal::new();
    let mut app = App::new(&config.consensus, Arc::new(EnvelopeCodec::new()));
    journal.install(&mut app);
    let app: Arc<dyn Application> = Arc::new(app);

    match config.provider {
        Provider::Abci => run_abci(&config, app).await,
        Provider::Null => run_null(&config, app).await,
    }
}

async fn run_abci(config: &NodeConfig, app: Arc<dyn Application>) -> anyhow::Result<()> {
    let addr = config.consensus.abci_addr.clone();
    info!("Starting ABCI server on {}", addr);

    let server = AbciServer::new(app);
    let server_handle = tokio::task::spawn_blocking(move || server.serve(&addr));

    tokio::select! {
        result = server_handle => {
            result.context("ABCI server task failed")??;
        }
        result = signal::ctrl_c() => {
            if let Err(err) = result {
                error!("Unable to listen for shutdown signal: {}", err);
            }
            info!("Received shutdown signal");
        }
    }

    info!("Node stopped");
    Ok(())
}

async fn run_null(config: &NodeConfig, app: Arc<dyn Application>) -> anyhow::Result<()> {
    let settings = &config.nullchain;
    let genesis = NullGenesis::from_file(&settings.genesis_file).with_context(|| {
        format!("failed to read genesis {}", settings.genesis_file.display())
    })?;

    let chain = Arc::new(NullChain::new(settings, genesis, app, Arc::new(SystemClock))?);

    let starter = Arc::clone(&chain);
    tokio::task::spawn_blocking(move || starter.start())
        .await
        .context("null-chain start task failed")??;

    info!("Null-chain running");
    info!("- Chain: {}", chain.get_chain_id());
    info!("- HTTP: {}", settings.http_addr);
    info!("  POST /api/v1/forwardtime");
    info!("  POST /api/v1/transactions");
    info!("- Block duration: {:?}", settings.block_duration);

    let listener = tokio::net::TcpListener::bind(&settings.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.http_addr))?;
    let app = nullchain::server::router(Arc::clone(&chain));

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            match signal::ctrl_c().await {
                Ok(()) => info!("Received shutdown signal"),
                Err(err) => error!("Unable to listen for shutdown signal: {}", err),
            }
        })
        .await?;

    // Graceful shutdown
    info!("Shutting down null-chain...");
    chain.stop()?;

    info!("Node stopped");
    Ok(())
}
