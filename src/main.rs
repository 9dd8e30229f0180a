use std::sync::Arc;

use clap::Parser;
use mcp_resource_server::{
    cli::Cli,
    config::Config,
    logging,
    mcp::{server::SUPPORTED_PROTOCOL_VERSION, session, tools::ResourceTools},
    resources::{ResourceManager, StaticResourceProvider},
    transport::TransportManager,
    AppState,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

fn server_info_provider(config: &Config) -> StaticResourceProvider {
    StaticResourceProvider::new("server", "Metadata about this MCP server").with_document(
        "/server/info",
        "Server Info",
        Some("Name, version and resource cache settings"),
        json!({
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "protocolVersion": SUPPORTED_PROTOCOL_VERSION,
            "resourceCache": {
                "maxEntries": config.resource_cache_max_entries,
                "ttlSecs": config.resource_cache_ttl.as_secs(),
            },
        }),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let shutdown = CancellationToken::new();

    let resources = Arc::new(ResourceManager::from_config(&config));
    resources.register_provider("server", Arc::new(server_info_provider(&config)));
    let sweeper = resources.spawn_cache_sweeper(config.cache_sweep_interval, shutdown.child_token());
    let state = AppState::new(
        Arc::clone(&resources),
        Arc::new(ResourceTools::new(Arc::clone(&resources))),
    );

    let manager = TransportManager::new(config);
    let transport = manager
        .start_transport(cli.transport_flag(), shutdown.clone())
        .await?;

    info!(transport_type = %transport.transport_type(), "server starting");

    let mut session = tokio::spawn(session::serve(transport, state, shutdown.clone()));
    let ended = tokio::select! {
        joined = &mut session => joined,
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                warn!(error = %err, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
            shutdown.cancel();
            session.await
        }
    };

    match ended {
        Ok(reason) => info!(reason = ?reason, "session finished"),
        Err(err) => warn!(error = %err, "session task failed"),
    }

    shutdown.cancel();
    manager.shutdown().await?;
    if let Err(err) = sweeper.await {
        warn!(error = %err, "cache sweeper task failed");
    }

    info!("server stopped");
    Ok(())
}
