//! `taskrelay serve` - HTTP server with background retention sweep

use std::sync::Arc;
use taskrelay_foundation::RelayConfig;
use taskrelay_gateway::RequestGateway;
use taskrelay_task::builtin_factory;
use tracing::{error, info, warn};

pub async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let factory = builtin_factory(&config.agent)?;
    if config.agent == "shell" && !config.is_loopback() {
        warn!(
            "Serving the shell agent on {} without authentication; any client that can reach it runs commands on this host",
            config.bind_addr()
        );
    }
    let gateway = Arc::new(RequestGateway::from_config(&config, factory));
    let cleanup = gateway.start_cleanup(config.cleanup_interval());

    info!(
        "Starting taskrelay (agent: {}, retention: {}s / {} entries)",
        config.agent, config.retention_ttl_secs, config.max_entries
    );
    let served = taskrelay_gateway::serve(gateway, &config.bind_addr(), shutdown_signal()).await;

    cleanup.abort();
    served?;
    Ok(())
}

/// Resolves on Ctrl+C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => {
            // without a handler the server runs until killed
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
