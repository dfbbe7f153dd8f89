use tracing::{error, info, Level};

use derby_server::config::ServerConfig;
use derby_server::net::transport::WsServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Derby Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    info!(
        "Configuration loaded: {}:{}, {} horses",
        config.bind_address, config.port, config.horse_count
    );

    let server = WsServer::new(config);

    // Shutdown signal handler
    let shutdown = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Shutdown signal received");
    };

    // Run server with graceful shutdown
    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = shutdown => {
            info!("Shutting down...");
        }
    }

    info!("Server stopped");
    Ok(())
}
