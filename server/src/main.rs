use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, then serves websocket clients until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig::parse();
    info!(
        "Starting Ludo server on {} (max clients: {}, seed: {:?})",
        config.address(),
        config.max_clients,
        config.seed
    );

    let server = Server::bind(config).await?;
    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log::error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received Ctrl+C, shutting down gracefully...");
        })
        .await?;

    Ok(())
}
