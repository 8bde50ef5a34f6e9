use clap::Parser;
use log::{error, info};
use server::network::{Server, ServerConfig};
use shared::BoxError;
use std::time::Duration;

/// Dedicated authority for a spectator session.
///
/// Without an in-process host nobody claims the active player, so connected
/// peers stay spectators waiting for one.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server IP address to bind to
    #[clap(short = 'H', long, default_value = "127.0.0.1")]
    host: String,
    /// Server port to listen on
    #[clap(short, long, default_value = "8080")]
    port: u16,
    /// Transform replication rate (updates per second)
    #[clap(short, long, default_value = "30")]
    tick_rate: u32,
    /// Maximum number of connected peers
    #[clap(short, long, default_value = "8")]
    max_clients: usize,
    /// Movement speed given to spawned players
    #[clap(short = 's', long, default_value_t = shared::DEFAULT_PLAYER_SPEED)]
    player_speed: f32,
    /// Seed for spawn positions
    #[clap(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    let args = Args::parse();

    let config = ServerConfig {
        tick_duration: Duration::from_secs_f32(1.0 / args.tick_rate.max(1) as f32),
        max_clients: args.max_clients,
        player_speed: args.player_speed,
        seed: args.seed,
    };

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, config).await?;
    let shutdown = server.shutdown_handle();

    let mut server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            error!("Server loop failed: {}", e);
        }
    });

    tokio::select! {
        result = &mut server_handle => {
            if let Err(e) = result {
                error!("Server task panicked: {}", e);
            }
            return Ok(());
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Received Ctrl+C, shutting down gracefully...");
            shutdown.shutdown();
        }
    }

    if let Err(e) = server_handle.await {
        error!("Server task panicked: {}", e);
    }

    Ok(())
}
