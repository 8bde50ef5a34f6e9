//! Headless spectator that joins a session and rates the active player on a
//! timer. Useful for exercising the rating race from several processes.

use clap::Parser;
use client::network::connect;
use client::peer::{FrameInput, Peer, PeerConfig};
use log::info;
use shared::{BoxError, Packet};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::interval;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Authority address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: SocketAddr,

    /// Name reported to the authority on connect
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Milliseconds between ratings
    #[arg(short = 'i', long, default_value = "500")]
    interval: u64,

    /// Rating delta sent each time
    #[arg(short = 'd', long, default_value = "5", allow_hyphen_values = true)]
    delta: i32,

    /// Number of ratings to send before leaving
    #[arg(short = 'c', long, default_value = "10")]
    count: u32,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    env_logger::init();

    let args = Args::parse();
    let mut connection = connect(args.server, &args.name, false).await?;

    let config = PeerConfig {
        name: args.name.clone(),
        ..PeerConfig::default()
    };
    let mut peer = Peer::new(config, false, connection.outbound.clone());

    let mut ticker = interval(Duration::from_millis(args.interval));
    let mut sent = 0;

    while sent < args.count {
        tokio::select! {
            packet = connection.inbound.recv() => {
                match packet {
                    Some(packet @ Packet::Disconnected { .. }) => {
                        peer.handle_packet(packet);
                        break;
                    }
                    Some(packet) => peer.handle_packet(packet),
                    None => break,
                }
            }
            _ = ticker.tick() => {
                peer.update(&FrameInput::default(), args.interval as f32 / 1000.0);

                // Ratings only count once there is a player to watch
                if peer.spectator_target().is_some() {
                    peer.rate_player(args.delta);
                    sent += 1;
                    info!("{} ({}/{})", peer.replica().label().text(), sent, args.count);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, leaving session...");
                break;
            }
        }
    }

    info!("Final {}", peer.replica().label().text());
    peer.disconnect();
    drop(peer);
    connection.close().await;

    Ok(())
}
