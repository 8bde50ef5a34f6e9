use clap::Parser;
use client::entity::EntityConfig;
use client::input::InputManager;
use client::network::connect;
use client::peer::{Peer, PeerConfig};
use client::rendering::Renderer;
use log::{error, info};
use macroquad::prelude::*;
use server::network::{Server, ServerConfig};
use shared::{BoxError, DEFAULT_PLAYER_SPEED, RATING_STEP};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Authority address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Start an authority in this process and join it as the host
    #[arg(long)]
    host_session: bool,

    /// Port for the hosted authority (0 picks a free one)
    #[arg(long, default_value = "8080")]
    host_port: u16,

    /// Name reported to the authority on connect
    #[arg(short = 'n', long, default_value = "player")]
    name: String,

    /// Movement speed given to spawned players when hosting
    #[arg(long, default_value_t = DEFAULT_PLAYER_SPEED)]
    speed: f32,

    /// Allow lateral movement with A/D
    #[arg(long)]
    strafe: bool,

    /// Window width
    #[arg(short = 'w', long, default_value = "800")]
    width: usize,

    /// Window height (no short flag to avoid conflict with --help)
    #[arg(long, default_value = "600")]
    height: usize,
}

fn window_conf() -> Conf {
    let args = Args::parse();
    Conf {
        window_title: "Spectator Session".to_string(),
        window_width: args.width as i32,
        window_height: args.height as i32,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    if let Err(e) = run(Args::parse()).await {
        error!("Client failed: {}", e);
    }
}

async fn run(args: Args) -> Result<(), BoxError> {
    // Network tasks run on their own runtime; macroquad owns the main thread
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let mut hosted = None;
    let server_addr: SocketAddr = if args.host_session {
        let config = ServerConfig {
            player_speed: args.speed,
            ..ServerConfig::default()
        };
        let address = format!("127.0.0.1:{}", args.host_port);
        let mut server = runtime.block_on(Server::new(&address, config))?;
        let addr = server.local_addr()?;
        hosted = Some(server.shutdown_handle());

        runtime.spawn(async move {
            if let Err(e) = server.run().await {
                error!("Hosted authority failed: {}", e);
            }
        });
        info!("Hosting session on {}", addr);
        addr
    } else {
        args.server.parse()?
    };

    info!("Controls: W/S to move, O/P to rate the player +{0}/-{0}", RATING_STEP);

    let mut connection = runtime.block_on(connect(server_addr, &args.name, args.host_session))?;

    let config = PeerConfig {
        name: args.name.clone(),
        entity: EntityConfig {
            strafe: args.strafe,
        },
        rating_step: RATING_STEP,
    };
    let mut peer = Peer::new(config, args.host_session, connection.outbound.clone());
    let mut input_manager = InputManager::new();
    let mut renderer = Renderer::new(args.width, args.height);

    prevent_quit();

    loop {
        while let Ok(packet) = connection.inbound.try_recv() {
            peer.handle_packet(packet);
        }

        let input = input_manager.update();
        if input.quit {
            break;
        }

        peer.update(&input, get_frame_time());
        renderer.render(&peer);

        next_frame().await;
    }

    info!("Leaving session");
    peer.disconnect();
    drop(peer);
    runtime.block_on(connection.close());

    if let Some(shutdown) = hosted {
        shutdown.shutdown();
    }
    runtime.shutdown_timeout(Duration::from_millis(500));

    Ok(())
}
