//! # Spectator Session Client Library
//!
//! This library provides the peer side of the spectator session: the local
//! replica of the shared state, the replicated player entities with their
//! role setup, the request channel to the authority, and a small macroquad
//! front-end.
//!
//! ## Architecture Overview
//!
//! ### Requests Up, Broadcasts Down
//! A peer never writes shared state itself. It queues commands for the
//! authority (claim the player, rate the player, ask for a resync) and
//! applies whatever the authority broadcasts back. The only local write is
//! the rating prediction, which shows the requester its own change
//! immediately and is overwritten by the next broadcast.
//!
//! ### Role Setup
//! Every entity is set up exactly once. Entities owned by this process learn
//! their role on activation. Mirrored entities subscribe to the active-player
//! value and finish setup when the authority announces it.
//!
//! ## Module Organization
//!
//! ### Replica Module (`replica`)
//! The cached rating and active player, plus the rating label.
//!
//! ### Entity Module (`entity`)
//! Player entities, their components and the role setup state machine.
//!
//! ### Peer Module (`peer`)
//! Packet handling, the requests each event implies, and per-frame updates.
//!
//! ### Network Module (`network`)
//! UDP socket, heartbeat and the channels connecting a `Peer` to the
//! authority.
//!
//! ### Input and Rendering Modules (`input`, `rendering`)
//! Keyboard sampling and top-down drawing with macroquad.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::connect;
//! use client::peer::{Peer, PeerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shared::BoxError> {
//!     let mut connection = connect("127.0.0.1:8080".parse()?, "viewer", false).await?;
//!     let mut peer = Peer::new(PeerConfig::default(), false, connection.outbound.clone());
//!
//!     while let Some(packet) = connection.inbound.recv().await {
//!         peer.handle_packet(packet);
//!         println!("{}", peer.replica().label().text());
//!     }
//!     Ok(())
//! }
//! ```

pub mod entity;
pub mod input;
pub mod network;
pub mod peer;
pub mod rendering;
pub mod replica;
