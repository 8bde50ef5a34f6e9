//! # Session Authority Library
//!
//! This library provides the authoritative side of the spectator session. It
//! owns the canonical session state (the active player and the rating),
//! applies peer commands, and broadcasts the results so every peer converges
//! on the same values.
//!
//! ## Core Responsibilities
//!
//! ### Single Writer
//! Peers never change shared state themselves. They send commands; the
//! authority applies each one and rebroadcasts the resulting value. Requests
//! are handled one at a time, so apply-then-broadcast is atomic from the
//! authority's point of view and no locking of session state is needed.
//!
//! ### Spawning
//! Every connecting peer gets one player entity. Late joiners receive all
//! existing entities, and everyone learns about the newcomer.
//!
//! ### Session Lifecycle
//! When the host stops, or the peer owning the active player leaves, the
//! session resets to defaults (`rating = 0`, no active player) and the reset
//! is pushed to every remaining peer.
//!
//! ## Module Organization
//!
//! ### Authority Module (`authority`)
//! Pure session logic with no I/O. Every operation returns the packets to
//! deliver, which makes the protocol testable without sockets.
//!
//! ### Client Manager Module (`client_manager`)
//! Connection bookkeeping: peer IDs, addresses, capacity, timeouts.
//!
//! ### Network Module (`network`)
//! UDP socket handling, the receive/send/timeout tasks and the main
//! `tokio::select!` loop that feeds the authority.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), shared::BoxError> {
//!     let mut server = Server::new("127.0.0.1:8080", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! A host process runs the same server in-process and connects to it over
//! loopback, which is how the client's `--host-session` flag works.

pub mod authority;
pub mod client_manager;
pub mod network;
