//! # Paint Server Library
//!
//! Authoritative server for the shared paint-by-numbers room. It owns the
//! canonical grid and economy, rules on every paint request, and tells all
//! connected clients about each outcome so their predictions converge.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Painting
//! A cell can be painted exactly once, and only with its own number. When
//! several clients race for the same cell, the request the room task handles
//! first wins and everyone else is told the cell is taken.
//!
//! ### Economy
//! Painting costs paint; paint comes back while standing in the recharge zone.
//! Finishing a grid pays gold to everyone connected, and gold buys upgrades.
//!
//! ### Grid Growth
//! A finished grid is replaced by a larger, freshly generated one and a full
//! snapshot is broadcast to all clients.
//!
//! ## Architecture Design
//!
//! ### Single-Owner Event Loop
//! One task owns the [`game::GameRoom`] and processes connection events in
//! arrival order. Check-then-paint sequences are therefore atomic without any
//! locking.
//!
//! ### TCP Framing
//! Each connection is a TCP stream of length-prefixed bincode packets (see
//! `shared::codec`). Per-connection writer tasks drain ordered outbound
//! queues, so every client observes results in the order the room produced
//! them.
//!
//! ## Module Organization
//!
//! - `authority`: packet handling and outbound routing decisions
//! - `client_manager`: connection identities, capacity, outbound queues
//! - `game`: room state, paint validation, economy and growth
//! - `network`: sockets, connection tasks and the room loop
//! - `session`: parked players for reconnect migration
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerError};
//! use shared::GameConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ServerError> {
//!     let mut server = Server::new("127.0.0.1:8080", GameConfig::default(), 32).await?;
//!     server.run().await
//! }
//! ```

pub mod authority;
pub mod client_manager;
pub mod game;
pub mod network;
pub mod session;
