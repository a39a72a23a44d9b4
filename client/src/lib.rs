//! # Paint Client Library
//!
//! Client side of the shared paint room: a mirror of the authoritative room,
//! the request bookkeeping that makes painting feel immediate, and the
//! transport loop that keeps the mirror in sync across reconnects.
//!
//! ## Architecture Overview
//!
//! ### Optimistic Deduplication
//! Whether a paint will be accepted cannot be known locally, so the client
//! does not draw ahead of the server. Instead every cell is tracked as
//! confirmed, pending, or eligible, and only eligible cells produce a request.
//! Unanswered requests are resent after a timeout and eventually dropped.
//!
//! ### Server Reconciliation
//! Paint results update the mirror as they arrive. A snapshot replaces the
//! mirror outright: the painted set is rebuilt from the snapshot's grid and all
//! pending requests are discarded, so applying the same snapshot twice is
//! harmless.
//!
//! ### Session Migration
//! Each connection gets a fresh player id from the server. After a reconnect
//! the client moves its own entry to the new id and rejoins with its cached
//! name, last position and resume token, so the server can hand back its gold
//! and upgrades.
//!
//! ## Module Organization
//!
//! - `connection`: connection states, backoff, manual retry
//! - `game`: the mirror and the prediction/reconciliation engine
//! - `input`: headless movement along the grid
//! - `network`: TCP session loop and reconnects
//! - `pending`: pending request ledgers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::{Client, ClientCommand, ClientOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let (mut client, commands) = Client::new(ClientOptions::new("127.0.0.1:8080", "ana"));
//!
//!     // Stop after a minute of painting
//!     tokio::spawn(async move {
//!         tokio::time::sleep(std::time::Duration::from_secs(60)).await;
//!         let _ = commands.send(ClientCommand::Quit);
//!     });
//!
//!     client.run().await
//! }
//! ```

pub mod connection;
pub mod game;
pub mod input;
pub mod network;
pub mod pending;
