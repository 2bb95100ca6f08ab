//! # Console Client Library
//!
//! Client side of the turn-based session. The client keeps no authority of
//! its own: it mirrors what the server broadcasts and only lets the player
//! act when the server has handed them the turn.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! `ClientMirror`, the local projection of the session:
//! - The player's own record (name, health, readiness, job)
//! - The roster snapshot received when the main phase begins, patched by
//!   health updates
//! - Connection and game phases, and whether it is currently our turn
//!
//! ### Input Module (`input`)
//! Parses console lines into requests:
//! - Lobby commands (`.ready`, `.notready`, `.players`)
//! - Job and action commands, only while holding the turn
//! - Local commands (`.whoami`, `.localstats`, `.help`, `.quit`)
//! - Everything else is sent as chat
//!
//! ### Network Module (`network`)
//! TCP connection handling: connecting (optionally from a fixed local port),
//! the intro handshake, a reader task for server packets and the loop that
//! joins them with console input.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::new("127.0.0.1:60000", None, "Alice").await?;
//!
//!     // Feed console lines into the client
//!     let (line_tx, line_rx) = mpsc::unbounded_channel();
//!     line_tx.send(".ready".to_string())?;
//!
//!     client.run(line_rx).await?;
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod input;
pub mod network;
