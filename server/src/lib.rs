//! # Session Server Library
//!
//! Authoritative server for a small turn-based role-playing session. It owns
//! the only writable copy of the game state: who is registered, who is
//! ready, whose turn it is and every player's health. Clients only ever see
//! the results through broadcasts.
//!
//! ## Session Flow
//!
//! 1. **Lobby**: connections introduce themselves with a unique name and
//!    toggle a ready flag. When the roster reaches the expected size and
//!    everyone is ready the game starts, exactly once.
//! 2. **Character select**: players pick a job one after the other in
//!    registration order.
//! 3. **Main**: the turn cycles through the surviving players. Each turn is
//!    one heal or attack against any living player, including oneself.
//! 4. **Game over**: declared as soon as a single player is left alive.
//!
//! ## Architecture
//!
//! ### Single Owner
//! `network::Server::run` is the only code that touches the `GameSession`.
//! Connection reader tasks forward decoded packets over a channel, and the
//! session answers with an ordered list of effects that the loop hands to
//! per-connection writer tasks. There are no locks around game state.
//!
//! ### Pure Game Logic
//! `game`, `roster`, `scheduler` and `resolver` perform no I/O. Randomness is
//! injected through the `resolver::Dice` trait so sessions can be replayed
//! deterministically in tests.
//!
//! ## Module Organization
//!
//! - `roster`: player records, name uniqueness, capacity and turn order
//! - `scheduler`: turn ownership for character select and the main phase
//! - `resolver`: heal/attack amounts and death
//! - `game`: the session state machine and its outbound effects
//! - `network`: TCP accept loop, connection tasks and the server console
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         expected_players: 3,
//!         seed: None,
//!     };
//!     let mut server = Server::bind("127.0.0.1:60000", config).await?;
//!
//!     // Lines sent here are broadcast as server chat; ".quit" stops the server
//!     let (_console_tx, console_rx) = mpsc::unbounded_channel();
//!     server.run(console_rx).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod game;
pub mod network;
pub mod resolver;
pub mod roster;
pub mod scheduler;
