//! Protocol types shared by the session server and the console client.
//!
//! Every packet is encoded as `[1-byte kind][fields in declaration order]`
//! (see [`codec`]) and carried over a reliable, ordered stream.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod codec;

pub use codec::{decode, encode, read_frame, write_packet, ProtocolError};

pub const STARTING_HEALTH: i32 = 100;
pub const DEFAULT_EXPECTED_PLAYERS: usize = 3;
pub const MAX_NAME_LEN: usize = 32;
pub const MAX_PACKET_SIZE: usize = 4096;

pub const HEAL_AMOUNT: i32 = 10;
pub const HEAL_RANDOM_MIN: i32 = 5;
pub const HEAL_RANDOM_MAX: i32 = 15;
pub const ATTACK_AMOUNT: i32 = 12;
pub const ATTACK_RANDOM_MIN: i32 = 6;
pub const ATTACK_RANDOM_MAX: i32 = 18;

/// Prefix for every text line the server itself originates.
pub const SERVER_PREFIX: &str = "[Server] ";
/// Target name that resolves to the acting player.
pub const SELF_TARGET: &str = "me";

/// Character class picked during character select.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Job {
    Wizard,
    Warrior,
    Assassin,
    #[default]
    Unassigned,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Job::Unassigned => "Jobless",
            Job::Wizard => "Wizard",
            Job::Warrior => "Warrior",
            Job::Assassin => "Assassin",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Heal,
    HealRandom,
    Attack,
    AttackRandom,
}

/// Transport-facing lifecycle of a session. Only ever advances.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum ConnectionPhase {
    #[default]
    Initializing,
    AcceptingConnections,
    LobbyOpen,
    InProgress,
}

/// Game lifecycle, meaningful once the connection phase is `InProgress`.
/// Only ever advances.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum GamePhase {
    #[default]
    Pending,
    CharacterSelect,
    Main,
    GameOver,
}

/// One roster row as carried by `GameStateUpdate`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub name: String,
    pub health: i32,
    /// Lobby readiness, or "has chosen a job" once the game started.
    pub ready: bool,
    pub job: Job,
}

impl PlayerSnapshot {
    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

/// Requests a client sends to the server. Variant order is the wire tag.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ClientPacket {
    Intro { name: String, ready: bool },
    Ready,
    Unready,
    PlayerListRequest,
    PlayerStatsRequest,
    Chat { text: String },
    JobChosen { job: Job },
    ActionTaken { action: Action, target: String },
}

/// Events the server pushes to one or all clients. Variant order is the wire tag.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub enum ServerPacket {
    /// Plain text line; server-originated lines carry [`SERVER_PREFIX`].
    Chat { text: String },
    GameStarted,
    PlayerListReply { players: Vec<(String, bool)> },
    PlayerStatsReply { players: Vec<(String, Job, i32)> },
    /// Unicast to the current turn holder only.
    TakeTurn,
    /// The roster is present only on the transition into `Main`.
    GameStateUpdate {
        phase: GamePhase,
        roster: Option<Vec<PlayerSnapshot>>,
    },
    PlayerHpUpdate { name: String, health: i32 },
    /// Sent right before the server closes a rejected connection.
    Disconnected { reason: String },
}

impl ServerPacket {
    /// A chat line attributed to the server.
    pub fn server_line(text: impl AsRef<str>) -> Self {
        ServerPacket::Chat {
            text: format!("{}{}", SERVER_PREFIX, text.as_ref()),
        }
    }
}
