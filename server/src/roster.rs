//! Player registry and the fixed turn order of a session
//!
//! This module owns the server-side record of every participant:
//! - Registration of a transport connection under a unique display name
//! - Capacity enforcement against the expected player count
//! - Lookup by connection id and by name (used for action targets)
//! - The append-only order that defines turn sequencing
//!
//! Players are stored in registration order with id and name indices on the
//! side, so "the next player after X" is a plain index computation.

use log::info;
use shared::{Job, PlayerSnapshot, MAX_NAME_LEN, STARTING_HEALTH};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Stable identifier of a participant, derived from its transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlayerId(pub u32);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Server full")]
    RosterFull,
    #[error("Name '{0}' is already taken")]
    DuplicateName(String),
    #[error("Invalid name '{0}'")]
    InvalidName(String),
    #[error("Connection {0} is already registered")]
    AlreadyRegistered(PlayerId),
    #[error("No player named '{0}'")]
    NotFound(String),
}

/// Authoritative state of one participant
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub health: i32,
    /// Lobby readiness; after the game starts it means "has chosen a job"
    pub ready: bool,
    pub job: Job,
    alive: bool,
}

impl Player {
    pub fn new(id: PlayerId, name: String, ready: bool) -> Self {
        Self {
            id,
            name,
            health: STARTING_HEALTH,
            ready,
            job: Job::Unassigned,
            alive: true,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Applies a health change. Returns true when this change killed the player.
    ///
    /// A dead player's health is frozen; death is permanent.
    pub fn apply_health_delta(&mut self, delta: i32) -> bool {
        if !self.alive {
            return false;
        }

        self.health = self.health.saturating_add(delta);
        if self.health <= 0 {
            self.alive = false;
            return true;
        }
        false
    }

    /// Removes the player from play without an attack, e.g. on disconnect.
    pub fn forfeit(&mut self) {
        self.health = self.health.min(0);
        self.alive = false;
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            name: self.name.clone(),
            health: self.health,
            ready: self.ready,
            job: self.job,
        }
    }
}

/// Checks a requested display name. Names are single words so that they can
/// be typed as an action target.
pub fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty()
        || name.len() > MAX_NAME_LEN
        || name.chars().any(|c| c.is_whitespace() || c.is_control())
    {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Ordered collection of registered players
pub struct Roster {
    players: Vec<Player>,
    by_id: HashMap<PlayerId, usize>,
    by_name: HashMap<String, usize>,
    capacity: usize,
}

impl Roster {
    pub fn new(capacity: usize) -> Self {
        Self {
            players: Vec::with_capacity(capacity),
            by_id: HashMap::new(),
            by_name: HashMap::new(),
            capacity,
        }
    }

    /// Registers a connection under a display name
    ///
    /// The player is appended to the turn order. Fails when the roster is
    /// already at capacity, the name is taken or malformed, or the connection
    /// has registered before.
    pub fn register(
        &mut self,
        id: PlayerId,
        name: &str,
        ready: bool,
    ) -> Result<PlayerId, RegistryError> {
        if self.by_id.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }
        if self.is_full() {
            return Err(RegistryError::RosterFull);
        }
        validate_name(name)?;
        if self.by_name.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        let index = self.players.len();
        self.players.push(Player::new(id, name.to_string(), ready));
        self.by_id.insert(id, index);
        self.by_name.insert(name.to_string(), index);

        info!("Registered {} as '{}' (slot {})", id, name, index);
        Ok(id)
    }

    /// Drops a player before the session started. Later slots shift down.
    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        let index = self.by_id.get(&id).copied()?;
        let player = self.players.remove(index);
        self.reindex();
        info!("Removed '{}' from the roster", player.name);
        Some(player)
    }

    fn reindex(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
        for (index, player) in self.players.iter().enumerate() {
            self.by_id.insert(player.id, index);
            self.by_name.insert(player.name.clone(), index);
        }
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.by_id.get(&id).map(|&index| &self.players[index])
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        match self.by_id.get(&id) {
            Some(&index) => Some(&mut self.players[index]),
            None => None,
        }
    }

    /// Exact, case-sensitive name lookup. Dead players are still found.
    pub fn find_by_name(&self, name: &str) -> Result<&Player, RegistryError> {
        self.by_name
            .get(name)
            .map(|&index| &self.players[index])
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn index_of(&self, id: PlayerId) -> Option<usize> {
        self.by_id.get(&id).copied()
    }

    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.iter_mut()
    }

    pub fn all_ready(&self) -> bool {
        self.players.iter().all(|player| player.ready)
    }

    pub fn alive_count(&self) -> usize {
        self.players.iter().filter(|player| player.is_alive()).count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_full(&self) -> bool {
        self.players.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.players.iter().map(Player::snapshot).collect()
    }
}
