//! Client-side mirror of the session, rebuilt from server broadcasts

use log::{debug, warn};
use shared::{ConnectionPhase, GamePhase, Job, PlayerSnapshot, ServerPacket, STARTING_HEALTH};

/// Read-only projection of the authoritative session.
///
/// The mirror never decides anything on its own; it only remembers what the
/// server said so that input can be checked locally before it is sent.
#[derive(Debug, Clone)]
pub struct ClientMirror {
    me: PlayerSnapshot,
    roster: Vec<PlayerSnapshot>,
    connection_phase: ConnectionPhase,
    game_phase: GamePhase,
    my_turn: bool,
}

impl ClientMirror {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            me: PlayerSnapshot {
                name: name.into(),
                health: STARTING_HEALTH,
                ready: false,
                job: Job::Unassigned,
            },
            roster: Vec::new(),
            connection_phase: ConnectionPhase::Initializing,
            game_phase: GamePhase::Pending,
            my_turn: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.me.name
    }

    pub fn me(&self) -> &PlayerSnapshot {
        &self.me
    }

    pub fn roster(&self) -> &[PlayerSnapshot] {
        &self.roster
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        self.connection_phase
    }

    pub fn game_phase(&self) -> GamePhase {
        self.game_phase
    }

    pub fn my_turn(&self) -> bool {
        self.my_turn
    }

    pub fn in_lobby(&self) -> bool {
        self.connection_phase == ConnectionPhase::LobbyOpen
    }

    pub fn in_progress(&self) -> bool {
        self.connection_phase == ConnectionPhase::InProgress
    }

    /// The transport is up and the intro is on its way.
    pub fn connected(&mut self) {
        self.advance_connection(ConnectionPhase::LobbyOpen);
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.me.ready = ready;
    }

    /// Records a submitted job choice; the turn is spent either way.
    pub fn choose_job(&mut self, job: Job) {
        self.me.job = job;
        self.me.ready = true;
        self.my_turn = false;
    }

    /// Gives up the turn after submitting an action.
    pub fn end_turn(&mut self) {
        self.my_turn = false;
    }

    /// A living roster entry with exactly this name.
    pub fn living_player(&self, name: &str) -> Option<&PlayerSnapshot> {
        self.roster
            .iter()
            .find(|player| player.name == name && player.is_alive())
    }

    fn advance_connection(&mut self, phase: ConnectionPhase) {
        if phase > self.connection_phase {
            self.connection_phase = phase;
        }
    }

    fn advance_game(&mut self, phase: GamePhase) {
        if phase > self.game_phase {
            self.game_phase = phase;
        } else if phase < self.game_phase {
            warn!(
                "Ignoring game phase regression {:?} -> {:?}",
                self.game_phase, phase
            );
        }
    }

    /// Applies one server packet and returns the lines to show the user.
    pub fn apply(&mut self, packet: ServerPacket) -> Vec<String> {
        match packet {
            ServerPacket::Chat { text } => vec![text],

            ServerPacket::GameStarted => {
                self.advance_connection(ConnectionPhase::InProgress);
                self.advance_game(GamePhase::CharacterSelect);
                self.me.ready = false;
                vec!["The game has begun! Wait for your turn to pick a job.".to_string()]
            }

            ServerPacket::PlayerListReply { players } => players
                .iter()
                .enumerate()
                .map(|(i, (name, ready))| {
                    format!(
                        "{}. {} | {}",
                        i + 1,
                        name,
                        if *ready { "Ready" } else { "Not Ready" }
                    )
                })
                .collect(),

            ServerPacket::PlayerStatsReply { players } => players
                .iter()
                .enumerate()
                .map(|(i, (name, job, health))| {
                    format!("{}. {} The {} has {} health", i + 1, name, job, health)
                })
                .collect(),

            ServerPacket::TakeTurn => {
                self.my_turn = true;
                let mut lines = vec!["It's your turn!".to_string()];
                lines.extend(crate::input::instructions(self));
                lines
            }

            ServerPacket::GameStateUpdate { phase, roster } => {
                self.advance_game(phase);
                let mut lines = Vec::new();

                if let Some(roster) = roster {
                    if let Some(me) = roster.iter().find(|player| player.name == self.me.name) {
                        self.me = me.clone();
                    }
                    debug!("Roster replaced with {} players", roster.len());
                    self.roster = roster;
                    lines.push("Everyone has picked a job. Let the fight begin!".to_string());
                }

                if phase == GamePhase::GameOver {
                    self.my_turn = false;
                    lines.push("Game over.".to_string());
                }
                lines
            }

            ServerPacket::PlayerHpUpdate { name, health } => self.update_health(&name, health),

            ServerPacket::Disconnected { reason } => {
                self.my_turn = false;
                vec![format!("Disconnected by the server: {}", reason)]
            }
        }
    }

    fn update_health(&mut self, name: &str, health: i32) -> Vec<String> {
        let mut lines = Vec::new();

        match self.roster.iter_mut().find(|player| player.name == name) {
            Some(player) => {
                player.health = health;
                if health > 0 {
                    lines.push(format!("{} is now at {} health", name, health));
                } else {
                    lines.push(format!("{} is dead", name));
                }
            }
            None => warn!("Health update for unknown player '{}'", name),
        }

        if self.me.name == name {
            self.me.health = health;
            if health <= 0 {
                lines.push("You are dead.".to_string());
            }
        }
        lines
    }

    /// Local view of every player, without asking the server.
    pub fn local_stats(&self) -> Vec<String> {
        let mut lines = vec!["Local player stats:".to_string()];
        lines.extend(self.roster.iter().map(|player| {
            format!(
                "{} The {} has {} health",
                player.name, player.job, player.health
            )
        }));
        lines
    }
}
