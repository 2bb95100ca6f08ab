//! Authoritative session state: lobby readiness, character select, the main
//! combat loop and game over.
//!
//! `GameSession` performs no I/O. Every operation mutates state first and
//! then returns the packets to emit, in order, as [`Outbound`] effects. The
//! network layer delivers them after the call returns.

use crate::resolver::{self, Dice};
use crate::roster::{PlayerId, RegistryError, Roster};
use crate::scheduler::{MainStep, SelectStep, TurnScheduler};
use log::{debug, info, warn};
use shared::{Action, ClientPacket, ConnectionPhase, GamePhase, Job, ServerPacket, SELF_TARGET};
use thiserror::Error;

/// A packet the session wants delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// To every connected participant
    Broadcast(ServerPacket),
    /// To one participant only
    Unicast(PlayerId, ServerPacket),
    /// Drop the connection once everything queued before it has been sent
    Close(PlayerId),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("'{request}' is not accepted in the current phase")]
    WrongPhase { request: &'static str },
    #[error("{0} does not hold the turn")]
    OutOfTurn(PlayerId),
    #[error("'{0}' is not a valid target")]
    InvalidTarget(String),
    #[error("{0} is not a selectable job")]
    InvalidJob(Job),
    #[error("connection {0} has not introduced itself")]
    UnknownPlayer(PlayerId),
}

impl SessionError {
    /// Rejections that end the connection instead of being ignored
    fn closes_connection(&self) -> bool {
        matches!(
            self,
            SessionError::Registry(
                RegistryError::RosterFull
                    | RegistryError::DuplicateName(_)
                    | RegistryError::InvalidName(_)
            )
        )
    }
}

pub struct GameSession {
    connection_phase: ConnectionPhase,
    game_phase: GamePhase,
    roster: Roster,
    turns: TurnScheduler,
    dice: Box<dyn Dice>,
}

impl GameSession {
    pub fn new(expected_players: usize, dice: Box<dyn Dice>) -> Self {
        Self {
            connection_phase: ConnectionPhase::Initializing,
            game_phase: GamePhase::Pending,
            roster: Roster::new(expected_players),
            turns: TurnScheduler::new(),
            dice,
        }
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        self.connection_phase
    }

    pub fn game_phase(&self) -> GamePhase {
        self.game_phase
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn current_turn(&self) -> Option<PlayerId> {
        self.turns.holder()
    }

    /// Marks the listening socket as ready for players.
    pub fn open(&mut self) {
        self.advance_connection(ConnectionPhase::AcceptingConnections);
    }

    fn advance_connection(&mut self, phase: ConnectionPhase) {
        if phase > self.connection_phase {
            debug!("Connection phase {:?} -> {:?}", self.connection_phase, phase);
            self.connection_phase = phase;
        } else if phase < self.connection_phase {
            warn!(
                "Ignoring connection phase regression {:?} -> {:?}",
                self.connection_phase, phase
            );
        }
    }

    fn advance_game(&mut self, phase: GamePhase) {
        if phase > self.game_phase {
            debug!("Game phase {:?} -> {:?}", self.game_phase, phase);
            self.game_phase = phase;
        } else if phase < self.game_phase {
            warn!(
                "Ignoring game phase regression {:?} -> {:?}",
                self.game_phase, phase
            );
        }
    }

    /// Entry point for every inbound packet. Rejected requests are logged and
    /// leave the session untouched.
    pub fn handle(&mut self, id: PlayerId, packet: ClientPacket) -> Vec<Outbound> {
        let result = match packet {
            ClientPacket::Intro { name, ready } => self.register(id, &name, ready),
            ClientPacket::Ready => self.set_ready(id, true),
            ClientPacket::Unready => self.set_ready(id, false),
            ClientPacket::PlayerListRequest => self.player_list(id),
            ClientPacket::PlayerStatsRequest => self.player_stats(id),
            ClientPacket::Chat { text } => self.chat(id, &text),
            ClientPacket::JobChosen { job } => self.choose_job(id, job),
            ClientPacket::ActionTaken { action, target } => self.take_action(id, action, &target),
        };

        match result {
            Ok(out) => out,
            Err(e) => {
                warn!("Rejected request from {}: {}", id, e);
                if e.closes_connection() {
                    vec![
                        Outbound::Unicast(
                            id,
                            ServerPacket::Disconnected {
                                reason: e.to_string(),
                            },
                        ),
                        Outbound::Close(id),
                    ]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn name_of(&self, id: PlayerId) -> Result<String, SessionError> {
        self.roster
            .get(id)
            .map(|player| player.name.clone())
            .ok_or(SessionError::UnknownPlayer(id))
    }

    fn waiting_line(&self) -> Option<String> {
        let missing = self.roster.capacity().saturating_sub(self.roster.len());
        match missing {
            0 => None,
            1 => Some("Waiting for 1 more player.".to_string()),
            n => Some(format!("Waiting for {} more players.", n)),
        }
    }

    pub fn register(
        &mut self,
        id: PlayerId,
        name: &str,
        ready: bool,
    ) -> Result<Vec<Outbound>, SessionError> {
        if self.connection_phase == ConnectionPhase::InProgress {
            return Err(RegistryError::RosterFull.into());
        }

        self.roster.register(id, name, ready)?;
        self.advance_connection(ConnectionPhase::LobbyOpen);

        let mut out = vec![Outbound::Broadcast(ServerPacket::server_line(format!(
            "{} has joined.",
            name
        )))];
        if let Some(line) = self.waiting_line() {
            out.push(Outbound::Broadcast(ServerPacket::server_line(line)));
        }
        if ready {
            self.try_start(&mut out);
        }
        Ok(out)
    }

    pub fn set_ready(&mut self, id: PlayerId, ready: bool) -> Result<Vec<Outbound>, SessionError> {
        if self.connection_phase == ConnectionPhase::InProgress {
            return Err(SessionError::WrongPhase {
                request: if ready { "ready" } else { "unready" },
            });
        }

        let player = self
            .roster
            .get_mut(id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        player.ready = ready;
        let line = if ready {
            format!("{} is ready.", player.name)
        } else {
            format!("{} is not ready.", player.name)
        };

        let mut out = vec![Outbound::Broadcast(ServerPacket::server_line(line))];
        if ready {
            self.try_start(&mut out);
        }
        Ok(out)
    }

    fn try_start(&mut self, out: &mut Vec<Outbound>) {
        if self.connection_phase < ConnectionPhase::InProgress
            && self.roster.is_full()
            && !self.roster.is_empty()
            && self.roster.all_ready()
        {
            self.start_game(out);
        }
    }

    fn start_game(&mut self, out: &mut Vec<Outbound>) {
        info!("Game has started.");
        self.advance_connection(ConnectionPhase::InProgress);
        self.advance_game(GamePhase::CharacterSelect);
        out.push(Outbound::Broadcast(ServerPacket::GameStarted));

        // From here on the flag means "has chosen a job"
        for player in self.roster.players_mut() {
            player.ready = false;
        }

        if let Some(first) = self.turns.begin(&self.roster) {
            out.push(Outbound::Unicast(first, ServerPacket::TakeTurn));
        }
    }

    pub fn player_list(&self, id: PlayerId) -> Result<Vec<Outbound>, SessionError> {
        self.name_of(id)?;
        let players = self
            .roster
            .players()
            .iter()
            .map(|player| (player.name.clone(), player.ready))
            .collect();
        Ok(vec![Outbound::Unicast(
            id,
            ServerPacket::PlayerListReply { players },
        )])
    }

    pub fn player_stats(&self, id: PlayerId) -> Result<Vec<Outbound>, SessionError> {
        self.name_of(id)?;
        let players = self
            .roster
            .players()
            .iter()
            .map(|player| (player.name.clone(), player.job, player.health))
            .collect();
        Ok(vec![Outbound::Unicast(
            id,
            ServerPacket::PlayerStatsReply { players },
        )])
    }

    pub fn chat(&self, id: PlayerId, text: &str) -> Result<Vec<Outbound>, SessionError> {
        let name = self.name_of(id)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let line = format!("{}: {}", name, text);
        info!("{}", line);
        Ok(vec![Outbound::Broadcast(ServerPacket::Chat { text: line })])
    }

    /// A line typed on the server console
    pub fn server_chat(&self, text: &str) -> Vec<Outbound> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        vec![Outbound::Broadcast(ServerPacket::server_line(text))]
    }

    pub fn choose_job(&mut self, id: PlayerId, job: Job) -> Result<Vec<Outbound>, SessionError> {
        if self.game_phase != GamePhase::CharacterSelect {
            return Err(SessionError::WrongPhase {
                request: "choose job",
            });
        }
        if job == Job::Unassigned {
            return Err(SessionError::InvalidJob(job));
        }
        if !self.turns.is_holder(id) {
            return Err(SessionError::OutOfTurn(id));
        }

        let player = self
            .roster
            .get_mut(id)
            .ok_or(SessionError::UnknownPlayer(id))?;
        player.job = job;
        player.ready = true;
        let line = format!("{} has chosen to be a {}", player.name, job);
        info!("{}", line);

        let mut out = vec![Outbound::Broadcast(ServerPacket::server_line(line))];
        self.advance_character_select(&mut out);
        Ok(out)
    }

    fn advance_character_select(&mut self, out: &mut Vec<Outbound>) {
        match self.turns.advance_character_select(&self.roster) {
            SelectStep::Next(id) => out.push(Outbound::Unicast(id, ServerPacket::TakeTurn)),
            SelectStep::Finished => self.start_main(out),
        }
    }

    fn start_main(&mut self, out: &mut Vec<Outbound>) {
        info!("Character select finished, entering main phase.");
        self.advance_game(GamePhase::Main);
        out.push(Outbound::Broadcast(ServerPacket::GameStateUpdate {
            phase: GamePhase::Main,
            roster: Some(self.roster.snapshots()),
        }));
        self.advance_main(out);
    }

    fn advance_main(&mut self, out: &mut Vec<Outbound>) {
        match self.turns.advance_main(&self.roster) {
            MainStep::Turn(id) => {
                if let Some(player) = self.roster.get(id) {
                    out.push(Outbound::Broadcast(ServerPacket::server_line(format!(
                        "{}'s turn",
                        player.name
                    ))));
                }
                out.push(Outbound::Unicast(id, ServerPacket::TakeTurn));
            }
            MainStep::Winner(id) => {
                let winner = self.roster.get(id).map(|player| player.name.clone());
                self.finish(winner, out);
            }
            MainStep::NoSurvivors => self.finish(None, out),
        }
    }

    fn finish(&mut self, winner: Option<String>, out: &mut Vec<Outbound>) {
        self.turns.clear();
        self.advance_game(GamePhase::GameOver);

        let line = match winner {
            Some(name) => format!("{} wins!", name),
            None => "Nobody wins.".to_string(),
        };
        info!("Game over: {}", line);
        out.push(Outbound::Broadcast(ServerPacket::server_line(line)));
        out.push(Outbound::Broadcast(ServerPacket::GameStateUpdate {
            phase: GamePhase::GameOver,
            roster: None,
        }));
    }

    pub fn take_action(
        &mut self,
        id: PlayerId,
        action: Action,
        target: &str,
    ) -> Result<Vec<Outbound>, SessionError> {
        if self.game_phase != GamePhase::Main {
            return Err(SessionError::WrongPhase { request: "action" });
        }
        if !self.turns.is_holder(id) {
            return Err(SessionError::OutOfTurn(id));
        }

        let actor = self.name_of(id)?;
        let target_id = if target == SELF_TARGET {
            id
        } else {
            match self.roster.find_by_name(target) {
                Ok(player) if player.is_alive() => player.id,
                _ => return Err(SessionError::InvalidTarget(target.to_string())),
            }
        };

        let player = self
            .roster
            .get_mut(target_id)
            .ok_or(SessionError::UnknownPlayer(target_id))?;
        let resolution = resolver::resolve(action, player, self.dice.as_mut());
        let target_name = player.name.clone();

        if resolution.died {
            info!("{} is dead", target_name);
        } else {
            info!("{} is now at {} health", target_name, resolution.health);
        }

        let mut out = vec![
            Outbound::Broadcast(ServerPacket::server_line(resolver::describe(
                action,
                &actor,
                &target_name,
                resolution.delta,
            ))),
            Outbound::Broadcast(ServerPacket::PlayerHpUpdate {
                name: target_name,
                health: resolution.health,
            }),
        ];
        self.advance_main(&mut out);
        Ok(out)
    }

    /// Handles a lost connection. Lobby players are simply removed; once the
    /// game started the player forfeits and counts as dead.
    pub fn disconnect(&mut self, id: PlayerId) -> Vec<Outbound> {
        let Ok(name) = self.name_of(id) else {
            debug!("Unregistered connection {} closed", id);
            return Vec::new();
        };

        let mut out = Vec::new();
        if self.connection_phase < ConnectionPhase::InProgress {
            self.roster.remove(id);
            out.push(Outbound::Broadcast(ServerPacket::server_line(format!(
                "{} has left.",
                name
            ))));
            if let Some(line) = self.waiting_line() {
                out.push(Outbound::Broadcast(ServerPacket::server_line(line)));
            }
            return out;
        }

        if self.game_phase == GamePhase::GameOver {
            info!("{} left after the game ended", name);
            return out;
        }

        let Some(player) = self.roster.get_mut(id) else {
            return out;
        };
        if !player.is_alive() {
            return out;
        }
        player.forfeit();
        let health = player.health;
        info!("{} forfeits by disconnecting", name);

        out.push(Outbound::Broadcast(ServerPacket::server_line(format!(
            "{} has left the game.",
            name
        ))));
        out.push(Outbound::Broadcast(ServerPacket::PlayerHpUpdate {
            name,
            health,
        }));

        match self.game_phase {
            GamePhase::CharacterSelect if self.turns.is_holder(id) => {
                self.advance_character_select(&mut out);
            }
            GamePhase::Main if self.turns.is_holder(id) => self.advance_main(&mut out),
            GamePhase::Main if self.roster.alive_count() <= 1 => {
                let winner = self
                    .roster
                    .players()
                    .iter()
                    .find(|player| player.is_alive())
                    .map(|player| player.name.clone());
                self.finish(winner, &mut out);
            }
            _ => {}
        }
        out
    }
}
