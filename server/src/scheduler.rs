//! Turn ownership and the two sequencing rules of a session.
//!
//! Character select walks the roster once from front to back. The main phase
//! cycles through the roster, wrapping at the end and skipping dead players,
//! until a single survivor is left.

use crate::roster::{Player, PlayerId, Roster};
use log::debug;

/// Index of the first player after `current` that is still in play, without
/// wrapping. `None` starts from the front of the roster.
pub fn next_in_order(players: &[Player], current: Option<usize>) -> Option<usize> {
    let start = current.map_or(0, |index| index + 1);
    (start..players.len()).find(|&index| players[index].is_alive())
}

/// Index of the next alive player after `current`, wrapping around the end
/// of the roster. `current` itself is only returned when it is the sole
/// survivor.
pub fn next_alive(players: &[Player], current: usize) -> Option<usize> {
    let len = players.len();
    if len == 0 {
        return None;
    }

    (1..=len)
        .map(|step| (current + step) % len)
        .find(|&index| players[index].is_alive())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectStep {
    /// Another player still has to pick a job.
    Next(PlayerId),
    /// Everyone has picked; the main phase can begin.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MainStep {
    Turn(PlayerId),
    Winner(PlayerId),
    NoSurvivors,
}

/// Holds the single turn token of the session.
#[derive(Debug, Default)]
pub struct TurnScheduler {
    current: Option<PlayerId>,
}

impl TurnScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self) -> Option<PlayerId> {
        self.current
    }

    pub fn is_holder(&self, id: PlayerId) -> bool {
        self.current == Some(id)
    }

    /// Hands the first turn of character select to the front of the roster.
    pub fn begin(&mut self, roster: &Roster) -> Option<PlayerId> {
        self.current = next_in_order(roster.players(), None).map(|index| roster.players()[index].id);
        self.current
    }

    pub fn advance_character_select(&mut self, roster: &Roster) -> SelectStep {
        let current = self.current.and_then(|id| roster.index_of(id));

        match next_in_order(roster.players(), current) {
            Some(index) => {
                let id = roster.players()[index].id;
                self.current = Some(id);
                SelectStep::Next(id)
            }
            None => SelectStep::Finished,
        }
    }

    /// Moves the turn to the next alive player, then checks for a winner.
    pub fn advance_main(&mut self, roster: &Roster) -> MainStep {
        let players = roster.players();
        let from = self
            .current
            .and_then(|id| roster.index_of(id))
            .unwrap_or_else(|| players.len().saturating_sub(1));

        let Some(index) = next_alive(players, from) else {
            self.current = None;
            return MainStep::NoSurvivors;
        };

        let id = players[index].id;
        if roster.alive_count() == 1 {
            self.current = None;
            return MainStep::Winner(id);
        }

        debug!("Turn passes to {}", id);
        self.current = Some(id);
        MainStep::Turn(id)
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
