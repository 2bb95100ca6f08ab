//! Console command parsing and routing
//!
//! Lines starting with a period are commands; anything else is chat. The
//! command word is case-insensitive, its argument (a player name) is not.

use crate::game::ClientMirror;
use shared::{Action, ClientPacket, GamePhase, Job, SELF_TARGET};
use thiserror::Error;

/// What a console line turned into
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// Send this request to the server
    Send(ClientPacket),
    /// Print these lines locally
    Show(Vec<String>),
    Quit,
    Nothing,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Whoops! '{0}' is not a command right now. Try again!")]
    UnknownCommand(String),
    #[error("Wait for your turn.")]
    NotYourTurn,
    #[error("Usage: {0} <name|me>")]
    MissingTarget(String),
    #[error("'{0}' is not a living player.")]
    InvalidTarget(String),
}

fn parse_job(command: &str) -> Option<Job> {
    match command {
        ".1" | ".wizard" => Some(Job::Wizard),
        ".2" | ".warrior" => Some(Job::Warrior),
        ".3" | ".assassin" => Some(Job::Assassin),
        _ => None,
    }
}

fn parse_action(command: &str) -> Option<Action> {
    match command {
        ".1" | ".heal" => Some(Action::Heal),
        ".2" | ".healrng" => Some(Action::HealRandom),
        ".3" | ".atk" => Some(Action::Attack),
        ".4" | ".atkrng" => Some(Action::AttackRandom),
        _ => None,
    }
}

/// Help text for the current phase
pub fn instructions(mirror: &ClientMirror) -> Vec<String> {
    let lines: &[&str] = if !mirror.in_progress() {
        &["You can either...", ".ready", ".notready", ".players", ".whoami"]
    } else {
        match mirror.game_phase() {
            GamePhase::CharacterSelect => &[
                "Select a character.",
                "1. .wizard",
                "2. .warrior",
                "3. .assassin",
                "For example: .1 or .wizard",
            ],
            GamePhase::Main => &[
                "Select an action.",
                "1. .heal (10)",
                "2. .healrng (5~15)",
                "3. .atk (12)",
                "4. .atkrng (6~18)",
                ".stats/.localstats",
                "For example: .1 me or .4 Bob",
            ],
            GamePhase::Pending | GamePhase::GameOver => &[".stats", ".localstats", ".whoami"],
        }
    };

    lines
        .iter()
        .map(|line| line.to_string())
        .chain(std::iter::once(".help/.quit".to_string()))
        .collect()
}

/// Turns one console line into an intent, updating the mirror for requests
/// that spend the turn or change local readiness.
pub fn route(line: &str, mirror: &mut ClientMirror) -> Result<Intent, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Intent::Nothing);
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default().to_lowercase();
    if !command.starts_with('.') {
        return Ok(Intent::Send(ClientPacket::Chat {
            text: line.to_string(),
        }));
    }

    match command.as_str() {
        ".whoami" => return Ok(Intent::Show(vec![mirror.name().to_string()])),
        ".help" => return Ok(Intent::Show(instructions(mirror))),
        ".quit" => return Ok(Intent::Quit),
        _ => {}
    }

    if !mirror.in_progress() {
        return match command.as_str() {
            ".ready" => {
                mirror.set_ready(true);
                Ok(Intent::Send(ClientPacket::Ready))
            }
            ".notready" => {
                mirror.set_ready(false);
                Ok(Intent::Send(ClientPacket::Unready))
            }
            ".players" => Ok(Intent::Send(ClientPacket::PlayerListRequest)),
            _ => Err(InputError::UnknownCommand(command)),
        };
    }

    match command.as_str() {
        ".stats" => return Ok(Intent::Send(ClientPacket::PlayerStatsRequest)),
        ".localstats" => return Ok(Intent::Show(mirror.local_stats())),
        _ => {}
    }

    match mirror.game_phase() {
        GamePhase::CharacterSelect => {
            let job = parse_job(&command).ok_or(InputError::UnknownCommand(command))?;
            if !mirror.my_turn() {
                return Err(InputError::NotYourTurn);
            }
            mirror.choose_job(job);
            Ok(Intent::Send(ClientPacket::JobChosen { job }))
        }
        GamePhase::Main => {
            let action = parse_action(&command).ok_or(InputError::UnknownCommand(command.clone()))?;
            if !mirror.my_turn() {
                return Err(InputError::NotYourTurn);
            }

            let target = words.next().ok_or(InputError::MissingTarget(command))?;
            if target != SELF_TARGET && mirror.living_player(target).is_none() {
                return Err(InputError::InvalidTarget(target.to_string()));
            }

            mirror.end_turn();
            Ok(Intent::Send(ClientPacket::ActionTaken {
                action,
                target: target.to_string(),
            }))
        }
        GamePhase::Pending | GamePhase::GameOver => Err(InputError::UnknownCommand(command)),
    }
}
