//! Heal and attack resolution.

use crate::roster::Player;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    Action, ATTACK_AMOUNT, ATTACK_RANDOM_MAX, ATTACK_RANDOM_MIN, HEAL_AMOUNT, HEAL_RANDOM_MAX,
    HEAL_RANDOM_MIN,
};
use std::ops::RangeInclusive;

/// Source of the server-rolled amounts for random actions.
pub trait Dice: Send {
    /// Uniform integer in `range`, bounds inclusive.
    fn roll(&mut self, range: RangeInclusive<i32>) -> i32;
}

/// Production dice backed by any `rand` generator.
pub struct RandomDice<R: Rng>(pub R);

impl RandomDice<StdRng> {
    pub fn from_entropy() -> Self {
        RandomDice(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        RandomDice(StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> Dice for RandomDice<R> {
    fn roll(&mut self, range: RangeInclusive<i32>) -> i32 {
        self.0.gen_range(range)
    }
}

/// Signed health change for `action`: positive heals, negative damages.
pub fn health_delta(action: Action, dice: &mut dyn Dice) -> i32 {
    match action {
        Action::Heal => HEAL_AMOUNT,
        Action::HealRandom => dice.roll(HEAL_RANDOM_MIN..=HEAL_RANDOM_MAX),
        Action::Attack => -ATTACK_AMOUNT,
        Action::AttackRandom => -dice.roll(ATTACK_RANDOM_MIN..=ATTACK_RANDOM_MAX),
    }
}

/// Result of applying one action to its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub delta: i32,
    pub health: i32,
    pub died: bool,
}

/// Rolls and applies `action` to `target`. The caller guarantees the target
/// is alive.
pub fn resolve(action: Action, target: &mut Player, dice: &mut dyn Dice) -> Resolution {
    let delta = health_delta(action, dice);
    let died = target.apply_health_delta(delta);
    Resolution {
        delta,
        health: target.health,
        died,
    }
}

/// Broadcast line describing a resolved action.
pub fn describe(action: Action, actor: &str, target: &str, delta: i32) -> String {
    let amount = delta.abs();
    match action {
        Action::Heal => format!("{} healed {} for {}", actor, target, amount),
        Action::HealRandom => format!("{} randomly healed {} for {}", actor, target, amount),
        Action::Attack => format!("{} attacked {} for {}", actor, target, amount),
        Action::AttackRandom => format!("{} randomly attacked {} for {}", actor, target, amount),
    }
}
