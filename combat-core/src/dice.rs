//! Dice rolling for combat resolution.
//!
//! Every roll draws from an injected [`DiceRng`], so resolution can run on
//! the thread generator in production and on seeded or scripted sequences
//! in tests. Damage formulas use the `XdY+Z` notation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Error type for strict damage formula parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiceError {
    #[error("Invalid damage formula: {0}")]
    InvalidFormula(String),
    #[error("No dice specified")]
    NoDice,
    #[error("Formula too large: {0}")]
    TooLarge(String),
}

/// Most dice one formula may roll before a critical doubles them.
pub const MAX_DICE: u32 = 100;

/// Largest die a formula may name.
pub const MAX_SIDES: u32 = 100;

/// Source of uniformly distributed integers.
pub trait DiceRng: Send + Sync {
    /// Return an integer uniformly distributed in `low..=high`.
    fn next_in_range(&self, low: u32, high: u32) -> u32;
}

/// Draws from the calling thread's generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDiceRng;

impl DiceRng for ThreadDiceRng {
    fn next_in_range(&self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        rand::thread_rng().gen_range(low..=high)
    }
}

/// Reproducible generator seeded once at construction.
#[derive(Debug)]
pub struct SeededDiceRng {
    inner: Mutex<StdRng>,
}

impl SeededDiceRng {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl DiceRng for SeededDiceRng {
    fn next_in_range(&self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        let mut rng = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        rng.gen_range(low..=high)
    }
}

/// Roll one die. A die with fewer than one side always shows 1.
pub fn roll_die(rng: &dyn DiceRng, sides: u32) -> u32 {
    rng.next_in_range(1, sides.max(1))
}

/// Roll `count` independent dice of the same size.
pub fn roll_many(rng: &dyn DiceRng, count: u32, sides: u32) -> Vec<u32> {
    (0..count).map(|_| roll_die(rng, sides)).collect()
}

/// Roll 1-100. Drives hit, critical and fumble resolution.
pub fn roll_percentile(rng: &dyn DiceRng) -> u32 {
    rng.next_in_range(1, 100)
}

/// A parsed `<count>d<sides>[+|-<modifier>]` damage formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DamageFormula {
    pub count: u32,
    pub sides: u32,
    pub modifier: i32,
}

impl DamageFormula {
    /// What an unparsable formula resolves to: `1d4`.
    pub const FALLBACK: DamageFormula = DamageFormula {
        count: 1,
        sides: 4,
        modifier: 0,
    };

    /// Parse a formula, rejecting anything that is not `XdY`, `XdY+Z` or `XdY-Z`.
    ///
    /// Case-insensitive; surrounding whitespace is ignored, inner whitespace is not.
    pub fn parse_strict(text: &str) -> Result<Self, DiceError> {
        let normalized = text.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(DiceError::NoDice);
        }
        let invalid = || DiceError::InvalidFormula(text.to_string());

        let (count_str, rest) = normalized.split_once('d').ok_or_else(invalid)?;
        let count = parse_digits(count_str).ok_or_else(invalid)?;

        let (sides_str, modifier) = match rest.find(|c: char| c == '+' || c == '-') {
            Some(pos) => {
                let (sides, signed) = rest.split_at(pos);
                let magnitude = parse_digits(&signed[1..])
                    .and_then(|m| i32::try_from(m).ok())
                    .ok_or_else(invalid)?;
                let modifier = if signed.starts_with('-') {
                    -magnitude
                } else {
                    magnitude
                };
                (sides, modifier)
            }
            None => (rest, 0),
        };
        let sides = parse_digits(sides_str).ok_or_else(invalid)?;
        if count > MAX_DICE || sides > MAX_SIDES {
            return Err(DiceError::TooLarge(text.to_string()));
        }

        Ok(Self {
            count,
            sides,
            modifier,
        })
    }

    /// Parse a formula, falling back to `1d4` when it does not match.
    ///
    /// Stored actions rely on this leniency; an unparsable formula must not
    /// abort an attack.
    pub fn parse_lenient(text: &str) -> Self {
        Self::parse_strict(text).unwrap_or(Self::FALLBACK)
    }

    /// Roll the formula's dice, doubling the dice count (never the modifier)
    /// on a critical.
    ///
    /// Counts and sizes beyond [`MAX_DICE`] and [`MAX_SIDES`] are clamped.
    pub fn roll_dice(&self, rng: &dyn DiceRng, critical: bool) -> Vec<u32> {
        let count = self.count.min(MAX_DICE);
        let count = if critical { count * 2 } else { count };
        roll_many(rng, count, self.sides.min(MAX_SIDES))
    }
}

fn parse_digits(s: &str) -> Option<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Lenient parse; see [`DamageFormula::parse_lenient`].
pub fn parse_damage_formula(text: &str) -> DamageFormula {
    DamageFormula::parse_lenient(text)
}

impl FromStr for DamageFormula {
    type Err = DiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DamageFormula::parse_strict(s)
    }
}

impl fmt::Display for DamageFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d{}", self.count, self.sides)?;
        match self.modifier {
            0 => Ok(()),
            m if m > 0 => write!(f, "+{m}"),
            m => write!(f, "{m}"),
        }
    }
}
