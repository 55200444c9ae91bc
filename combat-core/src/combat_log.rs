//! Append-only combat log entries.
//!
//! Each entry records one resolved action. Entries are never edited or
//! removed once appended to a [`Combat`](crate::world::Combat).

use crate::world::ParticipantId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One resolved action in a combat's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogEntry {
    Attack(AttackLog),
    Flee(FleeLog),
}

impl LogEntry {
    pub fn round(&self) -> u32 {
        match self {
            LogEntry::Attack(entry) => entry.round,
            LogEntry::Flee(entry) => entry.round,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            LogEntry::Attack(entry) => entry.timestamp,
            LogEntry::Flee(entry) => entry.timestamp,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogEntry::Attack(entry) => fmt::Display::fmt(entry, f),
            LogEntry::Flee(entry) => fmt::Display::fmt(entry, f),
        }
    }
}

/// Outcome of one attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackLog {
    pub round: u32,
    pub attacker_id: ParticipantId,
    pub attacker_name: String,
    pub target_id: ParticipantId,
    pub target_name: String,
    pub action_name: String,
    /// Percentile roll (1-100).
    pub attack_roll: u32,
    pub success_rate: u32,
    pub hit: bool,
    pub critical: bool,
    pub fumble: bool,
    /// Formula text as stored on the action.
    pub damage_formula: String,
    /// Individual damage dice; empty on a miss.
    pub damage_dice: Vec<u32>,
    /// Zero on a miss, at least 1 on a hit.
    pub damage_total: i32,
    pub target_hp: i32,
    pub target_died: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for AttackLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[round {}] {} attacks {} with {} (roll {} vs {}%)",
            self.round,
            self.attacker_name,
            self.target_name,
            self.action_name,
            self.attack_roll,
            self.success_rate
        )?;

        if !self.hit {
            let outcome = if self.fumble { "fumble" } else { "miss" };
            return write!(f, ": {outcome}");
        }

        let dice = self
            .damage_dice
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            ": {}hit for {} ({} [{}]), {} at {} HP",
            if self.critical { "critical " } else { "" },
            self.damage_total,
            self.damage_formula,
            dice,
            self.target_name,
            self.target_hp
        )?;
        if self.target_died {
            write!(f, " - {} falls!", self.target_name)?;
        }
        Ok(())
    }
}

/// Outcome of a flee attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleeLog {
    pub round: u32,
    pub participant_id: ParticipantId,
    pub participant_name: String,
    /// Raw d20.
    pub roll: u32,
    pub modifier: i32,
    pub total: i32,
    pub dc: i32,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for FleeLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[round {}] {} tries to flee: {} {:+} = {} vs DC {}: {}",
            self.round,
            self.participant_name,
            self.roll,
            self.modifier,
            self.total,
            self.dc,
            if self.success { "escapes" } else { "fails" }
        )
    }
}
