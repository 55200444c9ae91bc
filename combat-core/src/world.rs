//! Tabletop game world types as seen by the combat engine.
//!
//! Contains the read-only source records (games, characters, monsters),
//! attack definitions, and the two entities the engine owns: [`Combat`]
//! and [`CombatParticipant`].

use crate::combat_log::LogEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id!(
    /// Unique identifier for a game (campaign) record.
    GameId
);
define_id!(
    /// Unique identifier for an authenticated user.
    UserId
);
define_id!(
    /// Unique identifier for a player character record.
    CharacterId
);
define_id!(
    /// Unique identifier for a monster record.
    MonsterId
);
define_id!(
    /// Unique identifier for a combat encounter.
    CombatId
);
define_id!(
    /// Unique identifier for a combatant inside one encounter.
    ParticipantId
);

// ============================================================================
// Ability Scores
// ============================================================================

/// Modifier for an ability score: `floor((score - 10) / 2)`.
pub fn ability_modifier(score: i32) -> i32 {
    // Floor division, so 9 gives -1 rather than 0
    (score - 10).div_euclid(2)
}

/// Ability scores container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityScores {
    pub strength: u8,
    pub dexterity: u8,
    pub constitution: u8,
    pub intelligence: u8,
    pub wisdom: u8,
    pub charisma: u8,
}

impl AbilityScores {
    pub fn new(str: u8, dex: u8, con: u8, int: u8, wis: u8, cha: u8) -> Self {
        Self {
            strength: str,
            dexterity: dex,
            constitution: con,
            intelligence: int,
            wisdom: wis,
            charisma: cha,
        }
    }
}

impl Default for AbilityScores {
    fn default() -> Self {
        Self::new(10, 10, 10, 10, 10, 10)
    }
}

// ============================================================================
// Actions
// ============================================================================

/// An attack definition carried by a character, monster or participant.
///
/// Missing fields are filled in at resolution time (`1d4`, 50%).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub damage: Option<String>,
    /// Chance to hit as a percentage (0-100).
    #[serde(default)]
    pub success_rate: Option<u32>,
}

impl Action {
    pub fn new(name: impl Into<String>, damage: impl Into<String>, success_rate: u32) -> Self {
        Self {
            name: name.into(),
            damage: Some(damage.into()),
            success_rate: Some(success_rate),
        }
    }

    /// An action with only a name; formula and success rate use the defaults.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            damage: None,
            success_rate: None,
        }
    }
}

// ============================================================================
// Source Records
// ============================================================================

/// A game (campaign) record. The owner is the game master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    pub id: GameId,
    pub name: String,
    pub owner_id: UserId,
}

impl GameRecord {
    pub fn new(name: impl Into<String>, owner_id: UserId) -> Self {
        Self {
            id: GameId::new(),
            name: name.into(),
            owner_id,
        }
    }
}

/// Combat-relevant stats shared by characters and monsters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatStats {
    pub abilities: AbilityScores,
    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    pub speed: u32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            abilities: AbilityScores::default(),
            hp: 10,
            max_hp: 10,
            ac: 10,
            speed: 30,
        }
    }
}

/// A player character owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterRecord {
    pub id: CharacterId,
    pub game_id: GameId,
    pub owner_id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub stats: CombatStats,
    pub actions: Vec<Action>,
}

impl CharacterRecord {
    pub fn new(game_id: GameId, owner_id: UserId, name: impl Into<String>) -> Self {
        Self {
            id: CharacterId::new(),
            game_id,
            owner_id,
            name: name.into(),
            avatar: None,
            stats: CombatStats::default(),
            actions: Vec::new(),
        }
    }

    pub fn with_abilities(mut self, abilities: AbilityScores) -> Self {
        self.stats.abilities = abilities;
        self
    }

    pub fn with_hp(mut self, hp: i32, max_hp: i32) -> Self {
        self.stats.hp = hp;
        self.stats.max_hp = max_hp;
        self
    }

    pub fn with_ac(mut self, ac: i32) -> Self {
        self.stats.ac = ac;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

/// A monster stat block belonging to a game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonsterRecord {
    pub id: MonsterId,
    pub game_id: GameId,
    pub name: String,
    pub avatar: Option<String>,
    pub stats: CombatStats,
    pub actions: Vec<Action>,
}

impl MonsterRecord {
    pub fn new(game_id: GameId, name: impl Into<String>) -> Self {
        Self {
            id: MonsterId::new(),
            game_id,
            name: name.into(),
            avatar: None,
            stats: CombatStats::default(),
            actions: Vec::new(),
        }
    }

    pub fn with_abilities(mut self, abilities: AbilityScores) -> Self {
        self.stats.abilities = abilities;
        self
    }

    pub fn with_hp(mut self, hp: i32, max_hp: i32) -> Self {
        self.stats.hp = hp;
        self.stats.max_hp = max_hp;
        self
    }

    pub fn with_ac(mut self, ac: i32) -> Self {
        self.stats.ac = ac;
        self
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_avatar(mut self, avatar: impl Into<String>) -> Self {
        self.avatar = Some(avatar.into());
        self
    }
}

// ============================================================================
// Combat
// ============================================================================

/// Lifecycle of an encounter. Transitions only from `Active` to `Finished`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CombatStatus {
    #[default]
    Active,
    Finished,
}

/// One encounter within a game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combat {
    pub id: CombatId,
    pub game_id: GameId,
    pub name: String,
    pub status: CombatStatus,
    pub round: u32,
    /// Index into the live (alive-only, rank-ordered) participant list.
    pub current_turn: usize,
    pub auto_mode: bool,
    pub log: Vec<LogEntry>,
    pub created_at: DateTime<Utc>,
}

impl Combat {
    pub fn new(game_id: GameId, name: impl Into<String>) -> Self {
        Self {
            id: CombatId::new(),
            game_id,
            name: name.into(),
            status: CombatStatus::Active,
            round: 1,
            current_turn: 0,
            auto_mode: false,
            log: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == CombatStatus::Active
    }
}

/// Which side of the table a participant comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantKind {
    Character,
    Monster,
}

/// The record a participant was snapshotted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParticipantSource {
    Character(CharacterId),
    Monster(MonsterId),
}

impl ParticipantSource {
    pub fn kind(&self) -> ParticipantKind {
        match self {
            ParticipantSource::Character(_) => ParticipantKind::Character,
            ParticipantSource::Monster(_) => ParticipantKind::Monster,
        }
    }
}

/// One combatant inside a combat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatParticipant {
    pub id: ParticipantId,
    pub combat_id: CombatId,
    pub source: ParticipantSource,
    pub name: String,
    pub avatar: Option<String>,
    pub abilities: AbilityScores,
    pub hp: i32,
    pub max_hp: i32,
    pub ac: i32,
    pub speed: u32,
    pub initiative: i32,
    /// Dense 0-based rank over the whole roster, dead included.
    pub sort_order: usize,
    pub is_alive: bool,
    pub conditions: BTreeSet<String>,
    pub actions: Vec<Action>,
}

impl CombatParticipant {
    fn from_stats(
        combat_id: CombatId,
        source: ParticipantSource,
        name: &str,
        avatar: Option<&String>,
        stats: &CombatStats,
        actions: &[Action],
        initiative: i32,
    ) -> Self {
        let max_hp = stats.max_hp.max(0);
        let hp = stats.hp.clamp(0, max_hp);
        Self {
            id: ParticipantId::new(),
            combat_id,
            source,
            name: name.to_string(),
            avatar: avatar.cloned(),
            abilities: stats.abilities,
            hp,
            max_hp,
            ac: stats.ac,
            speed: stats.speed,
            initiative,
            sort_order: 0,
            is_alive: hp > 0,
            conditions: BTreeSet::new(),
            actions: actions.to_vec(),
        }
    }

    /// Snapshot a character's current stats into a new participant.
    pub fn from_character(combat_id: CombatId, record: &CharacterRecord, initiative: i32) -> Self {
        Self::from_stats(
            combat_id,
            ParticipantSource::Character(record.id),
            &record.name,
            record.avatar.as_ref(),
            &record.stats,
            &record.actions,
            initiative,
        )
    }

    /// Snapshot a monster's stat block into a new participant.
    pub fn from_monster(combat_id: CombatId, record: &MonsterRecord, initiative: i32) -> Self {
        Self::from_stats(
            combat_id,
            ParticipantSource::Monster(record.id),
            &record.name,
            record.avatar.as_ref(),
            &record.stats,
            &record.actions,
            initiative,
        )
    }

    pub fn kind(&self) -> ParticipantKind {
        self.source.kind()
    }

    pub fn dexterity(&self) -> u8 {
        self.abilities.dexterity
    }

    /// Set hit points, clamped to `[0, max_hp]`, keeping `is_alive` in step.
    pub fn set_hp(&mut self, hp: i32) {
        self.hp = hp.clamp(0, self.max_hp.max(0));
        self.is_alive = self.hp > 0;
    }

    /// Returns the new hit point total.
    pub fn apply_damage(&mut self, amount: i32) -> i32 {
        self.set_hp(self.hp.saturating_sub(amount));
        self.hp
    }

    /// Returns the new hit point total.
    pub fn heal(&mut self, amount: i32) -> i32 {
        self.set_hp(self.hp.saturating_add(amount));
        self.hp
    }
}
