//! JSON snapshots of a combat store.
//!
//! A snapshot holds every record an [`InMemoryRepository`](crate::repository::InMemoryRepository)
//! knows about, so a table can be saved between sessions and resumed
//! mid-encounter.

use crate::world::{CharacterRecord, Combat, CombatParticipant, GameRecord, MonsterRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::fs;

/// Errors from snapshot save/load.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Everything needed to rebuild a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub games: Vec<GameRecord>,
    pub characters: Vec<CharacterRecord>,
    pub monsters: Vec<MonsterRecord>,
    pub combats: Vec<Combat>,
    pub participants: Vec<CombatParticipant>,
}

impl StoreSnapshot {
    pub fn new(
        games: Vec<GameRecord>,
        characters: Vec<CharacterRecord>,
        monsters: Vec<MonsterRecord>,
        combats: Vec<Combat>,
        participants: Vec<CombatParticipant>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            games,
            characters,
            monsters,
            combats,
            participants,
        }
    }

    /// Save to a JSON file.
    pub async fn save_json(&self, path: impl AsRef<Path>) -> Result<(), PersistError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// Load from a JSON file, rejecting other format versions.
    pub async fn load_json(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let content = fs::read_to_string(path).await?;
        let snapshot: Self = serde_json::from_str(&content)?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(PersistError::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                found: snapshot.version,
            });
        }

        Ok(snapshot)
    }
}
