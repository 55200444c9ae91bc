//! Error types raised by repository implementations.

use std::fmt;
use thiserror::Error;

/// Kind of record a repository call addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Game,
    Character,
    Monster,
    Combat,
    Participant,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Game => "game",
            EntityKind::Character => "character",
            EntityKind::Monster => "monster",
            EntityKind::Combat => "combat",
            EntityKind::Participant => "participant",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by repository implementations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: EntityKind, id: String },

    #[error("repository lock was poisoned")]
    LockPoisoned,
}

impl RepositoryError {
    pub fn not_found(kind: EntityKind, id: impl ToString) -> Self {
        RepositoryError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn already_exists(kind: EntityKind, id: impl ToString) -> Self {
        RepositoryError::AlreadyExists {
            kind,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RepositoryError::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
