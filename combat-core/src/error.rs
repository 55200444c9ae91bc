//! Error taxonomy for combat operations.

use crate::repository::RepositoryError;
use thiserror::Error;

/// Errors returned by the combat engine.
///
/// `NotFound`, `Forbidden` and `InvalidState` are always raised before any
/// mutation takes place.
#[derive(Debug, Error)]
pub enum CombatError {
    /// Unknown combat, participant or source record.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller is not the game master, or does not own the acting participant.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The operation does not apply to the current combat state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The store failed for a reason other than a missing record.
    #[error("Storage error: {0}")]
    Storage(RepositoryError),
}

impl CombatError {
    pub fn not_your_turn() -> Self {
        CombatError::InvalidState("not your turn".to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CombatError::NotFound(_))
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, CombatError::Forbidden(_))
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, CombatError::InvalidState(_))
    }
}

impl From<RepositoryError> for CombatError {
    fn from(err: RepositoryError) -> Self {
        if err.is_not_found() {
            return CombatError::NotFound(err.to_string());
        }
        CombatError::Storage(err)
    }
}

pub type CombatResult<T> = Result<T, CombatError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::EntityKind;

    #[test]
    fn test_repository_not_found_maps_to_not_found() {
        let err: CombatError = RepositoryError::not_found(EntityKind::Combat, "abc").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: combat not found: abc");
    }

    #[test]
    fn test_other_repository_errors_map_to_storage() {
        let err: CombatError = RepositoryError::LockPoisoned.into();
        assert!(matches!(err, CombatError::Storage(_)));
    }

    #[test]
    fn test_not_your_turn() {
        let err = CombatError::not_your_turn();
        assert!(err.is_invalid_state());
        assert!(err.to_string().contains("not your turn"));
    }
}
