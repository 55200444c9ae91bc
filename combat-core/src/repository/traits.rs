//! Repository contract for combat state and the records it snapshots.

use async_trait::async_trait;

use super::Result;
use crate::world::{
    CharacterId, CharacterRecord, Combat, CombatId, CombatParticipant, GameId, GameRecord,
    MonsterId, MonsterRecord, ParticipantId,
};

/// Keyed access to everything the combat engine reads or writes.
///
/// Every lookup returns [`RepositoryError::NotFound`](super::RepositoryError::NotFound)
/// when the id is unknown. Source records (games, characters, monsters) are
/// read-only from the engine's point of view; combats and participants are
/// created, updated and deleted by it.
#[async_trait]
pub trait CombatRepository: Send + Sync {
    /// Load a game record.
    async fn get_game(&self, id: GameId) -> Result<GameRecord>;

    /// Load a player character record.
    async fn get_character(&self, id: CharacterId) -> Result<CharacterRecord>;

    /// Load a monster record.
    async fn get_monster(&self, id: MonsterId) -> Result<MonsterRecord>;

    /// Insert a new combat.
    async fn create_combat(&self, combat: &Combat) -> Result<()>;

    /// Load a combat, including its log.
    async fn get_combat(&self, id: CombatId) -> Result<Combat>;

    /// Overwrite an existing combat.
    async fn update_combat(&self, combat: &Combat) -> Result<()>;

    /// Delete a combat and its participants.
    async fn delete_combat(&self, id: CombatId) -> Result<()>;

    /// Insert a new participant.
    async fn create_participant(&self, participant: &CombatParticipant) -> Result<()>;

    /// Load one participant.
    async fn get_participant(&self, id: ParticipantId) -> Result<CombatParticipant>;

    /// All participants of a combat, alive or dead, ordered by `sort_order`.
    async fn list_participants(&self, combat_id: CombatId) -> Result<Vec<CombatParticipant>>;

    /// Overwrite an existing participant.
    async fn update_participant(&self, participant: &CombatParticipant) -> Result<()>;

    /// Delete one participant.
    async fn delete_participant(&self, id: ParticipantId) -> Result<()>;
}
