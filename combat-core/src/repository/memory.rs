//! In-memory CombatRepository implementation for tests and local runs.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{CombatRepository, EntityKind, RepositoryError, Result};
use crate::persist::StoreSnapshot;
use crate::world::{
    CharacterId, CharacterRecord, Combat, CombatId, CombatParticipant, GameId, GameRecord,
    MonsterId, MonsterRecord, ParticipantId,
};

#[derive(Default)]
struct Tables {
    games: HashMap<GameId, GameRecord>,
    characters: HashMap<CharacterId, CharacterRecord>,
    monsters: HashMap<MonsterId, MonsterRecord>,
    combats: HashMap<CombatId, Combat>,
    participants: HashMap<ParticipantId, CombatParticipant>,
}

/// In-memory implementation of [`CombatRepository`].
///
/// Source records are seeded with the `insert_*` methods; the engine never
/// writes them.
#[derive(Default)]
pub struct InMemoryRepository {
    tables: RwLock<Tables>,
}

impl InMemoryRepository {
    /// Create a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| RepositoryError::LockPoisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| RepositoryError::LockPoisoned)
    }

    /// Insert or replace a game record.
    pub fn insert_game(&self, game: GameRecord) -> Result<GameId> {
        let id = game.id;
        self.write()?.games.insert(id, game);
        Ok(id)
    }

    /// Insert or replace a character record.
    pub fn insert_character(&self, character: CharacterRecord) -> Result<CharacterId> {
        let id = character.id;
        self.write()?.characters.insert(id, character);
        Ok(id)
    }

    /// Insert or replace a monster record.
    pub fn insert_monster(&self, monster: MonsterRecord) -> Result<MonsterId> {
        let id = monster.id;
        self.write()?.monsters.insert(id, monster);
        Ok(id)
    }

    /// Copy the whole store into a serializable snapshot.
    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        let tables = self.read()?;
        let mut combats: Vec<Combat> = tables.combats.values().cloned().collect();
        combats.sort_by_key(|c| c.created_at);
        let mut participants: Vec<CombatParticipant> =
            tables.participants.values().cloned().collect();
        participants.sort_by_key(|p| (p.combat_id, p.sort_order));

        Ok(StoreSnapshot::new(
            tables.games.values().cloned().collect(),
            tables.characters.values().cloned().collect(),
            tables.monsters.values().cloned().collect(),
            combats,
            participants,
        ))
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let tables = Tables {
            games: snapshot.games.into_iter().map(|g| (g.id, g)).collect(),
            characters: snapshot.characters.into_iter().map(|c| (c.id, c)).collect(),
            monsters: snapshot.monsters.into_iter().map(|m| (m.id, m)).collect(),
            combats: snapshot.combats.into_iter().map(|c| (c.id, c)).collect(),
            participants: snapshot
                .participants
                .into_iter()
                .map(|p| (p.id, p))
                .collect(),
        };
        Self {
            tables: RwLock::new(tables),
        }
    }
}

#[async_trait]
impl CombatRepository for InMemoryRepository {
    async fn get_game(&self, id: GameId) -> Result<GameRecord> {
        self.read()?
            .games
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Game, id))
    }

    async fn get_character(&self, id: CharacterId) -> Result<CharacterRecord> {
        self.read()?
            .characters
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Character, id))
    }

    async fn get_monster(&self, id: MonsterId) -> Result<MonsterRecord> {
        self.read()?
            .monsters
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Monster, id))
    }

    async fn create_combat(&self, combat: &Combat) -> Result<()> {
        let mut tables = self.write()?;
        if tables.combats.contains_key(&combat.id) {
            return Err(RepositoryError::already_exists(EntityKind::Combat, combat.id));
        }
        tables.combats.insert(combat.id, combat.clone());
        Ok(())
    }

    async fn get_combat(&self, id: CombatId) -> Result<Combat> {
        self.read()?
            .combats
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Combat, id))
    }

    async fn update_combat(&self, combat: &Combat) -> Result<()> {
        let mut tables = self.write()?;
        match tables.combats.get_mut(&combat.id) {
            Some(stored) => {
                *stored = combat.clone();
                Ok(())
            }
            None => Err(RepositoryError::not_found(EntityKind::Combat, combat.id)),
        }
    }

    async fn delete_combat(&self, id: CombatId) -> Result<()> {
        let mut tables = self.write()?;
        if tables.combats.remove(&id).is_none() {
            return Err(RepositoryError::not_found(EntityKind::Combat, id));
        }
        tables.participants.retain(|_, p| p.combat_id != id);
        Ok(())
    }

    async fn create_participant(&self, participant: &CombatParticipant) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.combats.contains_key(&participant.combat_id) {
            return Err(RepositoryError::not_found(
                EntityKind::Combat,
                participant.combat_id,
            ));
        }
        if tables.participants.contains_key(&participant.id) {
            return Err(RepositoryError::already_exists(
                EntityKind::Participant,
                participant.id,
            ));
        }
        tables.participants.insert(participant.id, participant.clone());
        Ok(())
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<CombatParticipant> {
        self.read()?
            .participants
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found(EntityKind::Participant, id))
    }

    async fn list_participants(&self, combat_id: CombatId) -> Result<Vec<CombatParticipant>> {
        let tables = self.read()?;
        let mut participants: Vec<CombatParticipant> = tables
            .participants
            .values()
            .filter(|p| p.combat_id == combat_id)
            .cloned()
            .collect();
        participants.sort_by_key(|p| (p.sort_order, p.id));
        Ok(participants)
    }

    async fn update_participant(&self, participant: &CombatParticipant) -> Result<()> {
        let mut tables = self.write()?;
        match tables.participants.get_mut(&participant.id) {
            Some(stored) => {
                *stored = participant.clone();
                Ok(())
            }
            None => Err(RepositoryError::not_found(
                EntityKind::Participant,
                participant.id,
            )),
        }
    }

    async fn delete_participant(&self, id: ParticipantId) -> Result<()> {
        match self.write()?.participants.remove(&id) {
            Some(_) => Ok(()),
            None => Err(RepositoryError::not_found(EntityKind::Participant, id)),
        }
    }
}
