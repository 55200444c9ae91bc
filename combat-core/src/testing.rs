//! Testing utilities for the combat engine.
//!
//! This module provides tools for deterministic tests:
//! - `ScriptedRng` to force exact dice results
//! - `RecordingBroadcaster` to observe change notices
//! - `TestTable` for a seeded game with a GM and a session
//! - Assertion helpers for verifying combat state

use crate::broadcast::{Broadcaster, ChangeNotice, ResourceKind};
use crate::config::CombatConfig;
use crate::dice::DiceRng;
use crate::error::CombatError;
use crate::repository::{CombatRepository, InMemoryRepository};
use crate::session::{Caller, CombatSession, CombatView};
use crate::world::{
    AbilityScores, Action, CharacterId, CharacterRecord, CombatId, GameId, GameRecord, MonsterId,
    MonsterRecord, ParticipantId, UserId,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// A dice source that replays a fixed sequence.
///
/// Values are clamped into the requested range. Ranges with a single value
/// return it without consuming anything; an exhausted script returns the
/// low end of the range.
#[derive(Debug, Default)]
pub struct ScriptedRng {
    values: Mutex<VecDeque<u32>>,
}

impl ScriptedRng {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
        }
    }

    /// Append more values to the script.
    pub fn push(&self, values: impl IntoIterator<Item = u32>) {
        self.lock().extend(values);
    }

    /// Number of values not yet consumed.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<u32>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiceRng for ScriptedRng {
    fn next_in_range(&self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        match self.lock().pop_front() {
            Some(value) => value.clamp(low, high),
            None => low,
        }
    }
}

/// Keeps every notice it receives.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    notices: Mutex<Vec<ChangeNotice>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<ChangeNotice> {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn notify_changed(&self, game_id: GameId, resource: ResourceKind) {
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ChangeNotice { game_id, resource });
    }
}

/// A seeded game with its GM, an in-memory store, scripted dice and a session.
pub struct TestTable {
    pub repo: Arc<InMemoryRepository>,
    pub rng: Arc<ScriptedRng>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub session: CombatSession,
    pub game_id: GameId,
    pub gm: Caller,
}

impl TestTable {
    pub fn new() -> Self {
        Self::with_config(CombatConfig::new())
    }

    pub fn with_config(config: CombatConfig) -> Self {
        let repo = Arc::new(InMemoryRepository::new());
        let rng = Arc::new(ScriptedRng::default());
        let broadcaster = Arc::new(RecordingBroadcaster::new());

        let gm = Caller::new(UserId::new());
        let game_id = repo
            .insert_game(GameRecord::new("Test Campaign", gm.user_id))
            .expect("seed game");

        let session = CombatSession::with_rng(
            repo.clone() as Arc<dyn CombatRepository>,
            broadcaster.clone() as Arc<dyn Broadcaster>,
            rng.clone() as Arc<dyn DiceRng>,
            config,
        );

        Self {
            repo,
            rng,
            broadcaster,
            session,
            game_id,
            gm,
        }
    }

    /// A new player identity.
    pub fn player(&self) -> Caller {
        Caller::new(UserId::new())
    }

    /// Queue dice results for the next rolls.
    pub fn roll(&self, values: impl IntoIterator<Item = u32>) {
        self.rng.push(values);
    }

    /// Seed a character owned by `owner`.
    pub fn character(
        &self,
        owner: &Caller,
        name: &str,
        dexterity: u8,
        hp: i32,
        actions: Vec<Action>,
    ) -> CharacterId {
        let record = CharacterRecord::new(self.game_id, owner.user_id, name)
            .with_abilities(AbilityScores::new(10, dexterity, 10, 10, 10, 10))
            .with_hp(hp, hp)
            .with_actions(actions);
        self.repo.insert_character(record).expect("seed character")
    }

    /// Seed a monster in this table's game.
    pub fn monster(&self, name: &str, dexterity: u8, hp: i32, actions: Vec<Action>) -> MonsterId {
        let record = MonsterRecord::new(self.game_id, name)
            .with_abilities(AbilityScores::new(10, dexterity, 10, 10, 10, 10))
            .with_hp(hp, hp)
            .with_actions(actions);
        self.repo.insert_monster(record).expect("seed monster")
    }

    /// Create a combat as the GM.
    pub async fn combat(&self, name: &str) -> CombatId {
        self.session
            .create_combat(&self.gm, self.game_id, name)
            .await
            .expect("create combat")
            .combat
            .id
    }

    /// Current state of a combat as the GM sees it.
    pub async fn view(&self, combat_id: CombatId) -> CombatView {
        self.session
            .get_combat(&self.gm, combat_id)
            .await
            .expect("load combat")
    }
}

impl Default for TestTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert a participant's hit points.
#[track_caller]
pub fn assert_hp(view: &CombatView, participant: ParticipantId, expected: i32) {
    let actual = view
        .participant(participant)
        .unwrap_or_else(|| panic!("Expected participant {participant} in combat"))
        .hp;
    assert_eq!(actual, expected, "Expected HP {expected}, got {actual}");
}

/// Assert a participant is alive.
#[track_caller]
pub fn assert_alive(view: &CombatView, participant: ParticipantId) {
    let p = view
        .participant(participant)
        .unwrap_or_else(|| panic!("Expected participant {participant} in combat"));
    assert!(p.is_alive, "Expected {} to be alive", p.name);
}

/// Assert a participant is dead.
#[track_caller]
pub fn assert_dead(view: &CombatView, participant: ParticipantId) {
    let p = view
        .participant(participant)
        .unwrap_or_else(|| panic!("Expected participant {participant} in combat"));
    assert!(!p.is_alive, "Expected {} to be dead", p.name);
}

/// Assert whose turn it is.
#[track_caller]
pub fn assert_current_turn(view: &CombatView, participant: ParticipantId) {
    let current = view.current_participant().map(|p| p.id);
    assert_eq!(
        current,
        Some(participant),
        "Expected {participant} to be acting, got {current:?}"
    );
}

/// Assert an error is the off-turn rejection.
#[track_caller]
pub fn assert_not_your_turn(err: &CombatError) {
    assert!(
        matches!(err, CombatError::InvalidState(msg) if msg == "not your turn"),
        "Expected 'not your turn', got {err}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::roll_die;

    #[test]
    fn test_scripted_rng_replays_and_clamps() {
        let rng = ScriptedRng::new([3, 25, 0]);
        assert_eq!(roll_die(&rng, 6), 3);
        assert_eq!(roll_die(&rng, 20), 20);
        assert_eq!(roll_die(&rng, 8), 1);
        assert_eq!(roll_die(&rng, 8), 1, "exhausted script returns the low end");
    }

    #[test]
    fn test_single_value_range_consumes_nothing() {
        let rng = ScriptedRng::new([4]);
        assert_eq!(roll_die(&rng, 1), 1);
        assert_eq!(rng.remaining(), 1);
        rng.push([2]);
        assert_eq!(rng.remaining(), 2);
    }

    #[test]
    fn test_recording_broadcaster() {
        let broadcaster = RecordingBroadcaster::new();
        let game_id = GameId::new();
        broadcaster.notify_changed(game_id, ResourceKind::Combat);
        assert_eq!(broadcaster.count(), 1);
        assert_eq!(broadcaster.notices()[0].game_id, game_id);
    }

    #[tokio::test]
    async fn test_table_seeds_records() {
        let table = TestTable::new();
        let player = table.player();
        let hero = table.character(&player, "Roland", 14, 20, vec![]);
        let goblin = table.monster("Goblin", 14, 7, vec![Action::new("Scimitar", "1d6+2", 60)]);

        assert_eq!(table.repo.get_character(hero).await.unwrap().owner_id, player.user_id);
        assert_eq!(table.repo.get_monster(goblin).await.unwrap().stats.hp, 7);

        let combat_id = table.combat("Ambush").await;
        assert_eq!(table.view(combat_id).await.combat.name, "Ambush");
    }
}
