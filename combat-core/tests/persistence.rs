//! Saving a table mid-encounter and resuming it from the snapshot.

use combat_core::repository::CombatRepository;
use combat_core::testing::{assert_current_turn, assert_hp, ScriptedRng, TestTable};
use combat_core::world::Action;
use combat_core::{
    Broadcaster, CombatConfig, CombatSession, DiceRng, InMemoryRepository, NoopBroadcaster,
    PersistError, StoreSnapshot,
};
use std::sync::Arc;

#[tokio::test]
async fn test_resume_encounter_from_snapshot() {
    let table = TestTable::new();
    let player = table.player();
    let combat_id = table.combat("Sunken Temple").await;
    let hero_id = table.character(&player, "Roland", 10, 20, vec![]);
    let orc_id = table.monster("Orc", 10, 15, vec![Action::new("Greataxe", "1d12", 60)]);

    table.roll([18, 6]);
    let hero = table
        .session
        .add_character(&table.gm, combat_id, hero_id)
        .await
        .unwrap()
        .participant;
    let orc = table
        .session
        .add_monster(&table.gm, combat_id, orc_id)
        .await
        .unwrap()
        .participant;

    table.roll([30, 2]);
    table
        .session
        .player_attack(&player, combat_id, hero.id, orc.id, 0)
        .await
        .unwrap();
    let before = table.view(combat_id).await;
    assert_hp(&before, orc.id, 13);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sunken_temple.json");
    table.repo.snapshot().unwrap().save_json(&path).await.unwrap();

    let loaded = StoreSnapshot::load_json(&path).await.unwrap();
    let repo = Arc::new(InMemoryRepository::from_snapshot(loaded));
    assert_eq!(repo.get_combat(combat_id).await.unwrap(), before.combat);
    assert_eq!(
        repo.list_participants(combat_id).await.unwrap(),
        before.participants
    );

    let rng = Arc::new(ScriptedRng::new([]));
    let session = CombatSession::with_rng(
        repo as Arc<dyn CombatRepository>,
        Arc::new(NoopBroadcaster) as Arc<dyn Broadcaster>,
        rng as Arc<dyn DiceRng>,
        CombatConfig::new(),
    );

    let resumed = session.get_combat(&table.gm, combat_id).await.unwrap();
    assert_current_turn(&resumed, orc.id);

    let outcome = session.next_turn(&table.gm, combat_id).await.unwrap();
    assert_current_turn(&outcome.view, hero.id);
    assert_eq!(outcome.view.combat.round, 2);
    assert_eq!(outcome.view.combat.log.len(), 1);
}

#[tokio::test]
async fn test_loading_garbage_is_json_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    tokio::fs::write(&path, "{ not json").await.unwrap();

    let err = StoreSnapshot::load_json(&path).await.unwrap_err();
    assert!(matches!(err, PersistError::Json(_)));
}
