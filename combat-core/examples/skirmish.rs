//! Plays a short auto-mode encounter: two heroes against a goblin band.
//!
//! Run with: `RUST_LOG=combat_core=debug cargo run -p combat-core --example skirmish`
//! Set `COMBAT_RNG_SEED` for a reproducible fight.

use combat_core::world::{AbilityScores, ParticipantKind, UserId};
use combat_core::{
    Action, Broadcaster, Caller, ChannelBroadcaster, CharacterRecord, CombatConfig,
    CombatRepository, CombatSession, GameRecord, InMemoryRepository, MonsterRecord,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const MAX_ROUNDS: u32 = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = CombatConfig::from_env();
    println!("=== Goblin Ambush ===");
    if let Some(seed) = config.rng_seed {
        println!("Dice seed: {seed}");
    }

    // Seed the table
    let repo = Arc::new(InMemoryRepository::new());
    let gm = Caller::new(UserId::new());
    let alice = Caller::new(UserId::new());
    let game_id = repo.insert_game(GameRecord::new("Lost Mine", gm.user_id))?;

    let roland = repo.insert_character(
        CharacterRecord::new(game_id, alice.user_id, "Roland")
            .with_abilities(AbilityScores::new(16, 12, 14, 10, 10, 10))
            .with_hp(24, 24)
            .with_ac(16)
            .with_actions(vec![Action::new("Longsword", "1d8+3", 65)]),
    )?;
    let lyra = repo.insert_character(
        CharacterRecord::new(game_id, alice.user_id, "Lyra")
            .with_abilities(AbilityScores::new(8, 16, 12, 14, 12, 10))
            .with_hp(16, 16)
            .with_actions(vec![
                Action::new("Shortbow", "1d6+3", 60),
                Action::new("Dagger", "1d4+3", 70),
            ]),
    )?;
    let mut monsters = Vec::new();
    for name in ["Goblin Archer", "Goblin Boss", "Goblin Sneak"] {
        monsters.push(
            repo.insert_monster(
                MonsterRecord::new(game_id, name)
                    .with_abilities(AbilityScores::new(8, 14, 10, 10, 8, 8))
                    .with_hp(9, 9)
                    .with_ac(15)
                    .with_actions(vec![Action::new("Scimitar", "1d6+2", 55)]),
            )?,
        );
    }

    let broadcaster = Arc::new(ChannelBroadcaster::new(config.broadcast_capacity));
    let mut notices = broadcaster.subscribe();
    let session = CombatSession::new(
        repo.clone() as Arc<dyn CombatRepository>,
        broadcaster.clone() as Arc<dyn Broadcaster>,
        config,
    );

    // Roll for initiative
    let combat_id = session
        .create_combat(&gm, game_id, "Goblin Ambush")
        .await?
        .combat
        .id;
    let mut adds = Vec::new();
    for id in [roland, lyra] {
        adds.push(session.add_character(&gm, combat_id, id).await?);
    }
    for id in monsters {
        adds.push(session.add_monster(&gm, combat_id, id).await?);
    }
    for added in &adds {
        println!(
            "  {} rolls initiative: {} {:+} = {}",
            added.participant.name,
            added.initiative.roll,
            added.initiative.modifier,
            added.initiative.total
        );
    }
    session.toggle_auto_mode(&gm, combat_id).await?;

    let mut view = session.get_combat(&gm, combat_id).await?;
    while view.combat.round <= MAX_ROUNDS {
        let live = view.live_order();
        let heroes_up = live.iter().any(|p| p.kind() == ParticipantKind::Character);
        let goblins_up = live.iter().any(|p| p.kind() == ParticipantKind::Monster);
        if !heroes_up || !goblins_up {
            break;
        }
        let target = live
            .iter()
            .find(|p| p.kind() == ParticipantKind::Monster)
            .map(|p| p.id);
        let Some(current) = view.current_participant().cloned() else {
            break;
        };

        // The GM moves past a monster holding the turn; auto mode plays the rest
        if current.kind() == ParticipantKind::Monster {
            let outcome = session.next_turn(&gm, combat_id).await?;
            for attack in &outcome.auto_attacks {
                println!("{attack}");
            }
            view = outcome.view;
            continue;
        }
        let Some(target) = target else {
            break;
        };

        let outcome = session
            .player_attack(&alice, combat_id, current.id, target, 0)
            .await?;
        println!("{}", outcome.attack);
        for attack in &outcome.auto_attacks {
            println!("{attack}");
        }
        view = outcome.view;
    }

    let view = session.end_combat(&gm, combat_id).await?;
    println!("\n=== Combat over after {} rounds ===", view.combat.round);
    for participant in &view.participants {
        println!(
            "  {:<14} {:>3}/{:<3} {}",
            participant.name,
            participant.hp,
            participant.max_hp,
            if participant.is_alive { "" } else { "(down)" }
        );
    }

    let mut received = 0;
    while notices.try_recv().is_ok() {
        received += 1;
    }
    println!("Change notices sent: {received}");

    let path = std::env::temp_dir().join("goblin_ambush.json");
    repo.snapshot()?.save_json(&path).await?;
    println!("Saved table to {}", path.display());

    Ok(())
}
