//! Automatic monster turns.
//!
//! After a turn advance in an auto-mode combat, every consecutive monster
//! turn is resolved here: each monster attacks a random living character
//! with a random action, then the turn moves on. The loop hands control
//! back as soon as a non-monster is up, fewer than two combatants are alive,
//! or the current monster has nobody to attack.

use crate::combat_log::AttackLog;
use crate::dice::DiceRng;
use crate::error::CombatResult;
use crate::initiative::{load_live_order, next_turn_index, wrap_turn_index};
use crate::repository::CombatRepository;
use crate::rules::AttackEngine;
use crate::world::{CombatId, ParticipantKind};
use tracing::{debug, warn};

/// Why an auto-play run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Fewer than two participants alive.
    NotEnoughCombatants,
    /// The current participant is not a monster, or there is none.
    HumanTurn,
    /// The current monster has no living character to attack.
    NoTargets,
    /// The per-run attack cap was reached.
    AttackCap,
    /// A store or resolution error ended the run.
    Failed,
}

/// Everything an auto-play run resolved, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoPlayReport {
    pub attacks: Vec<AttackLog>,
    pub stop: StopReason,
}

impl AutoPlayReport {
    fn stopped(attacks: Vec<AttackLog>, stop: StopReason) -> Self {
        Self { attacks, stop }
    }
}

enum Turn {
    Attacked(AttackLog),
    Stop(StopReason),
}

/// Drives monster turns for one combat.
///
/// Must run inside the combat's serialization section.
pub struct AutoPlayer<'a> {
    repo: &'a dyn CombatRepository,
    rng: &'a dyn DiceRng,
    attack_cap: Option<usize>,
}

impl<'a> AutoPlayer<'a> {
    pub fn new(repo: &'a dyn CombatRepository, rng: &'a dyn DiceRng) -> Self {
        Self {
            repo,
            rng,
            attack_cap: None,
        }
    }

    /// Lower the number of attacks one run may resolve.
    pub fn with_attack_cap(mut self, cap: Option<usize>) -> Self {
        self.attack_cap = cap;
        self
    }

    /// Resolve monster turns until control returns to a human.
    ///
    /// Never fails: errors are logged and end the run, keeping the attacks
    /// already resolved.
    pub async fn run(&self, combat_id: CombatId) -> AutoPlayReport {
        let mut attacks = Vec::new();

        let live_at_start = match load_live_order(self.repo, combat_id).await {
            Ok(live) => live.len(),
            Err(err) => {
                warn!(combat_id = %combat_id, error = %err, "Auto-play could not load participants");
                return AutoPlayReport::stopped(attacks, StopReason::Failed);
            }
        };
        let cap = match self.attack_cap {
            Some(limit) => live_at_start.min(limit),
            None => live_at_start,
        };

        loop {
            match self.take_turn(combat_id, attacks.len() >= cap).await {
                Ok(Turn::Attacked(entry)) => attacks.push(entry),
                Ok(Turn::Stop(StopReason::AttackCap)) => {
                    warn!(
                        combat_id = %combat_id,
                        cap,
                        "Auto-play attack cap reached"
                    );
                    return AutoPlayReport::stopped(attacks, StopReason::AttackCap);
                }
                Ok(Turn::Stop(reason)) => {
                    debug!(
                        combat_id = %combat_id,
                        attacks = attacks.len(),
                        reason = ?reason,
                        "Auto-play stopped"
                    );
                    return AutoPlayReport::stopped(attacks, reason);
                }
                Err(err) => {
                    warn!(combat_id = %combat_id, error = %err, "Auto-play turn failed");
                    return AutoPlayReport::stopped(attacks, StopReason::Failed);
                }
            }

            if let Err(err) = self.pass_turn(combat_id).await {
                warn!(combat_id = %combat_id, error = %err, "Auto-play could not advance the turn");
                return AutoPlayReport::stopped(attacks, StopReason::Failed);
            }
        }
    }

    /// One monster turn. The cap only applies once a monster could act.
    async fn take_turn(&self, combat_id: CombatId, cap_reached: bool) -> CombatResult<Turn> {
        let mut combat = self.repo.get_combat(combat_id).await?;
        let live = load_live_order(self.repo, combat_id).await?;

        if live.len() < 2 {
            return Ok(Turn::Stop(StopReason::NotEnoughCombatants));
        }

        if combat.current_turn >= live.len() {
            let (index, round) = wrap_turn_index(combat.current_turn, combat.round, live.len());
            combat.current_turn = index;
            combat.round = round;
            self.repo.update_combat(&combat).await?;
        }

        let current = match live.get(combat.current_turn) {
            Some(p) if p.kind() == ParticipantKind::Monster => p,
            _ => return Ok(Turn::Stop(StopReason::HumanTurn)),
        };

        let targets: Vec<_> = live
            .iter()
            .filter(|p| p.kind() == ParticipantKind::Character && p.id != current.id)
            .collect();
        if targets.is_empty() {
            return Ok(Turn::Stop(StopReason::NoTargets));
        }
        if cap_reached {
            return Ok(Turn::Stop(StopReason::AttackCap));
        }

        let engine = AttackEngine::new(self.repo, self.rng);
        let target = targets[self.pick(targets.len())];
        let actions = engine.actions_for(current).await?;
        let action_index = self.pick(actions.len());

        let entry = engine
            .execute(combat_id, current.id, target.id, action_index)
            .await?;
        Ok(Turn::Attacked(entry))
    }

    /// Step past the monster that just acted, wrapping against the
    /// post-attack live count.
    async fn pass_turn(&self, combat_id: CombatId) -> CombatResult<()> {
        let mut combat = self.repo.get_combat(combat_id).await?;
        let live_count = load_live_order(self.repo, combat_id).await?.len();
        let (index, round) = next_turn_index(combat.current_turn, combat.round, live_count);
        combat.current_turn = index;
        combat.round = round;
        self.repo.update_combat(&combat).await?;
        Ok(())
    }

    /// Uniform index in `0..len`; draws nothing when there is at most one choice.
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let high = u32::try_from(len - 1).unwrap_or(u32::MAX);
        self.rng.next_in_range(0, high) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::initiative::recalculate_order;
    use crate::repository::InMemoryRepository;
    use crate::testing::ScriptedRng;
    use crate::world::{
        Action, CharacterRecord, Combat, CombatParticipant, GameId, MonsterRecord, UserId,
    };

    struct Arena {
        repo: InMemoryRepository,
        combat: Combat,
    }

    impl Arena {
        async fn new() -> Self {
            let repo = InMemoryRepository::new();
            let mut combat = Combat::new(GameId::new(), "Arena");
            combat.auto_mode = true;
            repo.create_combat(&combat).await.unwrap();
            Self { repo, combat }
        }

        async fn monster(&self, name: &str, initiative: i32, hp: i32) -> CombatParticipant {
            let record = MonsterRecord::new(self.combat.game_id, name)
                .with_hp(hp, hp)
                .with_actions(vec![Action::new("Claw", "1d4", 60)]);
            let participant = CombatParticipant::from_monster(self.combat.id, &record, initiative);
            self.repo.create_participant(&participant).await.unwrap();
            participant
        }

        async fn hero(&self, name: &str, initiative: i32, hp: i32) -> CombatParticipant {
            let record =
                CharacterRecord::new(self.combat.game_id, UserId::new(), name).with_hp(hp, hp);
            let participant =
                CombatParticipant::from_character(self.combat.id, &record, initiative);
            self.repo.create_participant(&participant).await.unwrap();
            participant
        }

        async fn rank(&self) {
            recalculate_order(&self.repo, self.combat.id).await.unwrap();
        }

        async fn combat(&self) -> Combat {
            self.repo.get_combat(self.combat.id).await.unwrap()
        }
    }

    #[tokio::test]
    async fn test_monsters_act_until_hero_turn() {
        let arena = Arena::new().await;
        arena.monster("Orc", 20, 15).await;
        arena.monster("Goblin", 15, 7).await;
        let hero = arena.hero("Roland", 10, 30).await;
        arena.rank().await;

        // Orc misses, Goblin hits for 3
        let rng = ScriptedRng::new([90, 10, 3]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;

        assert_eq!(report.stop, StopReason::HumanTurn);
        assert_eq!(report.attacks.len(), 2);
        assert!(report.attacks.iter().all(|a| a.target_id == hero.id));
        assert_eq!(arena.repo.get_participant(hero.id).await.unwrap().hp, 27);

        let combat = arena.combat().await;
        assert_eq!(combat.current_turn, 2);
        assert_eq!(combat.round, 1);
        assert_eq!(combat.log.len(), 2);
    }

    #[tokio::test]
    async fn test_stops_immediately_on_hero_turn() {
        let arena = Arena::new().await;
        arena.hero("Roland", 20, 30).await;
        arena.monster("Orc", 10, 15).await;
        arena.rank().await;

        let rng = ScriptedRng::new([]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;
        assert_eq!(report.stop, StopReason::HumanTurn);
        assert!(report.attacks.is_empty());
    }

    #[tokio::test]
    async fn test_all_monster_roster_has_no_targets() {
        let arena = Arena::new().await;
        arena.monster("Orc", 20, 15).await;
        arena.monster("Goblin", 10, 7).await;
        arena.rank().await;

        let rng = ScriptedRng::new([]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;
        assert_eq!(report.stop, StopReason::NoTargets);
        assert!(report.attacks.is_empty());
    }

    #[tokio::test]
    async fn test_killing_last_hero_ends_run() {
        let arena = Arena::new().await;
        arena.monster("Orc", 20, 15).await;
        arena.monster("Goblin", 15, 7).await;
        let hero = arena.hero("Roland", 10, 2).await;
        arena.rank().await;

        let rng = ScriptedRng::new([10, 4]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;

        assert_eq!(report.attacks.len(), 1);
        assert!(report.attacks[0].target_died);
        assert_eq!(report.stop, StopReason::NoTargets);
        assert!(!arena.repo.get_participant(hero.id).await.unwrap().is_alive);
    }

    #[tokio::test]
    async fn test_lone_survivor_stops() {
        let arena = Arena::new().await;
        arena.monster("Orc", 20, 15).await;
        arena.rank().await;

        let rng = ScriptedRng::new([]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;
        assert_eq!(report.stop, StopReason::NotEnoughCombatants);
    }

    #[tokio::test]
    async fn test_dangling_index_wraps_into_new_round() {
        let arena = Arena::new().await;
        arena.monster("Orc", 20, 15).await;
        arena.hero("Roland", 10, 30).await;
        arena.rank().await;

        let mut combat = arena.combat().await;
        combat.current_turn = 5;
        arena.repo.update_combat(&combat).await.unwrap();

        let rng = ScriptedRng::new([99]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;

        assert_eq!(report.attacks.len(), 1);
        assert_eq!(report.stop, StopReason::HumanTurn);
        let combat = arena.combat().await;
        assert_eq!(combat.round, 2);
        assert_eq!(combat.current_turn, 1);
    }

    #[tokio::test]
    async fn test_attack_cap_bounds_the_run() {
        let arena = Arena::new().await;
        arena.monster("Orc", 20, 15).await;
        arena.monster("Goblin", 15, 7).await;
        arena.hero("Roland", 10, 30).await;
        arena.rank().await;

        let rng = ScriptedRng::new([99, 99]);
        let report = AutoPlayer::new(&arena.repo, &rng)
            .with_attack_cap(Some(1))
            .run(arena.combat.id)
            .await;
        assert_eq!(report.stop, StopReason::AttackCap);
        assert_eq!(report.attacks.len(), 1);
        assert_eq!(arena.combat().await.current_turn, 1);
    }

    #[tokio::test]
    async fn test_empty_roster_is_not_a_cap_stop() {
        let arena = Arena::new().await;
        let rng = ScriptedRng::new([]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;
        assert_eq!(report.stop, StopReason::NotEnoughCombatants);
        assert!(report.attacks.is_empty());
    }

    #[tokio::test]
    async fn test_zero_cap_still_reports_hero_turn() {
        let arena = Arena::new().await;
        arena.hero("Roland", 20, 30).await;
        arena.monster("Orc", 10, 15).await;
        arena.rank().await;

        let rng = ScriptedRng::new([]);
        let report = AutoPlayer::new(&arena.repo, &rng)
            .with_attack_cap(Some(0))
            .run(arena.combat.id)
            .await;
        assert_eq!(report.stop, StopReason::HumanTurn);
    }

    #[tokio::test]
    async fn test_unknown_combat_fails_softly() {
        let repo = InMemoryRepository::new();
        let rng = ScriptedRng::new([]);
        let report = AutoPlayer::new(&repo, &rng).run(CombatId::new()).await;
        assert_eq!(report.stop, StopReason::Failed);
        assert!(report.attacks.is_empty());
    }

    #[tokio::test]
    async fn test_random_picks_cover_targets_and_actions() {
        let arena = Arena::new().await;
        let record = MonsterRecord::new(arena.combat.game_id, "Hydra")
            .with_hp(40, 40)
            .with_actions(vec![
                Action::new("Bite", "1d4", 60),
                Action::new("Tail", "1d6", 60),
            ]);
        let hydra = CombatParticipant::from_monster(arena.combat.id, &record, 20);
        arena.repo.create_participant(&hydra).await.unwrap();
        arena.hero("Roland", 10, 30).await;
        let lyra = arena.hero("Lyra", 5, 30).await;
        arena.rank().await;

        // target index 1, action index 1, roll 20 hits, d6 shows 5
        let rng = ScriptedRng::new([1, 1, 20, 5]);
        let report = AutoPlayer::new(&arena.repo, &rng).run(arena.combat.id).await;

        assert_eq!(report.attacks.len(), 1);
        assert_eq!(report.attacks[0].target_id, lyra.id);
        assert_eq!(report.attacks[0].action_name, "Tail");
        assert_eq!(report.attacks[0].damage_total, 5);
    }
}
