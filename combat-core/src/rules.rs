//! Attack resolution.
//!
//! An attack is a single percentile roll against the action's success rate.
//! The bottom five percent always hits as a critical, the top five percent
//! always misses as a fumble. A critical doubles the damage dice but never
//! the flat modifier.

use crate::combat_log::{AttackLog, LogEntry};
use crate::dice::{roll_percentile, DamageFormula, DiceRng};
use crate::error::{CombatError, CombatResult};
use crate::repository::CombatRepository;
use crate::world::{Action, CombatId, CombatParticipant, ParticipantId, ParticipantSource};
use chrono::Utc;
use tracing::debug;

/// Attack rolls at or below this are criticals.
pub const CRITICAL_THRESHOLD: u32 = 5;

/// Attack rolls at or above this are fumbles.
pub const FUMBLE_THRESHOLD: u32 = 96;

pub const DEFAULT_DAMAGE_FORMULA: &str = "1d4";

pub const DEFAULT_SUCCESS_RATE: u32 = 50;

/// Name of the action used when an attacker has none.
pub const IMPLICIT_ACTION_NAME: &str = "Attaque";

/// Hit/critical/fumble classification of one attack roll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttackCheck {
    pub hit: bool,
    pub critical: bool,
    pub fumble: bool,
}

/// Classify a percentile roll against a success rate.
pub fn check_attack(attack_roll: u32, success_rate: u32) -> AttackCheck {
    let critical = attack_roll <= CRITICAL_THRESHOLD;
    let fumble = attack_roll >= FUMBLE_THRESHOLD;
    AttackCheck {
        hit: critical || (!fumble && attack_roll <= success_rate),
        critical,
        fumble,
    }
}

/// The action used by an attacker with an empty action list.
pub fn implicit_action() -> Action {
    Action::new(IMPLICIT_ACTION_NAME, DEFAULT_DAMAGE_FORMULA, DEFAULT_SUCCESS_RATE)
}

/// Pick `actions[index]`, clamping the index to the last action.
pub fn select_action(actions: &[Action], index: usize) -> Action {
    match actions.last() {
        Some(last) => actions.get(index).unwrap_or(last).clone(),
        None => implicit_action(),
    }
}

/// Dice and total of one damage roll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DamageRoll {
    pub dice: Vec<u32>,
    /// Never below 1.
    pub total: i32,
}

/// Roll damage for a hit. Unparsable formulas roll as `1d4`.
pub fn roll_damage(rng: &dyn DiceRng, formula: &str, critical: bool) -> DamageRoll {
    let parsed = DamageFormula::parse_lenient(formula);
    let dice = parsed.roll_dice(rng, critical);
    let sum = dice
        .iter()
        .fold(0i32, |acc, &d| acc.saturating_add(d as i32));
    DamageRoll {
        total: sum.saturating_add(parsed.modifier).max(1),
        dice,
    }
}

/// Resolve one attack in memory.
///
/// Applies damage to `target` on a hit and returns the log entry. Nothing is
/// persisted.
pub fn resolve_attack(
    rng: &dyn DiceRng,
    attacker: &CombatParticipant,
    action: &Action,
    target: &mut CombatParticipant,
    round: u32,
) -> AttackLog {
    let formula = action
        .damage
        .clone()
        .unwrap_or_else(|| DEFAULT_DAMAGE_FORMULA.to_string());
    let success_rate = action.success_rate.unwrap_or(DEFAULT_SUCCESS_RATE);

    let attack_roll = roll_percentile(rng);
    let check = check_attack(attack_roll, success_rate);

    let (damage_dice, damage_total) = if check.hit {
        let damage = roll_damage(rng, &formula, check.critical);
        target.apply_damage(damage.total);
        (damage.dice, damage.total)
    } else {
        (Vec::new(), 0)
    };

    debug!(
        attacker = %attacker.name,
        target = %target.name,
        action = %action.name,
        attack_roll,
        success_rate,
        hit = check.hit,
        critical = check.critical,
        fumble = check.fumble,
        damage = damage_total,
        "Resolved attack"
    );

    AttackLog {
        round,
        attacker_id: attacker.id,
        attacker_name: attacker.name.clone(),
        target_id: target.id,
        target_name: target.name.clone(),
        action_name: action.name.clone(),
        attack_roll,
        success_rate,
        hit: check.hit,
        critical: check.critical,
        fumble: check.fumble,
        damage_formula: formula,
        damage_dice,
        damage_total,
        target_hp: target.hp,
        target_died: check.hit && !target.is_alive,
        timestamp: Utc::now(),
    }
}

/// Resolves attacks against stored state.
///
/// Callers must hold the combat's serialization section; the log append is a
/// read-modify-write of the whole combat.
pub struct AttackEngine<'a> {
    repo: &'a dyn CombatRepository,
    rng: &'a dyn DiceRng,
}

impl<'a> AttackEngine<'a> {
    pub fn new(repo: &'a dyn CombatRepository, rng: &'a dyn DiceRng) -> Self {
        Self { repo, rng }
    }

    /// Load a participant and check it belongs to `combat_id`.
    pub async fn member(
        &self,
        combat_id: CombatId,
        participant_id: ParticipantId,
    ) -> CombatResult<CombatParticipant> {
        let participant = self.repo.get_participant(participant_id).await?;
        if participant.combat_id != combat_id {
            return Err(CombatError::NotFound(format!(
                "participant {participant_id} in combat {combat_id}"
            )));
        }
        Ok(participant)
    }

    /// The actions a participant attacks with.
    ///
    /// Falls back to the source record's actions when the snapshot has none.
    /// A deleted source record counts as having no actions.
    pub async fn actions_for(&self, participant: &CombatParticipant) -> CombatResult<Vec<Action>> {
        if !participant.actions.is_empty() {
            return Ok(participant.actions.clone());
        }

        let source_actions = match participant.source {
            ParticipantSource::Character(id) => {
                self.repo.get_character(id).await.map(|record| record.actions)
            }
            ParticipantSource::Monster(id) => {
                self.repo.get_monster(id).await.map(|record| record.actions)
            }
        };

        match source_actions {
            Ok(actions) => Ok(actions),
            Err(err) if err.is_not_found() => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// Resolve `attacker` hitting `target` with the action at `action_index`,
    /// persist the target's HP and append the log entry.
    pub async fn execute(
        &self,
        combat_id: CombatId,
        attacker_id: ParticipantId,
        target_id: ParticipantId,
        action_index: usize,
    ) -> CombatResult<AttackLog> {
        let mut combat = self.repo.get_combat(combat_id).await?;
        let attacker = self.member(combat_id, attacker_id).await?;
        let mut target = self.member(combat_id, target_id).await?;

        if !attacker.is_alive {
            return Err(CombatError::InvalidState(format!(
                "{} is dead and cannot attack",
                attacker.name
            )));
        }
        if !target.is_alive {
            return Err(CombatError::InvalidState(format!(
                "{} is already dead",
                target.name
            )));
        }

        let actions = self.actions_for(&attacker).await?;
        let action = select_action(&actions, action_index);

        // Self-attacks resolve against the attacker's own record.
        let entry = resolve_attack(self.rng, &attacker, &action, &mut target, combat.round);

        if entry.hit {
            self.repo.update_participant(&target).await?;
        }
        combat.log.push(LogEntry::Attack(entry.clone()));
        self.repo.update_combat(&combat).await?;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use crate::testing::ScriptedRng;
    use crate::world::{Combat, GameId, MonsterRecord};

    fn combatant(name: &str, hp: i32, actions: Vec<Action>) -> CombatParticipant {
        let record = MonsterRecord::new(GameId::new(), name)
            .with_hp(hp, hp)
            .with_actions(actions);
        CombatParticipant::from_monster(CombatId::new(), &record, 10)
    }

    #[test]
    fn test_critical_band_always_hits() {
        for roll in 1..=CRITICAL_THRESHOLD {
            for rate in [0, 1, 50, 100] {
                let check = check_attack(roll, rate);
                assert!(check.critical);
                assert!(check.hit, "roll {roll} at {rate}% must hit");
                assert!(!check.fumble);
            }
        }
    }

    #[test]
    fn test_fumble_band_always_misses() {
        for roll in FUMBLE_THRESHOLD..=100 {
            for rate in [0, 50, 99, 100] {
                let check = check_attack(roll, rate);
                assert!(check.fumble);
                assert!(!check.hit, "roll {roll} at {rate}% must miss");
                assert!(!check.critical);
            }
        }
    }

    #[test]
    fn test_plain_rolls_compare_against_rate() {
        assert!(check_attack(50, 50).hit);
        assert!(!check_attack(51, 50).hit);
        assert!(!check_attack(6, 0).hit);
        assert!(check_attack(95, 100).hit);
    }

    #[test]
    fn test_select_action_clamps_and_falls_back() {
        let actions = vec![Action::new("Bite", "1d6", 60), Action::new("Claw", "2d4", 70)];
        assert_eq!(select_action(&actions, 0).name, "Bite");
        assert_eq!(select_action(&actions, 1).name, "Claw");
        assert_eq!(select_action(&actions, 9).name, "Claw");

        let implicit = select_action(&[], 3);
        assert_eq!(implicit.name, "Attaque");
        assert_eq!(implicit.damage.as_deref(), Some("1d4"));
        assert_eq!(implicit.success_rate, Some(50));
    }

    #[test]
    fn test_critical_doubles_dice_not_modifier() {
        let attacker = combatant("Ogre", 30, vec![]);
        let mut target = combatant("Dummy", 100, vec![]);
        let action = Action::new("Club", "2d6+3", 50);
        let rng = ScriptedRng::new([3, 6, 6, 6, 6]);

        let entry = resolve_attack(&rng, &attacker, &action, &mut target, 1);
        assert!(entry.critical);
        assert!(entry.hit);
        assert_eq!(entry.damage_dice, vec![6, 6, 6, 6]);
        assert_eq!(entry.damage_total, 27);
        assert_eq!(entry.target_hp, 73);
        assert_eq!(target.hp, 73);
    }

    #[test]
    fn test_hit_deals_at_least_one() {
        let attacker = combatant("Rat", 2, vec![]);
        let mut target = combatant("Dummy", 10, vec![]);
        let action = Action::new("Nibble", "1d4-5", 90);
        let rng = ScriptedRng::new([40, 1]);

        let entry = resolve_attack(&rng, &attacker, &action, &mut target, 1);
        assert!(entry.hit);
        assert_eq!(entry.damage_total, 1);
        assert_eq!(target.hp, 9);
    }

    #[test]
    fn test_miss_leaves_target_untouched() {
        let attacker = combatant("Rat", 2, vec![]);
        let mut target = combatant("Dummy", 10, vec![]);
        let action = Action::new("Nibble", "1d4", 90);
        let rng = ScriptedRng::new([98]);

        let entry = resolve_attack(&rng, &attacker, &action, &mut target, 2);
        assert!(entry.fumble);
        assert!(!entry.hit);
        assert!(entry.damage_dice.is_empty());
        assert_eq!(entry.damage_total, 0);
        assert_eq!(target.hp, 10);
        assert!(!entry.target_died);
        assert_eq!(entry.round, 2);
    }

    #[test]
    fn test_defaults_when_action_fields_missing() {
        let attacker = combatant("Bandit", 8, vec![]);
        let mut target = combatant("Dummy", 10, vec![]);
        let rng = ScriptedRng::new([50, 4]);

        let entry = resolve_attack(&rng, &attacker, &Action::named("Shove"), &mut target, 1);
        assert_eq!(entry.success_rate, 50);
        assert_eq!(entry.damage_formula, "1d4");
        assert!(entry.hit);
        assert_eq!(entry.damage_total, 4);
    }

    #[test]
    fn test_unparsable_formula_rolls_1d4() {
        let attacker = combatant("Bandit", 8, vec![]);
        let mut target = combatant("Dummy", 10, vec![]);
        let action = Action::new("Weird", "notaformula", 100);
        let rng = ScriptedRng::new([20, 3]);

        let entry = resolve_attack(&rng, &attacker, &action, &mut target, 1);
        assert_eq!(entry.damage_formula, "notaformula");
        assert_eq!(entry.damage_dice, vec![3]);
        assert_eq!(entry.damage_total, 3);
    }

    #[test]
    fn test_oversized_formula_crits_as_1d4() {
        let attacker = combatant("Hydra", 80, vec![]);
        let mut target = combatant("Dummy", 100, vec![]);
        let action = Action::new("Bites", "50000000d6", 100);
        let rng = ScriptedRng::new([2, 4, 4]);

        let entry = resolve_attack(&rng, &attacker, &action, &mut target, 1);
        assert!(entry.critical);
        assert_eq!(entry.damage_dice, vec![4, 4]);
        assert_eq!(entry.damage_total, 8);
        assert_eq!(target.hp, 92);
    }

    #[test]
    fn test_killing_blow_flags_death() {
        let attacker = combatant("Ogre", 30, vec![]);
        let mut target = combatant("Goblin", 3, vec![]);
        let action = Action::new("Club", "1d8+2", 80);
        let rng = ScriptedRng::new([10, 5]);

        let entry = resolve_attack(&rng, &attacker, &action, &mut target, 1);
        assert_eq!(entry.target_hp, 0);
        assert!(entry.target_died);
        assert!(!target.is_alive);
    }

    async fn stored_pair(
        repo: &InMemoryRepository,
        attacker_actions: Vec<Action>,
    ) -> (Combat, CombatParticipant, CombatParticipant) {
        let combat = Combat::new(GameId::new(), "Cellar");
        repo.create_combat(&combat).await.unwrap();

        let source = MonsterRecord::new(combat.game_id, "Wolf")
            .with_hp(11, 11)
            .with_actions(vec![Action::new("Bite", "2d4+2", 70)]);
        repo.insert_monster(source.clone()).unwrap();

        let mut attacker = CombatParticipant::from_monster(combat.id, &source, 12);
        attacker.actions = attacker_actions;
        let target_record = MonsterRecord::new(combat.game_id, "Sheep").with_hp(6, 6);
        let target = CombatParticipant::from_monster(combat.id, &target_record, 3);
        repo.create_participant(&attacker).await.unwrap();
        repo.create_participant(&target).await.unwrap();
        (combat, attacker, target)
    }

    #[tokio::test]
    async fn test_execute_persists_hp_and_log() {
        let repo = InMemoryRepository::new();
        let (combat, attacker, target) =
            stored_pair(&repo, vec![Action::new("Bite", "1d4", 70)]).await;
        let rng = ScriptedRng::new([30, 2]);
        let engine = AttackEngine::new(&repo, &rng);

        let entry = engine
            .execute(combat.id, attacker.id, target.id, 0)
            .await
            .unwrap();
        assert!(entry.hit);
        assert_eq!(repo.get_participant(target.id).await.unwrap().hp, 4);

        let stored = repo.get_combat(combat.id).await.unwrap();
        assert_eq!(stored.log, vec![LogEntry::Attack(entry)]);
    }

    #[tokio::test]
    async fn test_execute_falls_back_to_source_actions() {
        let repo = InMemoryRepository::new();
        let (combat, attacker, target) = stored_pair(&repo, vec![]).await;
        let rng = ScriptedRng::new([99]);
        let engine = AttackEngine::new(&repo, &rng);

        let entry = engine
            .execute(combat.id, attacker.id, target.id, 0)
            .await
            .unwrap();
        assert_eq!(entry.action_name, "Bite");
        assert_eq!(entry.damage_formula, "2d4+2");
        assert_eq!(entry.success_rate, 70);
    }

    #[tokio::test]
    async fn test_execute_rejects_dead_target_without_mutation() {
        let repo = InMemoryRepository::new();
        let (combat, attacker, mut target) = stored_pair(&repo, vec![]).await;
        target.set_hp(0);
        repo.update_participant(&target).await.unwrap();
        let rng = ScriptedRng::new([1, 4, 4]);
        let engine = AttackEngine::new(&repo, &rng);

        let err = engine
            .execute(combat.id, attacker.id, target.id, 0)
            .await
            .unwrap_err();
        assert!(err.is_invalid_state());
        assert!(repo.get_combat(combat.id).await.unwrap().log.is_empty());
    }

    #[tokio::test]
    async fn test_execute_rejects_foreign_participant() {
        let repo = InMemoryRepository::new();
        let (combat, attacker, _) = stored_pair(&repo, vec![]).await;
        let (_, _, stranger) = stored_pair(&repo, vec![]).await;
        let rng = ScriptedRng::new([]);
        let engine = AttackEngine::new(&repo, &rng);

        let err = engine
            .execute(combat.id, attacker.id, stranger.id, 0)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
