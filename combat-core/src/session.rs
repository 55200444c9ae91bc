//! CombatSession - the public API for running encounters.
//!
//! Every operation takes the authenticated [`Caller`], checks access, runs
//! under its combat's serialization section and returns the combat with its
//! participants in rank order. Successful mutations notify the
//! [`Broadcaster`].

use crate::autoplay::AutoPlayer;
use crate::broadcast::{Broadcaster, ResourceKind};
use crate::combat_log::{AttackLog, FleeLog, LogEntry};
use crate::config::CombatConfig;
use crate::dice::{roll_die, DiceRng};
use crate::error::{CombatError, CombatResult};
use crate::initiative::{
    advance_turn, dex_modifier, load_live_order, recalculate_order, roll_initiative,
    InitiativeRoll,
};
use crate::repository::CombatRepository;
use crate::rules::AttackEngine;
use crate::world::{
    CharacterId, Combat, CombatId, CombatParticipant, CombatStatus, GameId, GameRecord, MonsterId,
    ParticipantId, ParticipantSource, UserId,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Difficulty class of a flee attempt.
pub const FLEE_DC: i32 = 10;

/// The authenticated user issuing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    pub user_id: UserId,
}

impl Caller {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }
}

/// A combat together with its participants, ordered by `sort_order`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatView {
    pub combat: Combat,
    pub participants: Vec<CombatParticipant>,
}

impl CombatView {
    pub fn participant(&self, id: ParticipantId) -> Option<&CombatParticipant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Alive participants in turn order.
    pub fn live_order(&self) -> Vec<&CombatParticipant> {
        self.participants.iter().filter(|p| p.is_alive).collect()
    }

    /// Whoever occupies `current_turn` in the live order.
    pub fn current_participant(&self) -> Option<&CombatParticipant> {
        self.live_order().get(self.combat.current_turn).copied()
    }
}

/// Result of adding a character or monster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddedParticipant {
    pub view: CombatView,
    pub participant: CombatParticipant,
    pub initiative: InitiativeRoll,
}

/// Result of a turn advance, with any monster turns that followed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub view: CombatView,
    pub auto_attacks: Vec<AttackLog>,
}

/// Result of a GM-resolved attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackOutcome {
    pub view: CombatView,
    pub attack: AttackLog,
}

/// Result of a player's attack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerAttackOutcome {
    pub view: CombatView,
    pub attack: AttackLog,
    pub auto_attacks: Vec<AttackLog>,
}

/// Result of a flee attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleeOutcome {
    pub view: CombatView,
    pub flee: FleeLog,
    pub auto_attacks: Vec<AttackLog>,
}

/// Entry point for every combat command.
pub struct CombatSession {
    repo: Arc<dyn CombatRepository>,
    broadcaster: Arc<dyn Broadcaster>,
    rng: Arc<dyn DiceRng>,
    config: CombatConfig,
    /// One slot per combat touched; released by `end_combat` and `forget`.
    locks: Mutex<HashMap<CombatId, Arc<AsyncMutex<()>>>>,
}

impl CombatSession {
    /// Create a session rolling dice as the config asks.
    pub fn new(
        repo: Arc<dyn CombatRepository>,
        broadcaster: Arc<dyn Broadcaster>,
        config: CombatConfig,
    ) -> Self {
        let rng = config.dice_rng();
        Self::with_rng(repo, broadcaster, rng, config)
    }

    /// Create a session with an explicit dice source.
    pub fn with_rng(
        repo: Arc<dyn CombatRepository>,
        broadcaster: Arc<dyn Broadcaster>,
        rng: Arc<dyn DiceRng>,
        config: CombatConfig,
    ) -> Self {
        Self {
            repo,
            broadcaster,
            rng,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CombatConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn CombatRepository> {
        &self.repo
    }

    /// Drop the serialization slot of a combat.
    ///
    /// Finished combats reject every mutation, so `end_combat` releases its
    /// slot; call this after deleting a combat from the store directly.
    pub fn forget(&self, combat_id: CombatId) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&combat_id);
    }

    // ========================================================================
    // Game master operations
    // ========================================================================

    /// Open a new encounter in a game.
    pub async fn create_combat(
        &self,
        caller: &Caller,
        game_id: GameId,
        name: impl Into<String>,
    ) -> CombatResult<CombatView> {
        let name = name.into();
        self.require_gm(caller, game_id).await?;

        let combat = Combat::new(game_id, name);
        self.repo.create_combat(&combat).await?;
        info!(combat_id = %combat.id, game_id = %game_id, name = %combat.name, "Combat created");

        self.notify(game_id);
        Ok(CombatView {
            combat,
            participants: Vec::new(),
        })
    }

    /// Snapshot a character into the combat and roll its initiative.
    pub async fn add_character(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        character_id: CharacterId,
    ) -> CombatResult<AddedParticipant> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;

        let record = self.repo.get_character(character_id).await?;
        if record.game_id != combat.game_id {
            return Err(CombatError::NotFound(format!(
                "character {character_id} in game {}",
                combat.game_id
            )));
        }

        let initiative = roll_initiative(self.rng.as_ref(), record.stats.abilities.dexterity);
        let participant = CombatParticipant::from_character(combat_id, &record, initiative.total);
        self.enroll(&combat, participant, initiative).await
    }

    /// Snapshot a monster into the combat and roll its initiative.
    pub async fn add_monster(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        monster_id: MonsterId,
    ) -> CombatResult<AddedParticipant> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;

        let record = self.repo.get_monster(monster_id).await?;
        if record.game_id != combat.game_id {
            return Err(CombatError::NotFound(format!(
                "monster {monster_id} in game {}",
                combat.game_id
            )));
        }

        let initiative = roll_initiative(self.rng.as_ref(), record.stats.abilities.dexterity);
        let participant = CombatParticipant::from_monster(combat_id, &record, initiative.total);
        self.enroll(&combat, participant, initiative).await
    }

    /// Remove a participant and re-rank the rest.
    pub async fn remove_participant(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        participant_id: ParticipantId,
    ) -> CombatResult<CombatView> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;
        let participant = self.engine().member(combat_id, participant_id).await?;

        self.repo.delete_participant(participant_id).await?;
        recalculate_order(self.repo.as_ref(), combat_id).await?;
        info!(combat_id = %combat_id, participant = %participant.name, "Participant removed");

        self.notify(combat.game_id);
        self.view(combat_id).await
    }

    /// Flip auto mode. Does not run any monster turns by itself.
    pub async fn toggle_auto_mode(
        &self,
        caller: &Caller,
        combat_id: CombatId,
    ) -> CombatResult<CombatView> {
        let _guard = self.lock(combat_id).await;
        let mut combat = self.active_combat_as_gm(caller, combat_id).await?;

        combat.auto_mode = !combat.auto_mode;
        self.repo.update_combat(&combat).await?;
        debug!(combat_id = %combat_id, auto_mode = combat.auto_mode, "Toggled auto mode");

        self.notify(combat.game_id);
        self.view(combat_id).await
    }

    /// Advance to the next live participant, then play monster turns.
    pub async fn next_turn(&self, caller: &Caller, combat_id: CombatId) -> CombatResult<TurnOutcome> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;

        advance_turn(self.repo.as_ref(), combat_id).await?;
        let auto_attacks = self.auto_play(combat_id).await;

        self.notify(combat.game_id);
        Ok(TurnOutcome {
            view: self.view(combat_id).await?,
            auto_attacks,
        })
    }

    /// Resolve an attack between any two participants. The turn does not move.
    pub async fn perform_attack(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        attacker_id: ParticipantId,
        target_id: ParticipantId,
        action_index: usize,
    ) -> CombatResult<AttackOutcome> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;

        let attack = self
            .engine()
            .execute(combat_id, attacker_id, target_id, action_index)
            .await?;

        self.notify(combat.game_id);
        Ok(AttackOutcome {
            view: self.view(combat_id).await?,
            attack,
        })
    }

    /// Subtract hit points directly, clamped at 0. No log entry.
    pub async fn apply_damage(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        target_id: ParticipantId,
        amount: i32,
    ) -> CombatResult<CombatView> {
        self.adjust_hp(caller, combat_id, target_id, |p| {
            p.apply_damage(amount);
        })
        .await
    }

    /// Add hit points directly, clamped at max. Healing from 0 revives.
    pub async fn heal_participant(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        target_id: ParticipantId,
        amount: i32,
    ) -> CombatResult<CombatView> {
        self.adjust_hp(caller, combat_id, target_id, |p| {
            p.heal(amount);
        })
        .await
    }

    /// Overwrite a participant's initiative and re-rank.
    pub async fn update_initiative(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        participant_id: ParticipantId,
        initiative: i32,
    ) -> CombatResult<CombatView> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;
        let mut participant = self.engine().member(combat_id, participant_id).await?;

        participant.initiative = initiative;
        self.repo.update_participant(&participant).await?;
        recalculate_order(self.repo.as_ref(), combat_id).await?;
        debug!(combat_id = %combat_id, participant = %participant.name, initiative, "Initiative updated");

        self.notify(combat.game_id);
        self.view(combat_id).await
    }

    /// Replace a participant's condition tags.
    pub async fn update_conditions(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        participant_id: ParticipantId,
        conditions: BTreeSet<String>,
    ) -> CombatResult<CombatView> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;
        let mut participant = self.engine().member(combat_id, participant_id).await?;

        participant.conditions = conditions;
        self.repo.update_participant(&participant).await?;

        self.notify(combat.game_id);
        self.view(combat_id).await
    }

    /// Finish the encounter. Participants stay for the record.
    pub async fn end_combat(&self, caller: &Caller, combat_id: CombatId) -> CombatResult<CombatView> {
        let _guard = self.lock(combat_id).await;
        let mut combat = self.active_combat_as_gm(caller, combat_id).await?;

        combat.status = CombatStatus::Finished;
        self.repo.update_combat(&combat).await?;
        self.forget(combat_id);
        info!(
            combat_id = %combat_id,
            rounds = combat.round,
            entries = combat.log.len(),
            "Combat ended"
        );

        self.notify(combat.game_id);
        self.view(combat_id).await
    }

    /// Read a combat. Open to the GM and to players with a character in it.
    pub async fn get_combat(&self, caller: &Caller, combat_id: CombatId) -> CombatResult<CombatView> {
        let _guard = self.lock(combat_id).await;
        let view = self.view(combat_id).await?;
        let game = self.repo.get_game(view.combat.game_id).await?;
        if game.owner_id == caller.user_id {
            return Ok(view);
        }

        for participant in &view.participants {
            if let ParticipantSource::Character(id) = participant.source {
                if self.owner_of(id).await? == Some(caller.user_id) {
                    return Ok(view);
                }
            }
        }

        Err(CombatError::Forbidden(format!(
            "no character in combat {combat_id}"
        )))
    }

    // ========================================================================
    // Player operations
    // ========================================================================

    /// Attack on your own turn, then pass the turn.
    pub async fn player_attack(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        participant_id: ParticipantId,
        target_id: ParticipantId,
        action_index: usize,
    ) -> CombatResult<PlayerAttackOutcome> {
        let _guard = self.lock(combat_id).await;
        let (combat, _) = self.player_turn(caller, combat_id, participant_id).await?;

        let attack = self
            .engine()
            .execute(combat_id, participant_id, target_id, action_index)
            .await?;
        advance_turn(self.repo.as_ref(), combat_id).await?;
        let auto_attacks = self.auto_play(combat_id).await;

        self.notify(combat.game_id);
        Ok(PlayerAttackOutcome {
            view: self.view(combat_id).await?,
            attack,
            auto_attacks,
        })
    }

    /// Try to escape: `d20 + dex modifier` against [`FLEE_DC`].
    ///
    /// A successful flee removes the participant. The attempt is logged and
    /// the turn passes to the next participant either way.
    pub async fn player_flee(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        participant_id: ParticipantId,
    ) -> CombatResult<FleeOutcome> {
        let _guard = self.lock(combat_id).await;
        let (mut combat, participant) = self.player_turn(caller, combat_id, participant_id).await?;

        let roll = roll_die(self.rng.as_ref(), 20);
        let modifier = dex_modifier(participant.dexterity() as i32);
        let total = roll as i32 + modifier;
        let success = total >= FLEE_DC;
        let flee = FleeLog {
            round: combat.round,
            participant_id,
            participant_name: participant.name.clone(),
            roll,
            modifier,
            total,
            dc: FLEE_DC,
            success,
            timestamp: Utc::now(),
        };

        combat.log.push(LogEntry::Flee(flee.clone()));
        self.repo.update_combat(&combat).await?;

        if success {
            self.repo.delete_participant(participant_id).await?;
            recalculate_order(self.repo.as_ref(), combat_id).await?;
            info!(combat_id = %combat_id, participant = %participant.name, total, "Participant fled");
        } else {
            debug!(combat_id = %combat_id, participant = %participant.name, total, "Flee failed");
        }
        advance_turn(self.repo.as_ref(), combat_id).await?;

        let auto_attacks = self.auto_play(combat_id).await;

        self.notify(combat.game_id);
        Ok(FleeOutcome {
            view: self.view(combat_id).await?,
            flee,
            auto_attacks,
        })
    }

    /// Pass the turn without acting.
    pub async fn player_end_turn(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        participant_id: ParticipantId,
    ) -> CombatResult<TurnOutcome> {
        let _guard = self.lock(combat_id).await;
        let (combat, _) = self.player_turn(caller, combat_id, participant_id).await?;

        advance_turn(self.repo.as_ref(), combat_id).await?;
        let auto_attacks = self.auto_play(combat_id).await;

        self.notify(combat.game_id);
        Ok(TurnOutcome {
            view: self.view(combat_id).await?,
            auto_attacks,
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn lock(&self, combat_id: CombatId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            locks.entry(combat_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    fn engine(&self) -> AttackEngine<'_> {
        AttackEngine::new(self.repo.as_ref(), self.rng.as_ref())
    }

    fn notify(&self, game_id: GameId) {
        self.broadcaster.notify_changed(game_id, ResourceKind::Combat);
    }

    async fn view(&self, combat_id: CombatId) -> CombatResult<CombatView> {
        let combat = self.repo.get_combat(combat_id).await?;
        let participants = self.repo.list_participants(combat_id).await?;
        Ok(CombatView {
            combat,
            participants,
        })
    }

    async fn require_gm(&self, caller: &Caller, game_id: GameId) -> CombatResult<GameRecord> {
        let game = self.repo.get_game(game_id).await?;
        if game.owner_id != caller.user_id {
            return Err(CombatError::Forbidden(format!(
                "only the game master of {} may do this",
                game.name
            )));
        }
        Ok(game)
    }

    async fn active_combat_as_gm(&self, caller: &Caller, combat_id: CombatId) -> CombatResult<Combat> {
        let combat = self.repo.get_combat(combat_id).await?;
        self.require_gm(caller, combat.game_id).await?;
        ensure_active(&combat)?;
        Ok(combat)
    }

    async fn owner_of(&self, character_id: CharacterId) -> CombatResult<Option<UserId>> {
        match self.repo.get_character(character_id).await {
            Ok(record) => Ok(Some(record.owner_id)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    /// Check the caller owns the participant and that it is their turn.
    async fn player_turn(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        participant_id: ParticipantId,
    ) -> CombatResult<(Combat, CombatParticipant)> {
        let combat = self.repo.get_combat(combat_id).await?;
        ensure_active(&combat)?;
        let participant = self.engine().member(combat_id, participant_id).await?;

        let owner = match participant.source {
            ParticipantSource::Character(id) => self.owner_of(id).await?,
            ParticipantSource::Monster(_) => None,
        };
        if owner != Some(caller.user_id) {
            return Err(CombatError::Forbidden(format!(
                "{} is not your character",
                participant.name
            )));
        }

        let live = load_live_order(self.repo.as_ref(), combat_id).await?;
        if live.get(combat.current_turn).map(|p| p.id) != Some(participant_id) {
            return Err(CombatError::not_your_turn());
        }

        Ok((combat, participant))
    }

    async fn enroll(
        &self,
        combat: &Combat,
        mut participant: CombatParticipant,
        initiative: InitiativeRoll,
    ) -> CombatResult<AddedParticipant> {
        // Latecomers lose full ties
        participant.sort_order = self.repo.list_participants(combat.id).await?.len();
        self.repo.create_participant(&participant).await?;
        recalculate_order(self.repo.as_ref(), combat.id).await?;
        let participant = self.repo.get_participant(participant.id).await?;

        info!(
            combat_id = %combat.id,
            participant = %participant.name,
            kind = ?participant.kind(),
            roll = initiative.roll,
            initiative = initiative.total,
            "Participant joined combat"
        );

        self.notify(combat.game_id);
        Ok(AddedParticipant {
            view: self.view(combat.id).await?,
            participant,
            initiative,
        })
    }

    async fn adjust_hp(
        &self,
        caller: &Caller,
        combat_id: CombatId,
        target_id: ParticipantId,
        adjust: impl FnOnce(&mut CombatParticipant),
    ) -> CombatResult<CombatView> {
        let _guard = self.lock(combat_id).await;
        let combat = self.active_combat_as_gm(caller, combat_id).await?;
        let mut target = self.engine().member(combat_id, target_id).await?;

        adjust(&mut target);
        self.repo.update_participant(&target).await?;
        debug!(
            combat_id = %combat_id,
            participant = %target.name,
            hp = target.hp,
            alive = target.is_alive,
            "Adjusted hit points"
        );

        self.notify(combat.game_id);
        self.view(combat_id).await
    }

    /// Run monster turns if the combat is in auto mode.
    async fn auto_play(&self, combat_id: CombatId) -> Vec<AttackLog> {
        match self.repo.get_combat(combat_id).await {
            Ok(combat) if combat.auto_mode => {
                AutoPlayer::new(self.repo.as_ref(), self.rng.as_ref())
                    .with_attack_cap(self.config.auto_play_attack_cap)
                    .run(combat_id)
                    .await
                    .attacks
            }
            Ok(_) => Vec::new(),
            Err(err) => {
                warn!(combat_id = %combat_id, error = %err, "Skipping auto-play");
                Vec::new()
            }
        }
    }
}

fn ensure_active(combat: &Combat) -> CombatResult<()> {
    if !combat.is_active() {
        return Err(CombatError::InvalidState(format!(
            "combat {} is finished",
            combat.name
        )));
    }
    Ok(())
}
