//! Initiative rolls, the canonical participant ranking and turn advancement.
//!
//! Every participant of a combat, dead or alive, holds a dense `sort_order`
//! rank. Whose turn it is comes from the *live order*: the alive participants
//! in rank order, recomputed on demand. `Combat::current_turn` indexes that
//! view.

use crate::dice::{roll_die, DiceRng};
use crate::error::CombatResult;
use crate::repository::CombatRepository;
use crate::world::{ability_modifier, CombatId, CombatParticipant};
use std::cmp::Ordering;
use tracing::debug;

/// Dexterity modifier used for initiative and flee checks.
pub fn dex_modifier(score: i32) -> i32 {
    ability_modifier(score)
}

/// Breakdown of one initiative roll, kept for display and the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct InitiativeRoll {
    /// Raw d20.
    pub roll: u32,
    pub modifier: i32,
    pub total: i32,
}

/// Roll `d20 + dex modifier`.
pub fn roll_initiative(rng: &dyn DiceRng, dexterity: u8) -> InitiativeRoll {
    let roll = roll_die(rng, 20);
    let modifier = dex_modifier(dexterity as i32);
    InitiativeRoll {
        roll,
        modifier,
        total: roll as i32 + modifier,
    }
}

fn rank_cmp(a: &CombatParticipant, b: &CombatParticipant) -> Ordering {
    b.initiative
        .cmp(&a.initiative)
        .then_with(|| b.dexterity().cmp(&a.dexterity()))
        .then_with(|| a.sort_order.cmp(&b.sort_order))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort the whole roster into rank order and assign dense `sort_order`
/// values `0..N`.
///
/// Returns the participants whose `sort_order` changed.
pub fn assign_ranks(roster: &mut [CombatParticipant]) -> Vec<CombatParticipant> {
    roster.sort_by(rank_cmp);
    roster
        .iter_mut()
        .enumerate()
        .filter_map(|(rank, participant)| {
            if participant.sort_order == rank {
                return None;
            }
            participant.sort_order = rank;
            Some(participant.clone())
        })
        .collect()
}

/// Alive participants in rank order.
pub fn live_order(participants: Vec<CombatParticipant>) -> Vec<CombatParticipant> {
    let mut live: Vec<CombatParticipant> =
        participants.into_iter().filter(|p| p.is_alive).collect();
    live.sort_by_key(|p| p.sort_order);
    live
}

/// Step a turn index forward, wrapping to 0 and bumping the round when it
/// runs past the live count.
pub fn next_turn_index(current_turn: usize, round: u32, live_count: usize) -> (usize, u32) {
    wrap_turn_index(current_turn + 1, round, live_count)
}

/// Wrap an index that is out of bounds for the live count to 0, bumping the round.
pub fn wrap_turn_index(index: usize, round: u32, live_count: usize) -> (usize, u32) {
    if index >= live_count {
        (0, round.saturating_add(1))
    } else {
        (index, round)
    }
}

/// Re-rank every participant of a combat and persist the ones that moved.
///
/// Returns the full roster in rank order.
pub async fn recalculate_order(
    repo: &dyn CombatRepository,
    combat_id: CombatId,
) -> CombatResult<Vec<CombatParticipant>> {
    let mut roster = repo.list_participants(combat_id).await?;
    let changed = assign_ranks(&mut roster);
    for participant in &changed {
        repo.update_participant(participant).await?;
    }
    debug!(
        combat_id = %combat_id,
        participants = roster.len(),
        moved = changed.len(),
        "Recalculated initiative order"
    );
    Ok(roster)
}

/// Load the live order of a combat fresh from the store.
pub async fn load_live_order(
    repo: &dyn CombatRepository,
    combat_id: CombatId,
) -> CombatResult<Vec<CombatParticipant>> {
    Ok(live_order(repo.list_participants(combat_id).await?))
}

/// Result of [`advance_turn`].
#[derive(Debug, Clone)]
pub struct TurnAdvance {
    pub index: usize,
    pub round: u32,
    pub live: Vec<CombatParticipant>,
    /// False when nobody is alive and the combat was left untouched.
    pub advanced: bool,
}

impl TurnAdvance {
    /// The participant whose turn it now is.
    pub fn current(&self) -> Option<&CombatParticipant> {
        self.live.get(self.index)
    }
}

/// Move the turn to the next live participant, wrapping into a new round.
pub async fn advance_turn(
    repo: &dyn CombatRepository,
    combat_id: CombatId,
) -> CombatResult<TurnAdvance> {
    let mut combat = repo.get_combat(combat_id).await?;
    let live = load_live_order(repo, combat_id).await?;

    if live.is_empty() {
        return Ok(TurnAdvance {
            index: combat.current_turn,
            round: combat.round,
            live,
            advanced: false,
        });
    }

    let (index, round) = next_turn_index(combat.current_turn, combat.round, live.len());
    combat.current_turn = index;
    combat.round = round;
    repo.update_combat(&combat).await?;

    debug!(
        combat_id = %combat_id,
        round,
        turn = index,
        current = live.get(index).map(|p| p.name.as_str()).unwrap_or(""),
        "Advanced turn"
    );

    Ok(TurnAdvance {
        index,
        round,
        live,
        advanced: true,
    })
}
