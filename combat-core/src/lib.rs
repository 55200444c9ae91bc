//! Turn-based combat engine for shared tabletop RPG sessions.
//!
//! This crate provides:
//! - Initiative ordering that survives deaths and removals mid-encounter
//! - Percentile attack resolution with critical and fumble bands
//! - Automatic monster turns with a bounded loop
//! - Flee checks and an append-only combat log
//! - A storage-agnostic repository layer with an in-memory store
//!
//! # Quick Start
//!
//! ```ignore
//! use combat_core::{Caller, CombatConfig, CombatSession, InMemoryRepository, NoopBroadcaster};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let repo = Arc::new(InMemoryRepository::new());
//!     // ... seed a game, characters and monsters ...
//!
//!     let session = CombatSession::new(repo, Arc::new(NoopBroadcaster), CombatConfig::from_env());
//!     let gm = Caller::new(game_master_id);
//!
//!     let view = session.create_combat(&gm, game_id, "Goblin Ambush").await?;
//!     session.add_monster(&gm, view.combat.id, goblin_id).await?;
//!     session.add_character(&gm, view.combat.id, hero_id).await?;
//!
//!     let outcome = session.next_turn(&gm, view.combat.id).await?;
//!     for attack in &outcome.auto_attacks {
//!         println!("{attack}");
//!     }
//!     Ok(())
//! }
//! ```

pub mod autoplay;
pub mod broadcast;
pub mod combat_log;
pub mod config;
pub mod dice;
pub mod error;
pub mod initiative;
pub mod persist;
pub mod repository;
pub mod rules;
pub mod session;
pub mod testing;
pub mod world;

// Primary public API
pub use broadcast::{Broadcaster, ChangeNotice, ChannelBroadcaster, NoopBroadcaster, ResourceKind};
pub use combat_log::{AttackLog, FleeLog, LogEntry};
pub use config::CombatConfig;
pub use dice::{DamageFormula, DiceRng, SeededDiceRng, ThreadDiceRng};
pub use error::{CombatError, CombatResult};
pub use persist::{PersistError, StoreSnapshot};
pub use repository::{CombatRepository, InMemoryRepository, RepositoryError};
pub use session::{
    AddedParticipant, AttackOutcome, Caller, CombatSession, CombatView, FleeOutcome,
    PlayerAttackOutcome, TurnOutcome,
};
pub use testing::{ScriptedRng, TestTable};
pub use world::{
    AbilityScores, Action, CharacterRecord, Combat, CombatParticipant, CombatStatus, GameRecord,
    MonsterRecord,
};
