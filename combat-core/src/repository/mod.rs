//! Storage contracts the combat engine works through.
//!
//! The engine never assumes a particular store: it reads source records and
//! reads/writes combats and participants through [`CombatRepository`].
//! [`InMemoryRepository`] is the reference implementation used by tests,
//! the demo, and JSON snapshots.

mod error;
mod memory;
mod traits;

pub use error::{EntityKind, RepositoryError, Result};
pub use memory::InMemoryRepository;
pub use traits::CombatRepository;
