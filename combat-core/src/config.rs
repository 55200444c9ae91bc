//! Engine configuration.

use crate::dice::{DiceRng, SeededDiceRng, ThreadDiceRng};
use std::sync::Arc;
use tracing::warn;

/// Environment variable holding a dice seed.
pub const RNG_SEED_VAR: &str = "COMBAT_RNG_SEED";

/// Environment variable holding the auto-play attack cap.
pub const AUTO_PLAY_CAP_VAR: &str = "COMBAT_AUTO_PLAY_CAP";

const DEFAULT_BROADCAST_CAPACITY: usize = 64;

/// Configuration for a [`CombatSession`](crate::session::CombatSession).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombatConfig {
    /// Seed for reproducible dice. `None` uses the thread generator.
    pub rng_seed: Option<u64>,

    /// Upper bound on attacks per auto-play run, on top of the live count.
    pub auto_play_attack_cap: Option<usize>,

    /// Buffer size for channel-backed broadcasters.
    pub broadcast_capacity: usize,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CombatConfig {
    pub fn new() -> Self {
        Self {
            rng_seed: None,
            auto_play_attack_cap: None,
            broadcast_capacity: DEFAULT_BROADCAST_CAPACITY,
        }
    }

    /// Roll reproducible dice from this seed.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng_seed = Some(seed);
        self
    }

    /// Cap the number of attacks one auto-play run may resolve.
    pub fn with_auto_play_attack_cap(mut self, cap: usize) -> Self {
        self.auto_play_attack_cap = Some(cap);
        self
    }

    pub fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Read overrides from `COMBAT_RNG_SEED` and `COMBAT_AUTO_PLAY_CAP`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`. Malformed values are ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::new();

        if let Some(raw) = lookup(RNG_SEED_VAR) {
            match raw.trim().parse::<u64>() {
                Ok(seed) => config.rng_seed = Some(seed),
                Err(err) => warn!(var = RNG_SEED_VAR, value = %raw, error = %err, "Ignoring malformed seed"),
            }
        }

        if let Some(raw) = lookup(AUTO_PLAY_CAP_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(cap) if cap > 0 => config.auto_play_attack_cap = Some(cap),
                Ok(_) => warn!(var = AUTO_PLAY_CAP_VAR, "Ignoring zero auto-play cap"),
                Err(err) => warn!(var = AUTO_PLAY_CAP_VAR, value = %raw, error = %err, "Ignoring malformed auto-play cap"),
            }
        }

        config
    }

    /// Build the dice source this configuration asks for.
    pub fn dice_rng(&self) -> Arc<dyn DiceRng> {
        match self.rng_seed {
            Some(seed) => Arc::new(SeededDiceRng::new(seed)),
            None => Arc::new(ThreadDiceRng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dice::roll_die;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_builder() {
        let config = CombatConfig::new()
            .with_rng_seed(7)
            .with_auto_play_attack_cap(4)
            .with_broadcast_capacity(16);
        assert_eq!(config.rng_seed, Some(7));
        assert_eq!(config.auto_play_attack_cap, Some(4));
        assert_eq!(config.broadcast_capacity, 16);
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = CombatConfig::from_lookup(lookup_from(&[
            (RNG_SEED_VAR, " 1234 "),
            (AUTO_PLAY_CAP_VAR, "6"),
        ]));
        assert_eq!(config.rng_seed, Some(1234));
        assert_eq!(config.auto_play_attack_cap, Some(6));
    }

    #[test]
    fn test_from_lookup_ignores_malformed_values() {
        let config = CombatConfig::from_lookup(lookup_from(&[
            (RNG_SEED_VAR, "lucky"),
            (AUTO_PLAY_CAP_VAR, "0"),
        ]));
        assert_eq!(config, CombatConfig::new());
    }

    #[test]
    fn test_seeded_config_is_reproducible() {
        let config = CombatConfig::new().with_rng_seed(99);
        let a = config.dice_rng();
        let b = config.dice_rng();
        let first: Vec<u32> = (0..10).map(|_| roll_die(a.as_ref(), 20)).collect();
        let second: Vec<u32> = (0..10).map(|_| roll_die(b.as_ref(), 20)).collect();
        assert_eq!(first, second);
    }
}
