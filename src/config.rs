//! Lock tuning and environment overrides.
//!
//! A [`LockConfig`] is resolved in layers: built-in defaults, then `QLOCK_*`
//! environment overrides, then explicit `with_*` calls. The result is checked
//! by [`LockConfig::validate`] before a lock is built from it.
//!
//! | Variable | Field |
//! |---|---|
//! | `QLOCK_QUEUE_SPIN_LIMIT` | [`LockConfig::queue_spin_limit`] |
//! | `QLOCK_ARENA_CAPACITY` | [`LockConfig::arena_capacity`] |

use std::collections::BTreeMap;

use crate::error::ConfigError;

/// Environment prefix for overrides.
const ENV_PREFIX: &str = "QLOCK_";
const ENV_QUEUE_SPIN_LIMIT: &str = "QLOCK_QUEUE_SPIN_LIMIT";
const ENV_ARENA_CAPACITY: &str = "QLOCK_ARENA_CAPACITY";

/// Largest accepted spin exponent (2^16 spins before yielding).
pub const MAX_QUEUE_SPIN_LIMIT: u32 = 16;

/// Tuning for one lock instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Name reported in metrics snapshots and log events.
    pub name: &'static str,
    /// Exponent bound for the spin phase while the queue bit is contended.
    /// Past `2^queue_spin_limit` spins the thread yields instead.
    pub queue_spin_limit: u32,
    /// Initial node slots reserved for waiters.
    pub arena_capacity: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            name: "mutex",
            queue_spin_limit: 6,
            arena_capacity: 4,
        }
    }
}

impl LockConfig {
    /// Defaults with `QLOCK_*` environment overrides applied and validated.
    pub fn from_env() -> Result<Self, ConfigError> {
        let overrides: BTreeMap<String, String> = std::env::vars()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .collect();
        let mut config = Self::default();
        config.apply_overrides(&overrides)?;
        config.validate()?;
        Ok(config)
    }

    /// Sets the lock name.
    #[must_use]
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Sets the spin exponent bound.
    #[must_use]
    pub fn with_queue_spin_limit(mut self, limit: u32) -> Self {
        self.queue_spin_limit = limit;
        self
    }

    /// Sets the initial node capacity.
    #[must_use]
    pub fn with_arena_capacity(mut self, capacity: usize) -> Self {
        self.arena_capacity = capacity;
        self
    }

    /// Checks the guardrails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_spin_limit > MAX_QUEUE_SPIN_LIMIT {
            return Err(ConfigError::InvalidSpinLimit(self.queue_spin_limit));
        }
        if self.arena_capacity == 0 {
            return Err(ConfigError::ZeroArenaCapacity);
        }
        Ok(())
    }

    fn apply_overrides(
        &mut self,
        overrides: &BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        for (key, value) in overrides {
            self.apply_override(key, value)?;
        }
        Ok(())
    }

    fn apply_override(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            ENV_QUEUE_SPIN_LIMIT => {
                self.queue_spin_limit = parse_env(ENV_QUEUE_SPIN_LIMIT, value)?;
            }
            ENV_ARENA_CAPACITY => {
                self.arena_capacity = parse_env(ENV_ARENA_CAPACITY, value)?;
            }
            _ => return Err(ConfigError::InvalidOverride(key.to_string())),
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}
