//! Runtime Configuration
//!
//! A [`RuntimeConfig`] decides how the job scheduler reaches its flush and
//! how defensive it is about jobs that keep re-queueing themselves.
//!
//! Configuration is plain data: build it in code, or load it from JSON.
//!
//! ```rust
//! use weft_core::config::{FlushMode, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_json(r#"{ "flush_mode": "manual" }"#).unwrap();
//! assert_eq!(config.flush_mode, FlushMode::Manual);
//! assert_eq!(config.recursion_limit, 100);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of times one job may run within a single flush pass.
pub const DEFAULT_RECURSION_LIMIT: usize = 100;

/// How a pending flush gets executed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Flush as a task spawned onto the `LocalSet` driven by
    /// `Runtime::run_until`, so every job queued in one synchronous turn
    /// lands in a single flush.
    ///
    /// Outside of `run_until` this behaves like [`FlushMode::Manual`].
    #[default]
    Microtask,

    /// Flush only when `Runtime::flush_jobs` is called or a `next_tick`
    /// future is polled.
    Manual,
}

/// Settings for one [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How pending flushes are executed.
    pub flush_mode: FlushMode,

    /// Maximum number of runs of the same job in one flush pass. Runs past
    /// the limit are skipped and reported as job failures.
    pub recursion_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            flush_mode: FlushMode::Microtask,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

impl RuntimeConfig {
    /// A configuration that never spawns flush tasks.
    pub fn manual() -> Self {
        Self {
            flush_mode: FlushMode::Manual,
            ..Self::default()
        }
    }

    /// Parse and validate a configuration from JSON. Missing fields fall
    /// back to their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.recursion_limit == 0 {
            return Err(Error::InvalidConfig(
                "recursion_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_microtask_flush() {
        let config = RuntimeConfig::default();
        assert_eq!(config.flush_mode, FlushMode::Microtask);
        assert_eq!(config.recursion_limit, DEFAULT_RECURSION_LIMIT);
    }

    #[test]
    fn parses_partial_json() {
        let config = RuntimeConfig::from_json(r#"{ "recursion_limit": 7 }"#).unwrap();
        assert_eq!(config.flush_mode, FlushMode::Microtask);
        assert_eq!(config.recursion_limit, 7);
    }

    #[test]
    fn rejects_zero_recursion_limit() {
        let err = RuntimeConfig::from_json(r#"{ "recursion_limit": 0 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn rejects_unknown_flush_mode() {
        let err = RuntimeConfig::from_json(r#"{ "flush_mode": "eventually" }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
