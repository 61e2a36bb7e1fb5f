//! Controller configuration
//!
//! Budgets and timing are injected at construction rather than read from
//! ambient globals; a delegate inherits its parent's configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default iteration budget per controller.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

/// Default cumulative character budget per controller.
pub const DEFAULT_MAX_CHARS: usize = 5_000_000;

/// Default interval between step attempts.
pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Per-controller budgets and run-loop timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Maximum number of steps before the run loop fails fatally.
    pub max_iterations: usize,
    /// Maximum cumulative characters the decision unit may emit.
    pub max_chars: usize,
    /// Fixed interval between step attempts, regardless of outcome. This
    /// bounds polling overhead; it is not a rate limit on decisions.
    pub tick: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_chars: DEFAULT_MAX_CHARS,
            tick: DEFAULT_TICK,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.max_chars, 5_000_000);
        assert_eq!(config.tick, Duration::from_secs(1));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ControllerConfig = serde_json::from_str(r#"{"max_iterations": 5}"#).unwrap();
        assert_eq!(config.max_iterations, 5);
        assert_eq!(config.max_chars, DEFAULT_MAX_CHARS);
        assert_eq!(config.tick, DEFAULT_TICK);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = ControllerConfig {
            max_iterations: 3,
            max_chars: 10,
            tick: Duration::from_millis(20),
        };
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ControllerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
