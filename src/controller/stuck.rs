//! Stuck-loop detection
//!
//! A heuristic over the last three resolved steps. Repeating the exact same
//! action is only a problem when it produces nothing (three null
//! observations: a looping thought) or keeps failing (three error
//! observations). The same action with varying meaningful observations is
//! legitimate, e.g. polling for a changing result.

use tracing::info;

use crate::events::ObservationKind;
use crate::state::HistoryEntry;

/// Window size the detector inspects.
const WINDOW: usize = 3;

/// Whether the tail of `history` shows no meaningful progress.
pub(crate) fn detect(history: &[HistoryEntry]) -> bool {
    if history.len() < WINDOW {
        return false;
    }
    let window = &history[history.len() - WINDOW..];

    let reference = &window[0].action.kind;
    if !window.iter().all(|entry| entry.action.kind == *reference) {
        return false;
    }

    if window
        .iter()
        .all(|entry| matches!(entry.observation.kind, ObservationKind::Null))
    {
        info!("repeated action with null observations: loop detected");
        return true;
    }

    if window
        .iter()
        .all(|entry| matches!(entry.observation.kind, ObservationKind::Error { .. }))
    {
        info!("repeated action with error observations: loop detected");
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Action, ActionKind, Observation};

    fn think() -> Action {
        Action::new(ActionKind::Message {
            content: "think".into(),
            wait_for_response: false,
        })
    }

    fn act() -> Action {
        Action::new(ActionKind::Message {
            content: "act".into(),
            wait_for_response: false,
        })
    }

    fn entry(action: Action, observation: Observation) -> HistoryEntry {
        HistoryEntry {
            action,
            observation,
        }
    }

    #[test]
    fn test_short_history_is_not_stuck() {
        assert!(!detect(&[]));
        assert!(!detect(&[entry(think(), Observation::null())]));
        assert!(!detect(&[
            entry(think(), Observation::null()),
            entry(think(), Observation::null()),
        ]));
    }

    #[test]
    fn test_repeated_action_null_observations_is_stuck() {
        let history = vec![
            entry(think(), Observation::null()),
            entry(think(), Observation::null()),
            entry(think(), Observation::null()),
        ];
        assert!(detect(&history));
    }

    #[test]
    fn test_repeated_action_error_observations_is_stuck() {
        // messages may differ; what matters is the error kind
        let history = vec![
            entry(act(), Observation::error("timeout")),
            entry(act(), Observation::error("refused")),
            entry(act(), Observation::error("timeout")),
        ];
        assert!(detect(&history));
    }

    #[test]
    fn test_mixed_observation_kinds_is_not_stuck() {
        let history = vec![
            entry(act(), Observation::error("once")),
            entry(act(), Observation::null()),
            entry(act(), Observation::error("twice")),
        ];
        assert!(!detect(&history));
    }

    #[test]
    fn test_varying_actions_is_not_stuck() {
        let history = vec![
            entry(think(), Observation::null()),
            entry(act(), Observation::null()),
            entry(think(), Observation::null()),
        ];
        assert!(!detect(&history));
    }

    #[test]
    fn test_only_the_last_three_entries_count() {
        let mut history = vec![
            entry(act(), Observation::null()),
            entry(act(), Observation::null()),
            entry(act(), Observation::null()),
        ];
        // a different recent action breaks the window
        history.push(entry(think(), Observation::null()));
        assert!(!detect(&history));
    }
}
