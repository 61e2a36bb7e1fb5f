//! Execution state owned by a controller
//!
//! One [`ExecutionState`] per controller instance, created with it and
//! mutated only by its event handler and step logic. History is append-only:
//! [`ExecutionState::record`] is the single append point and entries are
//! never rewritten or reordered.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::{Action, Observation};
use crate::plan::TaskPlan;

/// The states of a controller's finite-state machine.
///
/// `Loading` is initial. `Stopped`, `Error` and `Finished` are terminal: a
/// controller in one of them attempts no further steps, though it can still
/// be queried for its last state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Loading,
    Running,
    Stopped,
    Error,
    AwaitingUserInput,
    Finished,
}

impl AgentState {
    /// Whether this state is terminal for the owning controller.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentState::Stopped | AgentState::Error | AgentState::Finished
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentState::Loading => "loading",
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
            AgentState::Error => "error",
            AgentState::AwaitingUserInput => "awaiting_user_input",
            AgentState::Finished => "finished",
        };
        write!(f, "{}", name)
    }
}

/// One resolved step: the action taken and the observation that answered
/// it. Order in history is the causal order in which steps completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub action: Action,
    pub observation: Observation,
}

/// The mutable record of one controller's run: budget usage, resolved
/// history, plan, and the inputs/outputs maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Steps completed (increments once per step attempt that reaches the
    /// decision call).
    pub iteration: usize,
    /// Cumulative characters emitted by the decision unit, counted against
    /// the char budget.
    pub num_chars_emitted: usize,
    /// Append-only sequence of resolved steps.
    pub history: Vec<HistoryEntry>,
    /// Entries recorded since the start of the current step; cleared at
    /// every decision call so agents see a per-cycle delta.
    pub updated_since_last_step: Vec<HistoryEntry>,
    /// The hierarchical task tree.
    pub plan: TaskPlan,
    /// Final outputs, populated only when the agent finishes.
    pub outputs: HashMap<String, Value>,
    inputs: HashMap<String, Value>,
}

impl ExecutionState {
    /// Create a fresh execution state with the given immutable inputs.
    pub fn new(inputs: HashMap<String, Value>) -> Self {
        Self {
            iteration: 0,
            num_chars_emitted: 0,
            history: Vec::new(),
            updated_since_last_step: Vec::new(),
            plan: TaskPlan::default(),
            outputs: HashMap::new(),
            inputs,
        }
    }

    /// The inputs this controller was constructed with.
    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.inputs
    }

    /// Append a resolved `(action, observation)` pair to history and to the
    /// per-cycle delta. The only append point.
    pub fn record(&mut self, action: Action, observation: Observation) {
        let entry = HistoryEntry {
            action,
            observation,
        };
        self.history.push(entry.clone());
        self.updated_since_last_step.push(entry);
    }

    /// Consume one iteration at the start of a step.
    pub fn begin_step(&mut self) {
        self.iteration += 1;
    }

    /// Reset the per-cycle delta after the decision call.
    pub fn clear_step_delta(&mut self) {
        self.updated_since_last_step.clear();
    }

    /// Account characters emitted by the decision unit against the budget.
    pub fn record_chars(&mut self, count: usize) {
        self.num_chars_emitted += count;
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ActionKind;

    #[test]
    fn test_initial_state_is_loading_and_terminal_states() {
        assert!(!AgentState::Loading.is_terminal());
        assert!(!AgentState::Running.is_terminal());
        assert!(!AgentState::AwaitingUserInput.is_terminal());
        assert!(AgentState::Stopped.is_terminal());
        assert!(AgentState::Error.is_terminal());
        assert!(AgentState::Finished.is_terminal());
    }

    #[test]
    fn test_agent_state_display() {
        assert_eq!(AgentState::AwaitingUserInput.to_string(), "awaiting_user_input");
        assert_eq!(AgentState::Running.to_string(), "running");
    }

    #[test]
    fn test_record_appends_to_history_and_delta() {
        let mut state = ExecutionState::default();
        state.record(Action::null(), Observation::null());
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.updated_since_last_step.len(), 1);
    }

    #[test]
    fn test_clear_step_delta_keeps_history() {
        let mut state = ExecutionState::default();
        state.record(Action::null(), Observation::null());
        state.clear_step_delta();
        assert_eq!(state.history.len(), 1);
        assert!(state.updated_since_last_step.is_empty());
    }

    #[test]
    fn test_history_is_append_only() {
        let mut state = ExecutionState::default();
        let first = Action::new(ActionKind::Message {
            content: "one".into(),
            wait_for_response: false,
        });
        state.record(first.clone(), Observation::null());
        let snapshot = state.history[0].clone();

        state.record(Action::null(), Observation::error("later"));
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.history[0], snapshot);
        assert_eq!(state.history[0].action.id, first.id);
    }

    #[test]
    fn test_begin_step_and_chars() {
        let mut state = ExecutionState::default();
        state.begin_step();
        state.begin_step();
        state.record_chars(7);
        state.record_chars(4);
        assert_eq!(state.iteration, 2);
        assert_eq!(state.num_chars_emitted, 11);
    }

    #[test]
    fn test_inputs_are_preserved() {
        let mut inputs = HashMap::new();
        inputs.insert("task".to_string(), serde_json::json!("ship it"));
        let state = ExecutionState::new(inputs.clone());
        assert_eq!(state.inputs(), &inputs);
    }
}
