//! Action events
//!
//! Actions are the closed family of things an agent wants to do or has
//! decided. Each action carries a v4 UUID identity used for causal
//! correlation with the observation that resolves it, and a `runnable` flag:
//! runnable actions require an external runtime to execute them and publish
//! a correlated observation before the controller proceeds.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::plan::TaskStatus;
use crate::state::AgentState;

/// The payload of an action, as a closed tagged union.
///
/// Value equality on `ActionKind` is what the stuck-loop detector compares:
/// identities and timestamps live on [`Action`] and are excluded by
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ActionKind {
    /// A message to the conversation. When sent by the agent with
    /// `wait_for_response` set, the controller parks in
    /// `AwaitingUserInput` until the user replies.
    Message {
        content: String,
        wait_for_response: bool,
    },
    /// Delegate the current goal to a child controller running the named
    /// agent kind.
    Delegate {
        agent: String,
        inputs: HashMap<String, Value>,
    },
    /// Add a subtask under `parent` in the plan tree.
    AddTask {
        parent: String,
        goal: String,
        subtasks: Vec<String>,
    },
    /// Set the status of an existing plan task.
    ModifyTask {
        task_id: String,
        status: TaskStatus,
    },
    /// Declare the task complete, carrying the final outputs.
    Finish { outputs: HashMap<String, Value> },
    /// Force the controller into the given state.
    ChangeState { state: AgentState },
    /// The no-op action. Never published on the bus.
    Null,
}

/// An action event: a [`ActionKind`] plus identity, timestamp and the
/// `runnable` backpressure flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Stable identity; observations resolve an action by naming this id
    /// as their `cause`.
    pub id: Uuid,
    /// When the action was constructed.
    pub timestamp: DateTime<Utc>,
    /// Whether an external runtime must execute this action and publish a
    /// correlated observation. At most one runnable action is outstanding
    /// per controller at any time.
    pub runnable: bool,
    pub kind: ActionKind,
}

impl Action {
    /// Create a new non-runnable action with a fresh identity.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            runnable: false,
            kind,
        }
    }

    /// The no-op action.
    pub fn null() -> Self {
        Self::new(ActionKind::Null)
    }

    /// Mark or unmark this action as requiring external execution.
    pub fn with_runnable(mut self, runnable: bool) -> Self {
        self.runnable = runnable;
        self
    }

    /// Whether this is the no-op variant.
    pub fn is_null(&self) -> bool {
        matches!(self.kind, ActionKind::Null)
    }
}
