//! Observation events
//!
//! Observations are results, status changes or errors fed back into a
//! controller. An observation optionally carries a `cause`: the identity of
//! the action it resolves. Observations whose cause matches the controller's
//! pending action complete that step; anything else is recorded against a
//! no-op action rather than dropped.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::state::AgentState;

/// The payload of an observation, as a closed tagged union.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "observation", rename_all = "snake_case")]
pub enum ObservationKind {
    /// The no-effect observation, paired with actions that need no
    /// external execution.
    Null,
    /// Something went wrong; the message is user-visible.
    Error { message: String },
    /// A controller's state changed. The only channel by which external
    /// observers learn of state transitions.
    StateChanged { state: AgentState },
    /// A delegate controller completed, carrying its outputs.
    Delegate {
        content: String,
        outputs: HashMap<String, Value>,
    },
}

/// An observation event: an [`ObservationKind`] plus identity, timestamp
/// and an optional causal reference to the action it resolves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub id: Uuid,
    /// Identity of the action this observation resolves, if any.
    pub cause: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub kind: ObservationKind,
}

impl Observation {
    /// Create a new uncaused observation with a fresh identity.
    pub fn new(kind: ObservationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            cause: None,
            timestamp: Utc::now(),
            kind,
        }
    }

    /// The no-effect observation.
    pub fn null() -> Self {
        Self::new(ObservationKind::Null)
    }

    /// An error observation with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ObservationKind::Error {
            message: message.into(),
        })
    }

    /// Attach the identity of the action this observation resolves.
    pub fn caused_by(mut self, action_id: Uuid) -> Self {
        self.cause = Some(action_id);
        self
    }

    /// Whether this is the no-effect variant.
    pub fn is_null(&self) -> bool {
        matches!(self.kind, ObservationKind::Null)
    }

    /// Whether this is an error observation.
    pub fn is_error(&self) -> bool {
        matches!(self.kind, ObservationKind::Error { .. })
    }
}
