//! Event Model and Event Stream
//!
//! Everything a controller sees or produces travels as an [`Event`] over the
//! [`EventStream`]: actions the agent decided on, and observations feeding
//! results back. Events form two closed tagged unions dispatched with
//! exhaustive matches, so a new variant is a compile error at every dispatch
//! site rather than a silently ignored runtime case.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  publish   ┌──────────────┐  deliver   ┌──────────────┐
//! │ user / agent │───────────>│ EventStream  │───────────>│ controller   │
//! │ / runtime    │            │ (ordered)    │  in order  │ handlers     │
//! └──────────────┘            └──────────────┘            └──────────────┘
//! ```

pub mod action;
pub mod observation;
pub mod stream;

pub use action::{Action, ActionKind};
pub use observation::{Observation, ObservationKind};
pub use stream::{EventHandler, EventStream};

use serde::{Deserialize, Serialize};

/// Who produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    User,
    Agent,
}

impl std::fmt::Display for EventSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventSource::User => write!(f, "user"),
            EventSource::Agent => write!(f, "agent"),
        }
    }
}

/// The payload carried by an event: an action or an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Action(Action),
    Observation(Observation),
}

impl From<Action> for EventPayload {
    fn from(action: Action) -> Self {
        EventPayload::Action(action)
    }
}

impl From<Observation> for EventPayload {
    fn from(observation: Observation) -> Self {
        EventPayload::Observation(observation)
    }
}

/// An event on the bus: a payload plus the source tag stamped at publish
/// time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub source: EventSource,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(payload: impl Into<EventPayload>, source: EventSource) -> Self {
        Self {
            source,
            payload: payload.into(),
        }
    }
}
