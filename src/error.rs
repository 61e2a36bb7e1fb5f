//! Error types for Conductor
//!
//! Two layers of errors with different propagation rules. `AgentError` covers
//! recoverable decision-layer failures: they are reported on the event bus as
//! error observations and the step cycle continues to the next tick.
//! `ControllerError` covers fatal conditions: they escape to the run-loop
//! supervisor, which is the only place that converts them into a terminal
//! state transition.

use thiserror::Error;

/// Recoverable errors raised by a decision unit while proposing an action.
///
/// These never abort the run loop. The controller reports them as an
/// `Error` observation and substitutes an implicit no-op action for the
/// current step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The decision unit produced an action that could not be interpreted.
    #[error("Malformed action: {0}")]
    MalformedAction(String),

    /// The decision unit returned without producing any action.
    #[error("No action was returned")]
    NoAction,

    /// The underlying model output could not be parsed into an action.
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),
}

/// Fatal errors that terminate a controller's run loop permanently.
#[derive(Error, Debug)]
pub enum ControllerError {
    /// The iteration budget was exhausted before the agent finished.
    #[error("Iteration budget exceeded: {used} of {limit}")]
    MaxIterationsExceeded { used: usize, limit: usize },

    /// The cumulative character budget was exhausted.
    #[error("Char budget exceeded: emitted {emitted} of {limit}")]
    MaxCharsExceeded { emitted: usize, limit: usize },

    /// A delegation request named an agent kind with no registered
    /// constructor.
    #[error("Unknown agent kind: {0}")]
    UnknownAgent(String),

    /// The event bus dispatcher is gone; no events can be delivered.
    #[error("Event bus closed")]
    BusClosed,
}

/// A specialized `Result` type for Conductor operations.
pub type Result<T> = std::result::Result<T, ControllerError>;

/// A specialized `Result` type for decision-unit operations.
pub type AgentResult<T> = std::result::Result<T, AgentError>;
