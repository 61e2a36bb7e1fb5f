//! # Conductor
//!
//! A supervised execution controller for autonomous agents.
//!
//! Conductor drives a pluggable decision unit (an [`Agent`]) through a
//! propose-action / observe-result cycle, mediating everything through an
//! ordered in-process event bus. It enforces iteration and character
//! budgets, detects stuck loops, and lets a running agent delegate work to
//! a child controller that shares the same bus and budgets.
//!
//! ## Structure
//!
//! - [`events`]: actions, observations and the [`EventStream`] bus
//! - [`state`]: the controller state machine and execution record
//! - [`plan`]: the hierarchical task plan
//! - [`agent`]: the decision-unit trait and kind registry
//! - [`config`]: budgets and run-loop timing
//! - [`controller`]: the [`AgentController`] itself
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use conductor::{AgentController, AgentRegistry, ControllerConfig, EventStream, ModelBinding};
//!
//! #[tokio::main]
//! async fn main() {
//!     let stream = EventStream::new();
//!     let mut controller = AgentController::new(
//!         "session-1",
//!         Box::new(my_agent),
//!         AgentRegistry::new(),
//!         ModelBinding::new("my-model"),
//!         stream.clone(),
//!         ControllerConfig::default(),
//!     )
//!     .await;
//!
//!     // a user message starts the cycle
//!     stream
//!         .publish(
//!             conductor::Action::new(conductor::ActionKind::Message {
//!                 content: "fix the failing test".into(),
//!                 wait_for_response: false,
//!             }),
//!             conductor::EventSource::User,
//!         )
//!         .unwrap();
//!
//!     // ... await completion, then tear down
//!     controller.close().await;
//! }
//! ```

pub mod agent;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod plan;
pub mod state;

pub use agent::{Agent, AgentFactory, AgentRegistry, ModelBinding};
pub use config::ControllerConfig;
pub use controller::AgentController;
pub use error::{AgentError, AgentResult, ControllerError, Result};
pub use events::{
    Action, ActionKind, Event, EventHandler, EventPayload, EventSource, EventStream, Observation,
    ObservationKind,
};
pub use plan::{PlanError, Task, TaskPlan, TaskStatus};
pub use state::{AgentState, ExecutionState, HistoryEntry};
