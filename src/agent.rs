//! The decision-unit seam
//!
//! The controller never decides *what* to do; it asks an [`Agent`] for the
//! next action and supervises its execution. Agents are trait objects so a
//! hosting process can plug in any reasoning strategy, and they are
//! constructible by name through an [`AgentRegistry`] so a running agent
//! can delegate to a different kind.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentResult, ControllerError, Result};
use crate::events::Action;
use crate::state::ExecutionState;

/// The shared model/resource handle an agent reasons with. A delegate's
/// agent is constructed with its parent's binding, so a delegation chain
/// shares one underlying model configuration.
///
/// Opaque to the controller core.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelBinding {
    pub model: String,
}

impl ModelBinding {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

/// A decision unit: proposes the next action given the current execution
/// state.
///
/// `propose` takes the state mutably so the implementation can account the
/// characters it emits into `num_chars_emitted`; the controller enforces
/// the resulting budget. Recoverable failures are the [`crate::AgentError`]
/// kinds; anything the agent cannot express as one of those should be
/// handled internally, because the controller treats a recoverable error as
/// an implicit no-op step, not a crash.
#[async_trait]
pub trait Agent: Send + Sync {
    /// A short human-readable name, used in logs.
    fn name(&self) -> &str;

    /// Produce the next action.
    async fn propose(&mut self, state: &mut ExecutionState) -> AgentResult<Action>;

    /// Discard internal progress. Called when the owning controller enters
    /// `Stopped` or `Error`.
    fn reset(&mut self);
}

/// Constructor capability for an agent kind: builds a fresh agent sharing
/// the given binding.
pub type AgentFactory = Arc<dyn Fn(ModelBinding) -> Box<dyn Agent> + Send + Sync>;

/// Name-to-constructor lookup used by delegation.
///
/// Cloning a registry is cheap; the factories are shared.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    factories: HashMap<String, AgentFactory>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a constructor under an agent kind name. Replaces any
    /// previous registration for the same name.
    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(ModelBinding) -> Box<dyn Agent> + Send + Sync + 'static,
    {
        self.factories.insert(kind.into(), Arc::new(factory));
    }

    /// Build an agent of the named kind with the given binding.
    ///
    /// # Errors
    /// Returns `ControllerError::UnknownAgent` if no constructor is
    /// registered under `kind`.
    pub fn build(&self, kind: &str, binding: ModelBinding) -> Result<Box<dyn Agent>> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ControllerError::UnknownAgent(kind.to_string()))?;
        Ok(factory(binding))
    }

    /// Whether a constructor is registered under `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind names.
    pub fn kinds(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
