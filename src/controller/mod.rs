//! The agent execution controller
//!
//! An [`AgentController`] drives one decision unit through a repeated
//! propose-action / observe-result cycle: a supervised background task
//! attempts one step per tick, the bus handler folds events into the
//! execution state, and at most one runnable action is ever outstanding.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  events   ┌──────────────────┐  propose   ┌─────────┐
//! │ EventStream  │──────────>│ AgentController  │───────────>│  Agent  │
//! │              │<──────────│  (state machine) │<───────────│         │
//! └──────────────┘  actions  └──────────────────┘   action   └─────────┘
//!                                    │ lockstep
//!                                    ▼
//!                            ┌──────────────────┐
//!                            │ delegate (child  │
//!                            │  controller)     │
//!                            └──────────────────┘
//! ```
//!
//! Single-writer discipline: the bus handler and the run loop share one
//! `tokio::Mutex` around the controller's mutable record, so event handling
//! and stepping never interleave against the same state. A delegate child
//! has its own lock but no run loop of its own; the parent advances it
//! synchronously inside its own step, so a delegation chain never advances
//! in parallel.

mod stuck;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, AgentRegistry, ModelBinding};
use crate::config::ControllerConfig;
use crate::error::{ControllerError, Result};
use crate::events::{
    Action, ActionKind, Event, EventHandler, EventPayload, EventSource, EventStream, Observation,
    ObservationKind,
};
use crate::state::{AgentState, ExecutionState};

/// An active delegate: the child's id on the bus and its shared record.
struct DelegateHandle {
    id: String,
    inner: Arc<Mutex<ControllerInner>>,
}

/// The mutable record of one controller, guarded by a single mutex.
struct ControllerInner {
    id: String,
    agent: Box<dyn Agent>,
    registry: AgentRegistry,
    binding: ModelBinding,
    stream: EventStream,
    config: ControllerConfig,
    state: ExecutionState,
    current: AgentState,
    pending: Option<Action>,
    delegate: Option<DelegateHandle>,
}

impl ControllerInner {
    #[allow(clippy::too_many_arguments)]
    fn new(
        id: String,
        agent: Box<dyn Agent>,
        registry: AgentRegistry,
        binding: ModelBinding,
        stream: EventStream,
        config: ControllerConfig,
        inputs: HashMap<String, Value>,
    ) -> Self {
        Self {
            id,
            agent,
            registry,
            binding,
            stream,
            config,
            state: ExecutionState::new(inputs),
            current: AgentState::Loading,
            pending: None,
            delegate: None,
        }
    }

    /// Move the state machine to `new_state`.
    ///
    /// No-op when the state is unchanged. Entering `Stopped` or `Error`
    /// resets the decision unit. Every real transition publishes exactly
    /// one `StateChanged` observation; there is no other notification
    /// channel.
    fn transition_to(&mut self, new_state: AgentState) {
        if new_state == self.current {
            return;
        }
        info!(
            controller = %self.id,
            from = %self.current,
            to = %new_state,
            "agent state transition"
        );
        self.current = new_state;
        if matches!(new_state, AgentState::Stopped | AgentState::Error) {
            self.agent.reset();
        }
        let observation = Observation::new(ObservationKind::StateChanged { state: new_state });
        if self.stream.publish(observation, EventSource::Agent).is_err() {
            warn!(controller = %self.id, "state change observation dropped: bus closed");
        }
    }

    /// Publish a user-visible error observation.
    fn report_error(&self, message: &str) {
        error!(controller = %self.id, message, "reporting error");
        if self
            .stream
            .publish(Observation::error(message), EventSource::Agent)
            .is_err()
        {
            warn!(controller = %self.id, "error observation dropped: bus closed");
        }
    }

    /// Fold one bus event into the execution state, in delivery order.
    async fn on_event(&mut self, event: Event) {
        match event.payload {
            EventPayload::Action(action) => {
                // While a delegate is active every ancestor sees the
                // chain's actions too; only the deepest controller without
                // a delegate may act on them.
                if self.delegate.is_some() && event.source == EventSource::Agent {
                    debug!(
                        controller = %self.id,
                        action = ?action.kind,
                        "agent action belongs to the delegate chain"
                    );
                    return;
                }
                match action.kind.clone() {
                    ActionKind::ChangeState { state } => self.transition_to(state),
                    ActionKind::Message {
                        wait_for_response, ..
                    } => {
                        if event.source == EventSource::User {
                            self.state.record(action, Observation::null());
                            if self.current != AgentState::Running {
                                self.transition_to(AgentState::Running);
                            }
                        } else if wait_for_response {
                            self.transition_to(AgentState::AwaitingUserInput);
                        }
                    }
                    ActionKind::Delegate { agent, inputs } => {
                        self.start_delegate(&agent, inputs).await;
                    }
                    ActionKind::AddTask {
                        parent,
                        goal,
                        subtasks,
                    } => {
                        if let Err(err) = self.state.plan.add_subtask(&parent, &goal, subtasks) {
                            self.report_error(&err.to_string());
                        }
                    }
                    ActionKind::ModifyTask { task_id, status } => {
                        if let Err(err) = self.state.plan.set_subtask_state(&task_id, status) {
                            self.report_error(&err.to_string());
                        }
                    }
                    ActionKind::Finish { outputs } => {
                        self.state.outputs = outputs;
                        self.transition_to(AgentState::Finished);
                    }
                    ActionKind::Null => {}
                }
            }
            EventPayload::Observation(observation) => {
                let resolves_pending = self
                    .pending
                    .as_ref()
                    .map(|pending| observation.cause == Some(pending.id))
                    .unwrap_or(false);
                if resolves_pending {
                    if let Some(pending) = self.pending.take() {
                        self.state.record(pending, observation);
                    }
                } else {
                    // unsolicited observations are recorded against a no-op
                    // action rather than dropped
                    self.state.record(Action::null(), observation);
                }
            }
        }
    }

    /// Start a child controller for the named agent kind.
    ///
    /// The child shares the bus, the parent's budgets and its model
    /// binding; its id is `"<parent>-delegate"`. At most one delegate may
    /// be active; further requests are rejected.
    async fn start_delegate(&mut self, agent_kind: &str, inputs: HashMap<String, Value>) {
        if self.delegate.is_some() {
            warn!(
                controller = %self.id,
                agent = agent_kind,
                "delegation request rejected: a delegate is already active"
            );
            return;
        }
        let agent = match self.registry.build(agent_kind, self.binding.clone()) {
            Ok(agent) => agent,
            Err(err) => {
                self.report_error(&err.to_string());
                return;
            }
        };
        let child_id = format!("{}-delegate", self.id);
        info!(
            controller = %self.id,
            delegate = %child_id,
            agent = %agent.name(),
            "starting delegate"
        );
        let child = Arc::new(Mutex::new(ControllerInner::new(
            child_id.clone(),
            agent,
            self.registry.clone(),
            self.binding.clone(),
            self.stream.clone(),
            self.config.clone(),
            inputs,
        )));
        self.stream
            .subscribe(child_id.clone(), controller_handler(Arc::clone(&child)))
            .await;
        child.lock().await.transition_to(AgentState::Running);
        self.delegate = Some(DelegateHandle {
            id: child_id,
            inner: child,
        });
    }

    /// Attempt one step of the state machine.
    ///
    /// Returns whether the controller is in a terminal state afterwards,
    /// which is how a parent observes its delegate's completion. Boxed
    /// because a delegation chain steps recursively.
    fn step(&mut self) -> BoxFuture<'_, Result<bool>> {
        async move {
            if self.current != AgentState::Running {
                debug!(controller = %self.id, state = %self.current, "waiting for agent to run");
                return Ok(self.current.is_terminal());
            }
            if let Some(pending) = &self.pending {
                // backpressure: never issue a second action while one is
                // outstanding
                debug!(controller = %self.id, action = ?pending.kind, "waiting for pending action");
                return Ok(false);
            }

            let delegate = self
                .delegate
                .as_ref()
                .map(|d| (d.id.clone(), Arc::clone(&d.inner)));
            if let Some((child_id, child_inner)) = delegate {
                let done = {
                    let mut child = child_inner.lock().await;
                    child.step().await?
                };
                if done {
                    let outputs = {
                        let child = child_inner.lock().await;
                        child.state.outputs.clone()
                    };
                    info!(controller = %self.id, delegate = %child_id, "delegate resolved");
                    let observation = Observation::new(ObservationKind::Delegate {
                        content: String::new(),
                        outputs,
                    });
                    self.stream.publish(observation, EventSource::Agent)?;
                    self.stream.unsubscribe(&child_id).await;
                    self.delegate = None;
                }
                // resolving a delegate never consumes the parent's own
                // iteration in the same cycle
                return Ok(false);
            }

            if self.state.num_chars_emitted > self.config.max_chars {
                return Err(ControllerError::MaxCharsExceeded {
                    emitted: self.state.num_chars_emitted,
                    limit: self.config.max_chars,
                });
            }
            if self.state.iteration >= self.config.max_iterations {
                return Err(ControllerError::MaxIterationsExceeded {
                    used: self.state.iteration,
                    limit: self.config.max_iterations,
                });
            }

            self.state.begin_step();
            info!(controller = %self.id, iteration = self.state.iteration, "step");

            let action = match self.agent.propose(&mut self.state).await {
                Ok(action) => action,
                Err(err) => {
                    // recoverable decision errors become an implicit no-op
                    // step instead of aborting the loop
                    warn!(controller = %self.id, error = %err, "recoverable decision error");
                    self.report_error(&err.to_string());
                    Action::null()
                }
            };
            debug!(
                controller = %self.id,
                action = ?action.kind,
                runnable = action.runnable,
                "action proposed"
            );
            self.state.clear_step_delta();

            let publish = !action.is_null();
            if action.runnable {
                self.pending = Some(action.clone());
            } else {
                self.state.record(action.clone(), Observation::null());
            }
            if publish {
                self.stream.publish(action, EventSource::Agent)?;
            }

            if self.is_stuck().await {
                self.report_error("Agent got stuck in a loop");
                self.transition_to(AgentState::Error);
            }
            Ok(self.current.is_terminal())
        }
        .boxed()
    }

    /// Whether this controller, or its active delegate, shows no
    /// meaningful progress over the last three steps.
    fn is_stuck(&self) -> BoxFuture<'_, bool> {
        async move {
            if let Some(delegate) = &self.delegate {
                let delegate_stuck = {
                    let child = delegate.inner.lock().await;
                    child.is_stuck().await
                };
                if delegate_stuck {
                    return true;
                }
            }
            stuck::detect(&self.state.history)
        }
        .boxed()
    }
}

/// Wrap a controller record as a bus subscriber callback.
fn controller_handler(inner: Arc<Mutex<ControllerInner>>) -> EventHandler {
    Arc::new(move |event: Event| {
        let inner = Arc::clone(&inner);
        async move {
            let mut guard = inner.lock().await;
            guard.on_event(event).await;
        }
        .boxed()
    })
}

/// The supervised run loop: one step attempt per tick until cancelled or a
/// fatal error terminates it permanently.
async fn run_loop(
    id: String,
    inner: Arc<Mutex<ControllerInner>>,
    stream: EventStream,
    mut shutdown_rx: watch::Receiver<bool>,
    tick: Duration,
) {
    info!(controller = %id, "run loop started");
    loop {
        let outcome = {
            let mut guard = inner.lock().await;
            guard.step().await
        };
        if let Err(err) = outcome {
            // the supervisor is the only place fatal errors become a
            // terminal transition; no automatic restart
            error!(controller = %id, error = %err, "fatal error while running the agent");
            let mut guard = inner.lock().await;
            guard.report_error("There was an unexpected error while running the agent");
            guard.transition_to(AgentState::Error);
            return;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(controller = %id, "run loop cancelled");
                    stream.unsubscribe(&id).await;
                    let mut guard = inner.lock().await;
                    guard.transition_to(AgentState::Stopped);
                    return;
                }
            }
            _ = tokio::time::sleep(tick) => {}
        }
    }
}

/// A per-session agent execution controller.
///
/// Construction subscribes the controller to the event stream and spawns
/// its run loop; the controller starts in `Loading` and begins stepping
/// once something transitions it to `Running` (typically the first user
/// message). Dropping the controller cancels the loop; [`close`] does so
/// deterministically and waits for teardown.
///
/// [`close`]: AgentController::close
///
/// # Example
///
/// ```rust,ignore
/// use conductor::{AgentController, AgentRegistry, ControllerConfig, EventStream, ModelBinding};
///
/// let stream = EventStream::new();
/// let mut controller = AgentController::new(
///     "session-1",
///     Box::new(my_agent),
///     AgentRegistry::new(),
///     ModelBinding::new("my-model"),
///     stream.clone(),
///     ControllerConfig::default(),
/// )
/// .await;
///
/// // feed it events, observe its state...
/// controller.close().await;
/// ```
pub struct AgentController {
    id: String,
    stream: EventStream,
    inner: Arc<Mutex<ControllerInner>>,
    shutdown_tx: watch::Sender<bool>,
    loop_handle: Option<JoinHandle<()>>,
}

impl AgentController {
    /// Create a controller with no inputs.
    pub async fn new(
        id: impl Into<String>,
        agent: Box<dyn Agent>,
        registry: AgentRegistry,
        binding: ModelBinding,
        stream: EventStream,
        config: ControllerConfig,
    ) -> Self {
        Self::with_inputs(id, agent, registry, binding, stream, config, HashMap::new()).await
    }

    /// Create a controller whose execution state carries the given
    /// immutable inputs.
    pub async fn with_inputs(
        id: impl Into<String>,
        agent: Box<dyn Agent>,
        registry: AgentRegistry,
        binding: ModelBinding,
        stream: EventStream,
        config: ControllerConfig,
        inputs: HashMap<String, Value>,
    ) -> Self {
        let id = id.into();
        let tick = config.tick;
        let inner = Arc::new(Mutex::new(ControllerInner::new(
            id.clone(),
            agent,
            registry,
            binding,
            stream.clone(),
            config,
            inputs,
        )));
        stream
            .subscribe(id.clone(), controller_handler(Arc::clone(&inner)))
            .await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_handle = tokio::spawn(run_loop(
            id.clone(),
            Arc::clone(&inner),
            stream.clone(),
            shutdown_rx,
            tick,
        ));

        Self {
            id,
            stream,
            inner,
            shutdown_tx,
            loop_handle: Some(loop_handle),
        }
    }

    /// This controller's id (also its subscriber id on the bus).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current state of the state machine.
    pub async fn state(&self) -> AgentState {
        self.inner.lock().await.current
    }

    /// Snapshot of the execution state.
    pub async fn execution_state(&self) -> ExecutionState {
        self.inner.lock().await.state.clone()
    }

    /// The outstanding runnable action, if any.
    pub async fn pending_action(&self) -> Option<Action> {
        self.inner.lock().await.pending.clone()
    }

    /// Run the stuck-loop detector against this controller and its
    /// delegate chain.
    pub async fn is_stuck(&self) -> bool {
        let guard = self.inner.lock().await;
        guard.is_stuck().await
    }

    /// Cancel the run loop, unsubscribe from the bus and force the
    /// terminal `Stopped` state. Idempotent; cancellation is not an error.
    pub async fn close(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.loop_handle.take() {
            if handle.await.is_err() {
                warn!(controller = %self.id, "run loop task panicked during close");
            }
        }
        self.stream.unsubscribe(&self.id).await;
        let mut guard = self.inner.lock().await;
        guard.transition_to(AgentState::Stopped);
    }
}
