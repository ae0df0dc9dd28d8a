//! State manager: walks the ordered states, one cursor per session.

use crate::component::Component;
use crate::error::ControllerError;
use crate::state::apply::PassContext;
use crate::state::controls::apply_state;
use crate::state::{ReconcileResult, State};
use crate::templates::TemplateLoader;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of one reconciliation pass
#[derive(Debug)]
pub struct PassOutcome {
    /// Every state is Ready or Disabled
    pub ready: bool,
    /// State the pass stopped at, when not ready
    pub state: Option<String>,
    /// Error that stopped the pass
    pub error: Option<ControllerError>,
    /// Result of each state walked during the pass
    pub results: Vec<(String, ReconcileResult)>,
}

#[derive(Debug)]
struct Inner {
    states: Vec<State>,
    cursor: usize,
    generation: Option<i64>,
}

/// Owns the ordered states and the reconcile cursor.
///
/// A whole pass holds the async mutex, and so do `add_state` and
/// `remove_state`, so passes never interleave.
pub struct StateManager {
    inner: Mutex<Inner>,
    loader: Option<Arc<dyn TemplateLoader>>,
}

impl std::fmt::Debug for StateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateManager")
            .field("reloads_templates", &self.loader.is_some())
            .finish_non_exhaustive()
    }
}

impl StateManager {
    /// Manager over fixed states
    pub fn new(states: Vec<State>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                states,
                cursor: 0,
                generation: None,
            }),
            loader: None,
        }
    }

    /// Manager over the full state catalogue, reading templates through `loader`.
    ///
    /// Templates are read again every time a state is stepped, so a state
    /// that fails to load now is retried on later passes.
    pub fn from_loader(loader: Arc<dyn TemplateLoader>) -> Self {
        let states = Component::ALL
            .iter()
            .map(|component| match State::load(*component, loader.as_ref()) {
                Ok(state) => state,
                Err(e) => {
                    warn!("Templates of {} not loaded yet: {}", component.state_name(), e);
                    State {
                        name: component.state_name().to_string(),
                        component: *component,
                        steps: Vec::new(),
                    }
                }
            })
            .collect();
        let mut manager = Self::new(states);
        manager.loader = Some(loader);
        manager
    }

    /// Append a state to the end of the walk
    pub async fn add_state(&self, state: State) {
        let mut inner = self.inner.lock().await;
        debug!("Adding state {}", state.name);
        inner.states.push(state);
    }

    /// Remove a state by name. Returns whether it was present.
    ///
    /// Removing a state before the cursor moves the cursor back by one so
    /// it keeps pointing at the same state.
    pub async fn remove_state(&self, name: &str) -> bool {
        let mut inner = self.inner.lock().await;
        let Some(index) = inner.states.iter().position(|s| s.name == name) else {
            return false;
        };
        inner.states.remove(index);
        if index < inner.cursor {
            inner.cursor -= 1;
        }
        debug!("Removed state {}", name);
        true
    }

    /// Index of the current state
    pub async fn cursor(&self) -> usize {
        self.inner.lock().await.cursor
    }

    /// Names of the states in walk order
    pub async fn state_names(&self) -> Vec<String> {
        self.inner.lock().await.states.iter().map(|s| s.name.clone()).collect()
    }

    /// Name of the state at the cursor, `None` once the walk is finished
    pub async fn current_state_name(&self) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.states.get(inner.cursor).map(|s| s.name.clone())
    }

    /// Apply the state at the cursor, advancing on Ready or Disabled.
    ///
    /// An error leaves the cursor where it is.
    pub async fn step(&self, ctx: &PassContext<'_>) -> Result<ReconcileResult, ControllerError> {
        let mut inner = self.inner.lock().await;
        self.step_locked(&mut inner, ctx).await
    }

    async fn step_locked(&self, inner: &mut Inner, ctx: &PassContext<'_>) -> Result<ReconcileResult, ControllerError> {
        let index = inner.cursor;
        if index >= inner.states.len() {
            return Ok(ReconcileResult::Ready);
        }
        if let Some(loader) = &self.loader {
            let component = inner.states[index].component;
            inner.states[index] = State::load(component, loader.as_ref())?;
        }

        let result = apply_state(ctx, &inner.states[index]).await?;
        if result.is_satisfied() {
            inner.cursor += 1;
        }
        Ok(result)
    }

    /// Walk states from the cursor until one is not ready.
    ///
    /// A new policy generation, or a finished walk, restarts from the first
    /// state.
    pub async fn reconcile(&self, ctx: &PassContext<'_>, generation: Option<i64>) -> PassOutcome {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation {
            if inner.generation.is_some() {
                info!("Policy generation changed to {:?}, restarting from the first state", generation);
            }
            inner.generation = generation;
            inner.cursor = 0;
        } else if inner.cursor >= inner.states.len() {
            inner.cursor = 0;
        }

        let mut results = Vec::new();
        while inner.cursor < inner.states.len() {
            let name = inner.states[inner.cursor].name.clone();
            match self.step_locked(&mut inner, ctx).await {
                Ok(result) => {
                    results.push((name.clone(), result));
                    if !result.is_satisfied() {
                        debug!("State {} is not ready", name);
                        return PassOutcome {
                            ready: false,
                            state: Some(name),
                            error: None,
                            results,
                        };
                    }
                }
                Err(e) => {
                    warn!("State {} failed: {}", name, e);
                    results.push((name.clone(), ReconcileResult::NotReady));
                    return PassOutcome {
                        ready: false,
                        state: Some(name),
                        error: Some(e),
                        results,
                    };
                }
            }
        }

        PassOutcome {
            ready: true,
            state: None,
            error: None,
            results,
        }
    }
}
