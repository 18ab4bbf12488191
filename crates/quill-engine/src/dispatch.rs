use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, debug_span, warn};

use quill_core::actions::{Action, ActionKind, ExecutionResult, Signal};
use quill_core::errors::ActionError;
use quill_core::ids::SessionId;
use quill_store::ContentStore;

use crate::error::EngineError;
use crate::truncate::{truncate_output, MAX_LOG_BYTES};

/// Per-call execution context. The dispatcher itself holds no execution state.
///
/// Handler logs are recorded inside an `action` span carrying `session_id`.
pub struct ActionContext<'a> {
    pub store: &'a mut ContentStore,
    pub session_id: &'a SessionId,
}

pub trait ActionHandler: Send + Sync {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError>;
}

impl<F> ActionHandler for F
where
    F: Fn(&Action, &mut ActionContext<'_>) -> Result<ExecutionResult, ActionError> + Send + Sync,
{
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        self(action, ctx)
    }
}

/// Wrap a closure as a shareable handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn ActionHandler>
where
    F: Fn(&Action, &mut ActionContext<'_>) -> Result<ExecutionResult, ActionError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

struct HandlerEntry {
    handler: Arc<dyn ActionHandler>,
    default_signal: Signal,
}

/// A dispatched result together with the signal it contributes to the turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dispatched {
    pub result: ExecutionResult,
    pub signal: Signal,
}

/// Name → handler table, validated against the closed action catalog.
pub struct ActionDispatcher {
    handlers: HashMap<ActionKind, HandlerEntry>,
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Dispatcher with every built-in handler registered.
    pub fn with_builtins() -> Self {
        let mut dispatcher = Self::new();
        crate::actions::register_builtins(&mut dispatcher);
        dispatcher
    }

    /// Register a handler. Names outside the catalog are rejected.
    pub fn register(
        &mut self,
        name: &str,
        handler: Arc<dyn ActionHandler>,
        default_signal: Signal,
    ) -> Result<(), EngineError> {
        let kind = ActionKind::from_name(name)
            .ok_or_else(|| EngineError::UnknownCatalogEntry(name.to_owned()))?;
        self.register_kind(kind, handler, default_signal);
        Ok(())
    }

    pub(crate) fn register_kind(
        &mut self,
        kind: ActionKind,
        handler: Arc<dyn ActionHandler>,
        default_signal: Signal,
    ) {
        self.handlers.insert(
            kind,
            HandlerEntry {
                handler,
                default_signal,
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        ActionKind::from_name(name).is_some_and(|k| self.handlers.contains_key(&k))
    }

    /// Registered action names, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.handlers.keys().map(|k| k.name()).collect();
        names.sort_unstable();
        names
    }

    pub fn count(&self) -> usize {
        self.handlers.len()
    }

    /// Execute one action. Never fails: unknown actions, handler errors and
    /// handler panics all become error results with `Continue`.
    pub fn execute(&self, action: &Action, ctx: &mut ActionContext<'_>) -> Dispatched {
        let entry = ActionKind::from_name(&action.action_type).and_then(|k| self.handlers.get(&k));
        let Some(entry) = entry else {
            warn!(action = %action.action_type, "unknown action");
            return Dispatched {
                result: ExecutionResult::error(format!(
                    "Unknown action `{}`. Available actions: {}",
                    action.action_type,
                    self.names().join(", ")
                )),
                signal: Signal::Continue,
            };
        };

        let span = debug_span!("action", session_id = %ctx.session_id, action = %action.action_type);
        let _enter = span.enter();
        let outcome = catch_unwind(AssertUnwindSafe(|| entry.handler.execute(action, ctx)));
        match outcome {
            Ok(Ok(mut result)) => {
                let signal = result.signal.unwrap_or(entry.default_signal);
                result.log = truncate_output(&result.log, MAX_LOG_BYTES);
                debug!(action = %action.action_type, %signal, error = result.error, "action executed");
                Dispatched { result, signal }
            }
            Ok(Err(err)) => {
                warn!(action = %action.action_type, error = %err, "action failed");
                Dispatched {
                    result: ExecutionResult::error(format!(
                        "Error executing `{}`: {err}",
                        action.action_type
                    )),
                    signal: Signal::Continue,
                }
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into());
                warn!(action = %action.action_type, panic = %message, "action handler panicked");
                Dispatched {
                    result: ExecutionResult::error(format!(
                        "Error executing `{}`: handler panicked: {message}",
                        action.action_type
                    )),
                    signal: Signal::Continue,
                }
            }
        }
    }
}

impl Default for ActionDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
