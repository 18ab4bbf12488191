use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use quill_core::actions::{Action, ActionClass, ExecutionResult, Signal};
use quill_core::context::GenerationContext;
use quill_core::errors::GatewayError;
use quill_core::events::LoopEvent;
use quill_core::ids::SessionId;
use quill_core::provider::CognitiveProvider;
use quill_core::turns::Role;

use crate::context::{ContextBuilder, HistoryContextBuilder};
use crate::dispatch::{ActionContext, ActionDispatcher};
use crate::error::EngineError;
use crate::parser;
use crate::session::Session;

pub const DEFAULT_MAX_ITERATIONS: u32 = 20;
pub const DEFAULT_TURN_DELAY: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 1024;

/// Appended when the model stops acting right after a failed turn.
pub const RETRY_NOTICE: &str = "Your previous actions produced errors and this reply contained no actions. \
Review the errors above and retry with corrected actions, or use <ask> if you need help.";

/// Appended when a turn both failed and tried to finish.
pub const COMPLETION_REJECTED: &str = "Completion rejected: one or more actions in this turn failed. \
Fix the errors before finishing.";

/// Appended when a turn both asked for input and tried to finish.
pub const FINISH_DEFERRED: &str = "Finish deferred: this turn also asked a question. \
Waiting for the user's answer before completing.";

#[derive(Clone, Debug)]
pub struct LoopConfig {
    pub max_iterations: u32,
    /// Pause between turns that continue.
    pub turn_delay: Duration,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            turn_delay: DEFAULT_TURN_DELAY,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A `finish` action terminated the loop.
    Completed,
    /// An `ask` action paused for input.
    AwaitingInput,
    /// The model replied without actions.
    NaturalEnd,
    IterationLimit,
    Cancelled,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::AwaitingInput => "awaiting_input",
            Self::NaturalEnd => "natural_end",
            Self::IterationLimit => "iteration_limit",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoopOutcome {
    pub signal: Signal,
    pub iterations: u32,
    pub stop: StopReason,
}

/// One dispatched action within a turn.
#[derive(Clone, Debug)]
pub struct ActionRecord {
    pub action: Action,
    pub result: ExecutionResult,
    pub signal: Signal,
}

/// Combine a turn's signals. A turn that failed never terminates, and a
/// pending question wins over termination.
pub fn resolve_signal(records: &[ActionRecord]) -> (Signal, Option<&'static str>) {
    let dominant = Signal::dominant(records.iter().map(|r| r.signal));
    if dominant != Signal::Terminate {
        return (dominant, None);
    }
    if records.iter().any(|r| r.result.error) {
        return (Signal::Continue, Some(COMPLETION_REJECTED));
    }
    if records.iter().any(|r| r.signal == Signal::Halt) {
        return (Signal::Halt, Some(FINISH_DEFERRED));
    }
    (Signal::Terminate, None)
}

fn target_of(action: &Action) -> String {
    match (action.param("path"), action.param("from"), action.param("to")) {
        (Some(path), _, _) => format!(" {path}"),
        (None, Some(from), Some(to)) => format!(" {from} -> {to}"),
        _ => match action.param("pattern") {
            Some(p) => format!(" `{p}`"),
            None => String::new(),
        },
    }
}

/// Text of the system turn that carries a turn's results back to the model.
pub fn render_results(records: &[ActionRecord], note: Option<&str>) -> String {
    let mut out = String::new();
    for record in records {
        let status = if record.result.error { "error" } else { "ok" };
        out.push_str(&format!(
            "[{}{}] {status}\n{}\n\n",
            record.action.action_type,
            target_of(&record.action),
            record.result.log.trim_end()
        ));
    }
    if let Some(note) = note {
        out.push_str(&format!("[loop] {note}\n"));
    }
    out.trim_end().to_owned()
}

fn is_annotation(action: &Action) -> bool {
    action.kind().map(|k| k.class()) == Some(ActionClass::Annotation)
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives generate → parse → dispatch → record until a turn stops the loop.
///
/// Only one run may be in flight per instance; a second `run`/`start` while
/// running fails with [`EngineError::AlreadyRunning`] instead of queueing.
pub struct ControlLoop {
    provider: Arc<dyn CognitiveProvider>,
    dispatcher: Arc<ActionDispatcher>,
    context: Arc<dyn ContextBuilder>,
    config: LoopConfig,
    running: AtomicBool,
    event_tx: broadcast::Sender<LoopEvent>,
}

impl ControlLoop {
    pub fn new(
        provider: Arc<dyn CognitiveProvider>,
        dispatcher: Arc<ActionDispatcher>,
        config: LoopConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            provider,
            dispatcher,
            context: Arc::new(HistoryContextBuilder::new()),
            config,
            running: AtomicBool::new(false),
            event_tx,
        }
    }

    pub fn with_context_builder(mut self, builder: Arc<dyn ContextBuilder>) -> Self {
        self.context = builder;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoopEvent> {
        self.event_tx.subscribe()
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        if self.running.load(Ordering::Acquire) {
            LoopState::Running
        } else {
            LoopState::Idle
        }
    }

    fn acquire(&self) -> Result<RunningGuard<'_>, EngineError> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::AlreadyRunning)?;
        Ok(RunningGuard(&self.running))
    }

    fn emit(&self, event: LoopEvent) {
        if self.event_tx.send(event).is_err() {
            trace!("no loop event receivers");
        }
    }

    /// Append `prompt` as a user turn and run.
    pub async fn start(
        &self,
        session: &mut Session,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, EngineError> {
        let _guard = self.acquire()?;
        session
            .history_mut()
            .append(Role::User, prompt, Value::Null);
        self.drive(session, cancel).await
    }

    /// Run from the current history.
    pub async fn run(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, EngineError> {
        let _guard = self.acquire()?;
        self.drive(session, cancel).await
    }

    /// Loop boundary: infrastructure failures become a system turn and stop the run.
    #[instrument(skip_all, fields(session_id = %session.id()))]
    async fn drive(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, EngineError> {
        let session_id = session.id().clone();
        let mut iterations = 0u32;
        match self.iterate(session, cancel, &mut iterations).await {
            Ok(outcome) => {
                if let Err(e) = session.save() {
                    warn!(error = %e, "failed to save session after run");
                }
                info!(
                    iterations = outcome.iterations,
                    signal = %outcome.signal,
                    stop = %outcome.stop,
                    "loop stopped"
                );
                self.emit(LoopEvent::Stopped {
                    session_id,
                    iterations: outcome.iterations,
                    signal: outcome.signal,
                    reason: outcome.stop.to_string(),
                });
                Ok(outcome)
            }
            Err(err) => {
                error!(iterations, error = %err, error_kind = err.error_kind(), "critical error, loop stopped");
                session.history_mut().append(
                    Role::System,
                    format!("Critical error: {err}. The loop has stopped."),
                    json!({ "critical": true, "errorKind": err.error_kind() }),
                );
                if let Err(e) = session.save() {
                    warn!(error = %e, "failed to save session after critical error");
                }
                self.emit(LoopEvent::Stopped {
                    session_id,
                    iterations,
                    signal: Signal::Halt,
                    reason: format!("error: {}", err.error_kind()),
                });
                Err(err)
            }
        }
    }

    async fn iterate(
        &self,
        session: &mut Session,
        cancel: &CancellationToken,
        iterations: &mut u32,
    ) -> Result<LoopOutcome, EngineError> {
        let session_id = session.id().clone();
        let mut previous_error = false;

        loop {
            if cancel.is_cancelled() {
                return Ok(cancelled(*iterations));
            }
            if *iterations >= self.config.max_iterations {
                let max = self.config.max_iterations;
                warn!(max_iterations = max, "iteration limit reached, halting");
                session.history_mut().append(
                    Role::System,
                    format!("Iteration limit of {max} reached. Pausing for user input."),
                    json!({ "notice": "iteration_limit" }),
                );
                return Ok(LoopOutcome {
                    signal: Signal::Halt,
                    iterations: *iterations,
                    stop: StopReason::IterationLimit,
                });
            }
            *iterations += 1;
            let iteration = *iterations;
            self.emit(LoopEvent::IterationStart {
                session_id: session_id.clone(),
                iteration,
            });

            let context = self.context.build(session.store(), session.history());
            let Some(text) = self.generate(&context, &session_id, cancel).await? else {
                info!(iteration, "generation cancelled, nothing committed");
                return Ok(cancelled(iteration));
            };

            let actions: Vec<Action> = parser::parse(&text)
                .into_iter()
                .filter(|a| !is_annotation(a))
                .collect();
            let model_turn = session.history_mut().append(
                Role::Model,
                text,
                json!({ "iteration": iteration, "actions": actions.len() }),
            );
            debug!(iteration, actions = actions.len(), "model turn committed");
            self.emit(LoopEvent::ModelTurn {
                session_id: session_id.clone(),
                turn_id: model_turn.id,
                actions: actions.len(),
            });

            if actions.is_empty() {
                if !previous_error {
                    debug!(iteration, "no actions, natural end");
                    self.finish_turn(session, iteration, Signal::Halt)?;
                    return Ok(LoopOutcome {
                        signal: Signal::Halt,
                        iterations: iteration,
                        stop: StopReason::NaturalEnd,
                    });
                }
                warn!(iteration, "no actions after a failed turn, forcing retry");
                session.history_mut().append(
                    Role::System,
                    RETRY_NOTICE,
                    json!({ "iteration": iteration, "notice": "retry" }),
                );
                previous_error = false;
                self.finish_turn(session, iteration, Signal::Continue)?;
                if !self.pause(cancel).await {
                    return Ok(cancelled(iteration));
                }
                continue;
            }

            let records = self.dispatch_turn(session, &actions);
            let (signal, note) = resolve_signal(&records);
            if let Some(note) = note {
                warn!(iteration, %signal, note, "turn signal overridden");
            }
            debug!(iteration, %signal, "turn signal");

            let mut results: Vec<ExecutionResult> = records.iter().map(|r| r.result.clone()).collect();
            if let Some(note) = note {
                results.push(ExecutionResult::ok(note).with_signal(signal));
            }
            session.history_mut().append(
                Role::System,
                render_results(&records, note),
                json!({
                    "iteration": iteration,
                    "signal": signal,
                    "results": results,
                    "override": note,
                }),
            );
            previous_error = records.iter().any(|r| r.result.error);
            self.finish_turn(session, iteration, signal)?;

            match signal {
                Signal::Continue => {
                    if !self.pause(cancel).await {
                        return Ok(cancelled(iteration));
                    }
                }
                Signal::Halt => {
                    return Ok(LoopOutcome {
                        signal,
                        iterations: iteration,
                        stop: StopReason::AwaitingInput,
                    })
                }
                Signal::Terminate => {
                    return Ok(LoopOutcome {
                        signal,
                        iterations: iteration,
                        stop: StopReason::Completed,
                    })
                }
            }
        }
    }

    /// Stream one generation. `None` means cancelled; partial text is dropped.
    async fn generate(
        &self,
        context: &GenerationContext,
        session_id: &SessionId,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, EngineError> {
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            opened = self.provider.generate(context) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(GatewayError::Cancelled) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut text = String::new();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(delta)) => {
                    text.push_str(&delta);
                    self.emit(LoopEvent::Chunk {
                        session_id: session_id.clone(),
                        delta,
                    });
                }
                Some(Err(GatewayError::Cancelled)) => return Ok(None),
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
        debug!(provider = self.provider.name(), bytes = text.len(), "generation complete");
        Ok(Some(text))
    }

    /// Execute actions strictly in order; later actions see earlier mutations.
    fn dispatch_turn(&self, session: &mut Session, actions: &[Action]) -> Vec<ActionRecord> {
        let (session_id, store, _) = session.parts_mut();
        let mut records = Vec::with_capacity(actions.len());
        for action in actions {
            let mut ctx = ActionContext {
                store: &mut *store,
                session_id,
            };
            let dispatched = self.dispatcher.execute(action, &mut ctx);
            debug!(
                action = %action.action_type,
                signal = %dispatched.signal,
                error = dispatched.result.error,
                "action dispatched"
            );
            self.emit(LoopEvent::ActionExecuted {
                session_id: session_id.clone(),
                action: action.action_type.clone(),
                result: dispatched.result.clone(),
                signal: dispatched.signal,
            });
            records.push(ActionRecord {
                action: action.clone(),
                result: dispatched.result,
                signal: dispatched.signal,
            });
        }
        records
    }

    fn finish_turn(&self, session: &Session, iteration: u32, signal: Signal) -> Result<(), EngineError> {
        self.emit(LoopEvent::TurnComplete {
            session_id: session.id().clone(),
            iteration,
            signal,
        });
        session.save()?;
        Ok(())
    }

    /// Inter-turn delay. False if cancelled while waiting.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        if self.config.turn_delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.config.turn_delay) => true,
        }
    }
}

fn cancelled(iterations: u32) -> LoopOutcome {
    LoopOutcome {
        signal: Signal::Halt,
        iterations,
        stop: StopReason::Cancelled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_llm::{ScriptedProvider, ScriptedResponse};

    fn record(action: &str, signal: Signal, error: bool) -> ActionRecord {
        let result = if error {
            ExecutionResult::error("failed")
        } else {
            ExecutionResult::ok("done")
        };
        ActionRecord {
            action: Action::new(action),
            result,
            signal,
        }
    }

    fn quick() -> LoopConfig {
        LoopConfig {
            max_iterations: 5,
            turn_delay: Duration::ZERO,
        }
    }

    fn control_loop(responses: Vec<ScriptedResponse>, config: LoopConfig) -> ControlLoop {
        ControlLoop::new(
            Arc::new(ScriptedProvider::new(responses)),
            Arc::new(ActionDispatcher::with_builtins()),
            config,
        )
    }

    #[test]
    fn signal_resolution() {
        assert_eq!(resolve_signal(&[]), (Signal::Continue, None));
        assert_eq!(
            resolve_signal(&[record("read", Signal::Continue, false), record("ask", Signal::Halt, false)]),
            (Signal::Halt, None)
        );
        assert_eq!(
            resolve_signal(&[record("finish", Signal::Terminate, false)]),
            (Signal::Terminate, None)
        );
        assert_eq!(
            resolve_signal(&[record("edit", Signal::Continue, true), record("finish", Signal::Terminate, false)]),
            (Signal::Continue, Some(COMPLETION_REJECTED))
        );
        assert_eq!(
            resolve_signal(&[record("ask", Signal::Halt, false), record("finish", Signal::Terminate, false)]),
            (Signal::Halt, Some(FINISH_DEFERRED))
        );
    }

    #[test]
    fn results_render_with_targets() {
        let mut read = record("read", Signal::Continue, false);
        read.action = Action::new("read").with_param("path", "a.txt");
        let mut mv = record("move", Signal::Continue, true);
        mv.action = Action::new("move").with_param("from", "a").with_param("to", "b");
        let text = render_results(&[read, mv], Some("note"));
        assert_eq!(text, "[read a.txt] ok\ndone\n\n[move a -> b] error\nfailed\n\n[loop] note");
    }

    #[tokio::test]
    async fn finish_completes() {
        let lp = control_loop(vec![ScriptedResponse::text("<finish>done</finish>")], quick());
        let mut session = Session::new(1024);
        let outcome = lp.start(&mut session, "go", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stop, StopReason::Completed);
        assert_eq!(outcome.signal, Signal::Terminate);
        assert_eq!(lp.state(), LoopState::Idle);
        let roles: Vec<Role> = session.history().get().iter().map(|t| t.role).collect();
        assert_eq!(roles, [Role::User, Role::Model, Role::System]);
    }

    #[tokio::test]
    async fn annotations_alone_end_the_conversation() {
        let lp = control_loop(vec![ScriptedResponse::text("<thinking>hmm</thinking>")], quick());
        let mut session = Session::new(1024);
        let outcome = lp.start(&mut session, "go", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.stop, StopReason::NaturalEnd);
    }

    #[tokio::test]
    async fn iteration_limit_halts() {
        let responses = (0..10)
            .map(|i| ScriptedResponse::text(format!("<report>step {i}</report>")))
            .collect();
        let lp = control_loop(responses, LoopConfig { max_iterations: 3, turn_delay: Duration::ZERO });
        let mut session = Session::new(1024);
        let outcome = lp.start(&mut session, "go", &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, LoopOutcome { signal: Signal::Halt, iterations: 3, stop: StopReason::IterationLimit });
        let last = session.history().last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.text().contains("Iteration limit of 3"));
    }

    #[tokio::test]
    async fn gateway_failure_is_critical() {
        let lp = control_loop(
            vec![ScriptedResponse::Error(GatewayError::NetworkError("reset".into()))],
            quick(),
        );
        let mut session = Session::new(1024);
        let err = lp.start(&mut session, "go", &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, EngineError::Gateway(GatewayError::NetworkError(_))));
        let last = session.history().last().unwrap();
        assert_eq!(last.role, Role::System);
        assert!(last.text().starts_with("Critical error"));
        assert_eq!(lp.state(), LoopState::Idle);
    }

    #[tokio::test]
    async fn second_run_rejected_while_running() {
        let lp = Arc::new(control_loop(vec![ScriptedResponse::Hang], quick()));
        let cancel = CancellationToken::new();
        let task = {
            let lp = lp.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut session = Session::new(1024);
                lp.start(&mut session, "go", &cancel).await
            })
        };
        while lp.state() != LoopState::Running {
            tokio::task::yield_now().await;
        }

        let mut other = Session::new(1024);
        let err = lp.start(&mut other, "again", &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyRunning));
        assert!(other.history().is_empty(), "rejected start must not append");

        cancel.cancel();
        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.stop, StopReason::Cancelled);
        assert_eq!(lp.state(), LoopState::Idle);
    }
}
