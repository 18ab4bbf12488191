use serde::{Deserialize, Serialize};

use crate::actions::{ExecutionResult, Signal};
use crate::ids::{SessionId, TurnId};
use crate::turns::Role;

/// Handle returned by [`Observers::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Listener<E> = Box<dyn Fn(&E) + Send + Sync>;

/// Ordered list of synchronous listeners. Listeners run in subscription order,
/// after the mutation that produced the event has been applied.
pub struct Observers<E> {
    next_id: u64,
    listeners: Vec<(ObserverId, Listener<E>)>,
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: impl Fn(&E) + Send + Sync + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn notify(&self, event: &E) {
        for (_, listener) in &self.listeners {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for Observers<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Content store mutations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    Created { path: String },
    Modified { path: String },
    Deleted { path: String },
    /// Bulk prefix delete; `removed` lists every key that went away.
    DirectoryDeleted { path: String, removed: Vec<String> },
    Renamed { from: String, to: String },
    Copied { from: String, to: String },
    /// Whole store replaced from a snapshot.
    Loaded { files: usize },
}

/// History log mutations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    Appended { id: TurnId, role: Role },
    Deleted { id: TurnId },
    Loaded { turns: usize },
    Cleared,
}

/// Control loop lifecycle events, broadcast to any number of receivers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    IterationStart {
        session_id: SessionId,
        iteration: u32,
    },
    Chunk {
        session_id: SessionId,
        delta: String,
    },
    ModelTurn {
        session_id: SessionId,
        turn_id: TurnId,
        actions: usize,
    },
    ActionExecuted {
        session_id: SessionId,
        action: String,
        result: ExecutionResult,
        signal: Signal,
    },
    TurnComplete {
        session_id: SessionId,
        iteration: u32,
        signal: Signal,
    },
    Stopped {
        session_id: SessionId,
        iterations: u32,
        signal: Signal,
        reason: String,
    },
}

impl LoopEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::IterationStart { session_id, .. }
            | Self::Chunk { session_id, .. }
            | Self::ModelTurn { session_id, .. }
            | Self::ActionExecuted { session_id, .. }
            | Self::TurnComplete { session_id, .. }
            | Self::Stopped { session_id, .. } => session_id,
        }
    }
}
