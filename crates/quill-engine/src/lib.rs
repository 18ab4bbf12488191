//! Parsing, dispatch and the control loop.

pub mod actions;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod parser;
pub mod runner;
pub mod session;
pub mod truncate;

pub use context::{ContextBuilder, HistoryContextBuilder};
pub use dispatch::{handler_fn, ActionContext, ActionDispatcher, ActionHandler, Dispatched};
pub use error::EngineError;
pub use runner::{ControlLoop, LoopConfig, LoopOutcome, LoopState, StopReason};
pub use session::Session;
