//! Cognitive providers that need no network: scripted playback for tests and
//! transcript replay, plus a retrying wrapper for any provider.

pub mod retry;
pub mod scripted;

pub use retry::{RetryConfig, RetryingProvider};
pub use scripted::{ScriptedProvider, ScriptedResponse, TranscriptError};
