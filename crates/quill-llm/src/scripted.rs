use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{stream, StreamExt};
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::debug;

use quill_core::context::GenerationContext;
use quill_core::errors::GatewayError;
use quill_core::provider::{ChunkStream, CognitiveProvider};

/// Pre-programmed responses for deterministic runs without a real model.
#[derive(Clone, Debug)]
pub enum ScriptedResponse {
    /// Yield the text as a single chunk.
    Text(String),
    /// Yield each chunk in order.
    Chunks(Vec<String>),
    /// Fail the `generate` call itself.
    Error(GatewayError),
    /// Yield the chunks, then fail mid-stream.
    Interrupted(Vec<String>, GatewayError),
    /// Wait, then resolve the inner response.
    Delay(Duration, Box<ScriptedResponse>),
    /// Yield the chunks, then hang without ending.
    Stall(Vec<String>),
    /// Never produce anything. Only cancellation ends it.
    Hang,
}

impl ScriptedResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    pub fn chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Chunks(chunks.into_iter().map(Into::into).collect())
    }

    pub fn delayed(delay: Duration, inner: ScriptedResponse) -> Self {
        Self::Delay(delay, Box::new(inner))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TranscriptError {
    #[error("failed to read transcript: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid transcript: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptEntry {
    Text(String),
    Chunks {
        chunks: Vec<String>,
    },
    Error {
        error: String,
    },
    Delayed {
        #[serde(rename = "delayMs")]
        delay_ms: u64,
        text: String,
    },
}

impl From<TranscriptEntry> for ScriptedResponse {
    fn from(entry: TranscriptEntry) -> Self {
        match entry {
            TranscriptEntry::Text(t) => Self::Text(t),
            TranscriptEntry::Chunks { chunks } => Self::Chunks(chunks),
            TranscriptEntry::Error { error } => Self::Error(GatewayError::NetworkError(error)),
            TranscriptEntry::Delayed { delay_ms, text } => {
                Self::delayed(Duration::from_millis(delay_ms), Self::Text(text))
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Transcript {
    Bare(Vec<TranscriptEntry>),
    Wrapped { responses: Vec<TranscriptEntry> },
}

/// Provider that plays back responses in order and records every context it
/// was asked to continue. Runs out with [`GatewayError::Exhausted`].
pub struct ScriptedProvider {
    name: String,
    responses: Mutex<VecDeque<ScriptedResponse>>,
    contexts: Mutex<Vec<GenerationContext>>,
    call_count: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            name: "scripted".into(),
            responses: Mutex::new(responses.into()),
            contexts: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    /// One plain-text response per item.
    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(ScriptedResponse::text).collect())
    }

    /// Parse a JSON transcript: either an array of entries or
    /// `{"responses": [...]}`. An entry is a string, `{"chunks": [...]}`,
    /// `{"error": "..."}` or `{"delayMs": n, "text": "..."}`.
    pub fn from_transcript(json: &str) -> Result<Self, TranscriptError> {
        let entries = match serde_json::from_str::<Transcript>(json)? {
            Transcript::Bare(entries) | Transcript::Wrapped { responses: entries } => entries,
        };
        Ok(Self::new(entries.into_iter().map(Into::into).collect()).with_name("replay"))
    }

    pub fn from_transcript_file(path: &Path) -> Result<Self, TranscriptError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_transcript(&json)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn push(&self, response: ScriptedResponse) {
        self.responses.lock().push_back(response);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().len()
    }

    /// Every context passed to `generate`, in call order.
    pub fn contexts(&self) -> Vec<GenerationContext> {
        self.contexts.lock().clone()
    }
}

fn chunk_stream(chunks: Vec<String>, tail: Option<GatewayError>) -> ChunkStream {
    let items = chunks
        .into_iter()
        .map(Ok)
        .chain(tail.map(Err))
        .collect::<Vec<_>>();
    Box::pin(stream::iter(items))
}

#[async_trait]
impl CognitiveProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, context: &GenerationContext) -> Result<ChunkStream, GatewayError> {
        let call = self.call_count.fetch_add(1, Ordering::Relaxed) + 1;
        self.contexts.lock().push(context.clone());
        let next = self.responses.lock().pop_front();
        let Some(mut current) = next else {
            return Err(GatewayError::Exhausted(call - 1));
        };
        debug!(provider = %self.name, call, "scripted response");

        // Nested delays are unrolled iteratively.
        loop {
            match current {
                ScriptedResponse::Text(text) => return Ok(chunk_stream(vec![text], None)),
                ScriptedResponse::Chunks(chunks) => return Ok(chunk_stream(chunks, None)),
                ScriptedResponse::Error(e) => return Err(e),
                ScriptedResponse::Interrupted(chunks, e) => return Ok(chunk_stream(chunks, Some(e))),
                ScriptedResponse::Stall(chunks) => {
                    let head = stream::iter(chunks.into_iter().map(Ok::<String, GatewayError>));
                    return Ok(Box::pin(head.chain(stream::pending())));
                }
                ScriptedResponse::Hang => return Ok(Box::pin(stream::pending::<Result<String, GatewayError>>())),
                ScriptedResponse::Delay(duration, inner) => {
                    tokio::time::sleep(duration).await;
                    current = *inner;
                }
            }
        }
    }
}
