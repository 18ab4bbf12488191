//! Builds the generation context from the session state.

use quill_core::actions::{ActionClass, ActionKind};
use quill_core::context::GenerationContext;
use quill_store::{ContentStore, HistoryLog};

/// Core system prompt.
pub const CORE_PROMPT: &str = include_str!("../../prompts/core.txt");

/// Maximum file listing entries embedded in the system prompt.
const MAX_LISTED_FILES: usize = 200;

/// Turns session state into a provider payload ("create context").
pub trait ContextBuilder: Send + Sync {
    fn build(&self, store: &ContentStore, history: &HistoryLog) -> GenerationContext;
}

/// System prompt (core rules, action catalog, file listing) plus the full
/// history as messages.
pub struct HistoryContextBuilder {
    prompt: String,
}

impl HistoryContextBuilder {
    pub fn new() -> Self {
        Self {
            prompt: CORE_PROMPT.to_owned(),
        }
    }

    /// Replace the core prompt. The catalog and file listing are still appended.
    pub fn with_prompt(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }

    pub fn system_prompt(&self, store: &ContentStore) -> String {
        let mut out = self.prompt.trim_end().to_owned();

        out.push_str("\n\n## Actions\n");
        for kind in ActionKind::ALL {
            out.push_str("- ");
            out.push_str(kind.usage());
            if kind.class() == ActionClass::Annotation {
                out.push_str("  (note only, never executed)");
            }
            out.push('\n');
        }

        let files = store.list(None);
        out.push_str(&format!(
            "\n## Files ({} of {} bytes used)\n",
            store.total_bytes(),
            store.quota_bytes()
        ));
        if files.is_empty() {
            out.push_str("(empty)\n");
        }
        for path in files.iter().take(MAX_LISTED_FILES) {
            out.push_str(path);
            out.push('\n');
        }
        if files.len() > MAX_LISTED_FILES {
            out.push_str(&format!(
                "... and {} more (use <list/> to see everything)\n",
                files.len() - MAX_LISTED_FILES
            ));
        }
        out
    }
}

impl Default for HistoryContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextBuilder for HistoryContextBuilder {
    fn build(&self, store: &ContentStore, history: &HistoryLog) -> GenerationContext {
        GenerationContext::from_turns(self.system_prompt(store), history.get())
    }
}
