use regex::RegexBuilder;

use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;
use quill_store::vfs::{describe_binary, normalize, DIR_SENTINEL};

use crate::dispatch::{ActionContext, ActionHandler};

/// Maximum matching lines reported per search.
pub const MAX_MATCHES: usize = 200;
const MAX_LINE_CHARS: usize = 300;

/// Line search across stored text files. Literal by default, case-sensitive.
pub struct SearchAction;

impl ActionHandler for SearchAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let pattern = action.required("pattern")?;
        let source = if action.flag("regex") {
            pattern.to_owned()
        } else {
            regex::escape(pattern)
        };
        let re = RegexBuilder::new(&source)
            .size_limit(1 << 20)
            .build()
            .map_err(|e| ActionError::InvalidArguments(format!("invalid pattern: {e}")))?;

        let scope = action.param("path").map(normalize).unwrap_or_default();
        let dir_prefix = format!("{scope}/");

        let mut hits = Vec::new();
        let mut total = 0usize;
        for entry in ctx.store.snapshot() {
            let in_scope = scope.is_empty() || entry.path == scope || entry.path.starts_with(&dir_prefix);
            let is_sentinel = entry.path == DIR_SENTINEL || entry.path.ends_with(&format!("/{DIR_SENTINEL}"));
            if !in_scope || is_sentinel || describe_binary(&entry.content).is_some() {
                continue;
            }
            for (i, line) in entry.content.lines().enumerate() {
                if !re.is_match(line) {
                    continue;
                }
                total += 1;
                if hits.len() < MAX_MATCHES {
                    let shown: String = line.chars().take(MAX_LINE_CHARS).collect();
                    hits.push(format!("{}:{}: {}", entry.path, i + 1, shown.trim_end()));
                }
            }
        }

        if hits.is_empty() {
            return Ok(ExecutionResult::ok(format!("No matches for `{pattern}`")));
        }
        let mut log = hits.join("\n");
        if total > hits.len() {
            log.push_str(&format!("\n... {} more matches not shown", total - hits.len()));
        }
        Ok(ExecutionResult::ok(log).with_ui(format!("Found {total} matches for `{pattern}`")))
    }
}
