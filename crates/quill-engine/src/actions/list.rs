use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;
use quill_store::EntryKind;

use crate::dispatch::{ActionContext, ActionHandler};

pub struct ListAction;

impl ActionHandler for ListAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let prefix = action.param("path").map(str::trim).filter(|p| !p.is_empty() && *p != "/");
        let scope = prefix.unwrap_or("/");

        let lines: Vec<String> = if action.flag("meta") {
            ctx.store
                .list_with_metadata(prefix)
                .into_iter()
                .map(|info| match info.kind {
                    EntryKind::Directory => format!("{}/\t(dir)", info.path),
                    EntryKind::File => format!(
                        "{}\t{} bytes\tmodified {}",
                        info.path,
                        info.size,
                        info.updated_at.to_rfc3339()
                    ),
                })
                .collect()
        } else {
            ctx.store.list(prefix)
        };

        if lines.is_empty() {
            return Ok(ExecutionResult::ok(format!("No entries under {scope}"))
                .with_ui(format!("Listed {scope} (empty)")));
        }
        let count = lines.len();
        Ok(ExecutionResult::ok(lines.join("\n")).with_ui(format!("Listed {scope} ({count} entries)")))
    }
}
