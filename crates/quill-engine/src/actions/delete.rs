use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;
use quill_store::DeleteOutcome;

use crate::dispatch::{ActionContext, ActionHandler};

pub struct DeleteAction;

impl ActionHandler for DeleteAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let path = action.required("path")?;
        let result = match ctx.store.delete(path)? {
            DeleteOutcome::File => ExecutionResult::ok(format!("Deleted {path}")),
            DeleteOutcome::Directory { removed } => ExecutionResult::ok(format!(
                "Deleted directory {path} ({removed} entries)"
            )),
            DeleteOutcome::NotFound => {
                ExecutionResult::ok(format!("Nothing to delete at {path}"))
            }
        };
        Ok(result)
    }
}
