use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;

use crate::dispatch::{ActionContext, ActionHandler};

/// Rename a file or a whole directory.
pub struct MoveAction;

/// Duplicate a single file.
pub struct CopyAction;

impl ActionHandler for MoveAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let from = action.required("from")?;
        let to = action.required("to")?;
        let moved = ctx.store.rename(from, to)?;
        let log = if moved == 1 {
            format!("Moved {from} to {to}")
        } else {
            format!("Moved {from} to {to} ({moved} entries)")
        };
        Ok(ExecutionResult::ok(log))
    }
}

impl ActionHandler for CopyAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let from = action.required("from")?;
        let to = action.required("to")?;
        ctx.store.copy(from, to)?;
        Ok(ExecutionResult::ok(format!("Copied {from} to {to}")))
    }
}
