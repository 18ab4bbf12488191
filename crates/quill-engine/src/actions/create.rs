use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;

use crate::dispatch::{ActionContext, ActionHandler};

/// Creates or overwrites a file, or creates a directory when the path ends in
/// `/` or `type="directory"` is given.
pub struct CreateAction;

impl ActionHandler for CreateAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let path = action.required("path")?;
        let is_dir = path.trim_end().ends_with('/')
            || action
                .param("type")
                .is_some_and(|t| t.eq_ignore_ascii_case("directory"));

        if is_dir {
            let created = ctx.store.create_dir(path)?;
            let msg = if created {
                format!("Created directory {path}")
            } else {
                format!("Directory {path} already exists")
            };
            return Ok(ExecutionResult::ok(msg));
        }

        let existed = ctx.store.exists(path);
        let bytes = action.raw_body.len();
        ctx.store.write(path, action.raw_body.as_str())?;
        let verb = if existed { "Overwrote" } else { "Created" };
        Ok(ExecutionResult::ok(format!("{verb} {path} ({bytes} bytes)")))
    }
}
