//! Loop-control actions. Their signals come from the registered defaults.

use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;

use crate::dispatch::{ActionContext, ActionHandler};

fn body(action: &Action) -> &str {
    action.raw_body.trim()
}

/// Progress message; the loop carries on.
pub struct ReportAction;

/// Question for the user; pauses the loop.
pub struct AskAction;

/// Completion summary; ends the loop.
pub struct FinishAction;

impl ActionHandler for ReportAction {
    fn execute(&self, action: &Action, _: &mut ActionContext<'_>) -> Result<ExecutionResult, ActionError> {
        Ok(ExecutionResult::ok(format!("Reported: {}", body(action))).with_ui(body(action)))
    }
}

impl ActionHandler for AskAction {
    fn execute(&self, action: &Action, _: &mut ActionContext<'_>) -> Result<ExecutionResult, ActionError> {
        let question = body(action);
        if question.is_empty() {
            return Err(ActionError::InvalidArguments("ask needs a question in its body".into()));
        }
        Ok(ExecutionResult::ok(format!("Waiting for user input: {question}")).with_ui(question))
    }
}

impl ActionHandler for FinishAction {
    fn execute(&self, action: &Action, _: &mut ActionContext<'_>) -> Result<ExecutionResult, ActionError> {
        let summary = match body(action) {
            "" => "Task complete.",
            s => s,
        };
        Ok(ExecutionResult::ok(format!("Finished: {summary}")).with_ui(summary))
    }
}
