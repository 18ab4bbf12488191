use std::fmt::Write as _;

use quill_core::actions::{Action, ExecutionResult};
use quill_core::errors::ActionError;
use quill_store::vfs::describe_binary;

use crate::dispatch::{ActionContext, ActionHandler};

const MAX_LINE_CHARS: usize = 2000;

pub struct ReadAction;

impl ActionHandler for ReadAction {
    fn execute(
        &self,
        action: &Action,
        ctx: &mut ActionContext<'_>,
    ) -> Result<ExecutionResult, ActionError> {
        let path = action.required("path")?;
        let entry = ctx.store.read(path)?;

        if let Some(bin) = describe_binary(&entry.content) {
            let log = format!(
                "{} is binary ({}, {} bytes); content not shown",
                entry.path, bin.mime_type, bin.bytes
            );
            return Ok(ExecutionResult::ok(log));
        }

        let mut output = format!("Contents of {}:\n", entry.path);
        let mut lines = 0;
        for (i, line) in entry.content.lines().enumerate() {
            let shown = match line.char_indices().nth(MAX_LINE_CHARS) {
                Some((cut, _)) => &line[..cut],
                None => line,
            };
            let _ = writeln!(output, "{:>6}\t{}", i + 1, shown);
            lines += 1;
        }
        if lines == 0 {
            output.push_str("(empty file)");
        }

        Ok(ExecutionResult::ok(output).with_ui(format!("Read {} ({lines} lines)", entry.path)))
    }
}
