//! Dispatch ordering for one turn's actions.

use std::cmp::Reverse;

use quill_core::actions::{Action, ActionClass, ActionKind};
use quill_store::vfs::normalize;

fn class_of(action: &Action) -> Option<ActionClass> {
    action.kind().map(ActionKind::class)
}

/// Start line used for sorting; diff-block edits have none and sort as 0.
fn start_line(action: &Action) -> usize {
    action
        .param("start")
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}

/// Reorder into: everything else in emission order, then edits by path
/// ascending and start line descending, then interrupts in emission order.
///
/// Descending lines keep earlier line numbers valid while later edits to the
/// same file are applied. Interrupts never preempt pending mutations.
pub fn order_actions(actions: Vec<Action>) -> Vec<Action> {
    let mut regular = Vec::new();
    let mut edits = Vec::new();
    let mut interrupts = Vec::new();

    for action in actions {
        match class_of(&action) {
            Some(ActionClass::Patch) => edits.push(action),
            Some(ActionClass::Interrupt) => interrupts.push(action),
            _ => regular.push(action),
        }
    }

    edits.sort_by_key(|a| (normalize(a.param("path").unwrap_or_default()), Reverse(start_line(a))));

    regular.extend(edits);
    regular.extend(interrupts);
    regular
}
