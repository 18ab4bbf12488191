//! Action parser: free text with embedded XML-like tags → ordered actions.
//!
//! Pipeline: protect verbatim spans, tokenize and build a tree, restore the
//! protected spans, extract catalog tags as actions, escape diff-block
//! replacements, then apply the dispatch ordering. Parsing never fails.

pub mod diff;
pub mod order;
mod protect;
mod scan;
pub mod tree;

use quill_core::actions::{Action, ActionKind};

pub use order::order_actions;
pub use tree::{NodeContent, ParseNode};

/// Build the restored parse tree for `text`.
pub fn parse_tree(text: &str) -> ParseNode {
    let protected = protect::protect(text);
    let mut root = tree::build(&protected.text);
    if !protected.is_empty() {
        root.restore(&protected);
    }
    root
}

/// Parse `text` into actions in dispatch order.
pub fn parse(text: &str) -> Vec<Action> {
    let root = parse_tree(text);
    let mut actions = Vec::new();
    collect(&root, &mut actions);
    order_actions(actions)
}

fn strip_leading_newline(body: &str) -> &str {
    body.strip_prefix("\r\n")
        .or_else(|| body.strip_prefix('\n'))
        .unwrap_or(body)
}

fn to_action(kind: ActionKind, node: &ParseNode) -> Action {
    let text = node.text();
    let mut body = strip_leading_newline(&text).to_owned();
    let line_mode = node.attributes.contains_key("mode");
    if kind == ActionKind::Edit && !line_mode && diff::has_blocks(&body) {
        body = diff::escape_replacements(&body);
    }
    Action {
        action_type: kind.name().to_owned(),
        params: node.attributes.clone(),
        raw_body: body,
    }
}

/// Depth-first, document order. Unknown tags are transparent containers.
fn collect(node: &ParseNode, out: &mut Vec<Action>) {
    for child in node.children() {
        if let Some(kind) = ActionKind::from_name(&child.tag) {
            out.push(to_action(kind, child));
        }
        collect(child, out);
    }
}
