//! Stack-based tree builder.

use std::collections::BTreeMap;

use quill_core::actions::ActionKind;

use super::protect::Protected;
use super::scan::{Scanner, Token};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeContent {
    Text(String),
    Node(ParseNode),
}

/// Transient parse-tree node. The root has an empty tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub content: Vec<NodeContent>,
}

impl ParseNode {
    fn new(tag: String, attributes: BTreeMap<String, String>) -> Self {
        Self {
            tag,
            attributes,
            content: Vec::new(),
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(NodeContent::Text(last)) = self.content.last_mut() {
            last.push_str(text);
        } else {
            self.content.push(NodeContent::Text(text.to_owned()));
        }
    }

    /// Concatenated text of this node and its descendants.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for item in &self.content {
            match item {
                NodeContent::Text(t) => out.push_str(t),
                NodeContent::Node(n) => n.collect_text(out),
            }
        }
    }

    pub fn children(&self) -> impl Iterator<Item = &ParseNode> {
        self.content.iter().filter_map(|c| match c {
            NodeContent::Node(n) => Some(n),
            NodeContent::Text(_) => None,
        })
    }

    /// Replace placeholders in every text fragment and attribute value.
    pub(crate) fn restore(&mut self, table: &Protected) {
        for value in self.attributes.values_mut() {
            *value = table.restore(value);
        }
        for item in &mut self.content {
            match item {
                NodeContent::Text(t) => *t = table.restore(t),
                NodeContent::Node(n) => n.restore(table),
            }
        }
    }
}

fn is_opaque(tag: &str) -> bool {
    ActionKind::from_name(tag).is_some_and(ActionKind::is_opaque)
}

/// Attach the top of the stack to its parent.
fn close_top(stack: &mut Vec<ParseNode>) {
    if stack.len() < 2 {
        return;
    }
    if let Some(node) = stack.pop() {
        if let Some(parent) = stack.last_mut() {
            parent.content.push(NodeContent::Node(node));
        }
    }
}

/// Build a tree from (already protected) text. Never fails: unmatched closing
/// tags become literal text and unclosed nodes are closed at end of input.
pub(crate) fn build(text: &str) -> ParseNode {
    let mut scanner = Scanner::new(text);
    let mut stack = vec![ParseNode::default()];

    while let Some(token) = scanner.next_token() {
        match token {
            Token::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.push_text(t);
                }
            }
            Token::Open {
                name,
                attributes,
                self_closing,
            } => {
                let mut node = ParseNode::new(name, attributes);
                if !self_closing && is_opaque(&node.tag) {
                    let raw = scanner.raw_until_close(&node.tag);
                    node.push_text(raw);
                    if let Some(top) = stack.last_mut() {
                        top.content.push(NodeContent::Node(node));
                    }
                } else if self_closing {
                    if let Some(top) = stack.last_mut() {
                        top.content.push(NodeContent::Node(node));
                    }
                } else {
                    stack.push(node);
                }
            }
            Token::Close { name, raw } => {
                match stack.iter().skip(1).rposition(|n| n.tag == name) {
                    Some(idx) => {
                        // idx is relative to the skipped root.
                        while stack.len() > idx + 1 {
                            close_top(&mut stack);
                        }
                    }
                    None => {
                        if let Some(top) = stack.last_mut() {
                            top.push_text(raw);
                        }
                    }
                }
            }
        }
    }

    while stack.len() > 1 {
        close_top(&mut stack);
    }
    stack.pop().unwrap_or_default()
}
