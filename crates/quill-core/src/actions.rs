use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A typed request extracted from generated text. Immutable once parsed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: String,
    pub params: BTreeMap<String, String>,
    pub raw_body: String,
}

impl Action {
    pub fn new(action_type: impl Into<String>) -> Self {
        Self {
            action_type: action_type.into(),
            params: BTreeMap::new(),
            raw_body: String::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.raw_body = body.into();
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Parameter that must be present and non-empty.
    pub fn required(&self, key: &str) -> Result<&str, crate::errors::ActionError> {
        match self.param(key) {
            Some(v) if !v.trim().is_empty() => Ok(v),
            _ => Err(crate::errors::ActionError::missing(key)),
        }
    }

    /// Boolean flag parameter (`"true"`, `"1"`, `"yes"`).
    pub fn flag(&self, key: &str) -> bool {
        matches!(
            self.param(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("true" | "1" | "yes")
        )
    }

    pub fn kind(&self) -> Option<ActionKind> {
        ActionKind::from_name(&self.action_type)
    }
}

/// How the loop treats an action when ordering and dispatching a turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionClass {
    Query,
    Mutation,
    Patch,
    /// Silent continuation.
    Control,
    /// Pause-for-input or terminate. Always ordered last.
    Interrupt,
    /// Parsed but never dispatched.
    Annotation,
}

/// The closed action catalog. Registrations and parsed tags are validated against it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    Read,
    Create,
    Edit,
    Delete,
    Move,
    Copy,
    List,
    Search,
    Report,
    Ask,
    Finish,
    Thinking,
    Plan,
}

impl ActionKind {
    pub const ALL: [ActionKind; 13] = [
        Self::Read,
        Self::Create,
        Self::Edit,
        Self::Delete,
        Self::Move,
        Self::Copy,
        Self::List,
        Self::Search,
        Self::Report,
        Self::Ask,
        Self::Finish,
        Self::Thinking,
        Self::Plan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::Move => "move",
            Self::Copy => "copy",
            Self::List => "list",
            Self::Search => "search",
            Self::Report => "report",
            Self::Ask => "ask",
            Self::Finish => "finish",
            Self::Thinking => "thinking",
            Self::Plan => "plan",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.name().eq_ignore_ascii_case(name))
    }

    pub fn class(self) -> ActionClass {
        match self {
            Self::Read | Self::List | Self::Search => ActionClass::Query,
            Self::Create | Self::Delete | Self::Move | Self::Copy => ActionClass::Mutation,
            Self::Edit => ActionClass::Patch,
            Self::Report => ActionClass::Control,
            Self::Ask | Self::Finish => ActionClass::Interrupt,
            Self::Thinking | Self::Plan => ActionClass::Annotation,
        }
    }

    /// Tags whose bodies are captured verbatim and never parsed as markup.
    pub fn is_opaque(self) -> bool {
        matches!(
            self,
            Self::Create
                | Self::Edit
                | Self::Report
                | Self::Ask
                | Self::Finish
                | Self::Thinking
                | Self::Plan
        )
    }

    /// One-line usage shown to the model in the system prompt.
    pub fn usage(self) -> &'static str {
        match self {
            Self::Read => r#"<read path="file.txt"/>"#,
            Self::Create => r#"<create path="file.txt">content</create>  (path ending in "/" creates a directory)"#,
            Self::Edit => r#"<edit path="file.txt">SEARCH/REPLACE blocks</edit> or <edit path="f" mode="replace|delete|insert|append" start="N" end="M">lines</edit>"#,
            Self::Delete => r#"<delete path="file-or-dir"/>"#,
            Self::Move => r#"<move from="a" to="b"/>"#,
            Self::Copy => r#"<copy from="a" to="b"/>"#,
            Self::List => r#"<list path="dir" meta="true"/>"#,
            Self::Search => r#"<search pattern="text" path="dir" regex="false"/>"#,
            Self::Report => "<report>progress note</report>",
            Self::Ask => "<ask>question for the user</ask>",
            Self::Finish => "<finish>summary of the completed task</finish>",
            Self::Thinking => "<thinking>private reasoning</thinking>",
            Self::Plan => "<plan>steps</plan>",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Loop control value. Ordered by priority: `Terminate > Halt > Continue`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Continue,
    Halt,
    Terminate,
}

impl Signal {
    /// Dominant signal across a turn; `Continue` when empty.
    pub fn dominant<I: IntoIterator<Item = Signal>>(signals: I) -> Signal {
        signals.into_iter().max().unwrap_or(Signal::Continue)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Continue => "continue",
            Self::Halt => "halt",
            Self::Terminate => "terminate",
        };
        f.write_str(s)
    }
}

/// Outcome of one dispatched action. `log` is fed back to the model, `ui` is for humans.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub log: String,
    pub ui: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<Signal>,
}

impl ExecutionResult {
    pub fn ok(log: impl Into<String>) -> Self {
        let log = log.into();
        Self {
            ui: log.clone(),
            log,
            error: false,
            signal: None,
        }
    }

    pub fn error(log: impl Into<String>) -> Self {
        let log = log.into();
        Self {
            ui: log.clone(),
            log,
            error: true,
            signal: None,
        }
    }

    pub fn with_ui(mut self, ui: impl Into<String>) -> Self {
        self.ui = ui.into();
        self
    }

    pub fn with_signal(mut self, signal: Signal) -> Self {
        self.signal = Some(signal);
        self
    }
}
