use serde::{Deserialize, Serialize};

use crate::turns::{Role, Turn};

/// The payload handed to a cognitive provider for one generation call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationContext {
    pub system: String,
    pub messages: Vec<ContextMessage>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContextMessage {
    pub role: Role,
    pub content: String,
}

impl GenerationContext {
    /// Create an empty context (useful for testing).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Flatten history into messages, preserving order.
    pub fn from_turns(system: impl Into<String>, turns: &[Turn]) -> Self {
        Self {
            system: system.into(),
            messages: turns
                .iter()
                .map(|t| ContextMessage {
                    role: t.role,
                    content: t.text(),
                })
                .collect(),
        }
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}
