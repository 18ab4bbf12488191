use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::TurnId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
            Self::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "model" => Some(Self::Model),
            "system" => Some(Self::System),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Part {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType")]
        mime_type: String,
        data: String,
    },
}

/// Either a plain string or an ordered list of parts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TurnContent {
    Text(String),
    Parts(Vec<Part>),
}

impl TurnContent {
    /// Textual rendition; image parts become a short placeholder.
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => parts
                .iter()
                .map(|p| match p {
                    Part::Text { text } => text.clone(),
                    Part::Image { mime_type, .. } => format!("[image: {mime_type}]"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl From<String> for TurnContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for TurnContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

/// One recorded step in the history log. Never mutated in place.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub id: TurnId,
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: TurnContent,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub meta: serde_json::Value,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<TurnContent>, meta: serde_json::Value) -> Self {
        Self {
            id: TurnId::new(),
            timestamp: Utc::now(),
            role,
            content: content.into(),
            meta,
        }
    }

    pub fn text(&self) -> String {
        self.content.to_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn role_round_trip() {
        for role in [Role::User, Role::Model, Role::System] {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("assistant"), None);
    }

    #[test]
    fn content_untagged_serde() {
        let text: TurnContent = serde_json::from_value(json!("hello")).unwrap();
        assert_eq!(text, TurnContent::Text("hello".into()));

        let parts: TurnContent = serde_json::from_value(json!([
            {"type": "text", "text": "look"},
            {"type": "image", "mimeType": "image/png", "data": "AAAA"}
        ]))
        .unwrap();
        assert_eq!(parts.to_text(), "look\n[image: image/png]");
    }

    #[test]
    fn turn_serialization_skips_null_meta() {
        let turn = Turn::new(Role::User, "hi", serde_json::Value::Null);
        let value = serde_json::to_value(&turn).unwrap();
        assert!(value.get("meta").is_none());
        assert_eq!(value["role"], "user");

        let back: Turn = serde_json::from_value(value).unwrap();
        assert_eq!(back.id, turn.id);
        assert!(back.meta.is_null());
    }
}
