use serde::{Deserialize, Serialize};

/// Events emitted while a response streams in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmEvent {
    /// Cumulative text received so far
    Progress(String),
    /// Stream finished; carries the complete text
    Complete(String),
    /// Request or transport failure
    Error(String),
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Role::User => "You",
            Role::Model => "Nova",
        }
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Attached image as a `data:` URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image: None,
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, data_uri: impl Into<String>) -> Self {
        self.image = Some(data_uri.into());
        self
    }
}

/// Titled, timestamped conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    /// Creation time in milliseconds since the Unix epoch
    pub timestamp: i64,
    pub messages: Vec<Message>,
}

pub const DEFAULT_TITLE: &str = "New Conversation";
const TITLE_MAX_CHARS: usize = 30;

impl Conversation {
    pub fn new() -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            title: DEFAULT_TITLE.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            messages: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Local creation time formatted for listings, e.g. `Mar 04, 14:05`
    pub fn formatted_date(&self) -> String {
        match chrono::DateTime::from_timestamp_millis(self.timestamp) {
            Some(utc) => utc
                .with_timezone(&chrono::Local)
                .format("%b %d, %H:%M")
                .to_string(),
            None => "-".to_string(),
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}

/// Title derived from the first user message: first 30 characters, with an
/// ellipsis when the text was longer.
pub fn title_from_text(text: &str) -> String {
    let mut title: String = text.chars().take(TITLE_MAX_CHARS).collect();
    if text.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_json_omits_missing_image() {
        let json = serde_json::to_value(Message::user("Hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "text": "Hi"}));

        let with_image = Message::user("look").with_image("data:image/png;base64,AAAA");
        let json = serde_json::to_value(&with_image).unwrap();
        assert_eq!(json["image"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn title_truncates_long_text() {
        assert_eq!(title_from_text("short"), "short");
        let long = "a".repeat(31);
        assert_eq!(title_from_text(&long), format!("{}...", "a".repeat(30)));
        assert_eq!(title_from_text(&"b".repeat(30)), "b".repeat(30));
    }

    #[test]
    fn title_counts_characters_not_bytes() {
        let text = "é".repeat(35);
        assert_eq!(title_from_text(&text), format!("{}...", "é".repeat(30)));
    }
}
