use thiserror::Error;

/// Failures surfaced by a generation call or the send flow around it.
///
/// Malformed frames inside an otherwise healthy stream never show up here;
/// the decoder drops them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    /// The API answered with a non-success status before streaming began.
    #[error("{message}")]
    RequestRejected { status: u16, message: String },

    /// Network failure while sending the request or reading the body.
    #[error("Network error: {0}")]
    Transport(String),

    #[error("A response is still being generated")]
    Busy,

    #[error("Please enter API Key")]
    MissingApiKey,

    #[error("Conversation '{0}' not found")]
    UnknownConversation(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// True when the server reported the model (or endpoint) as missing, which
    /// usually means the configured model name needs changing.
    pub fn is_not_found(&self) -> bool {
        match self {
            ChatError::RequestRejected { status, message } => {
                *status == 404 || message.to_lowercase().contains("not found")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        // the request URL carries the API key
        ChatError::Transport(err.without_url().to_string())
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        ChatError::Storage(format!("{:#}", err))
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_request_displays_server_message() {
        let err = ChatError::RequestRejected {
            status: 400,
            message: "API key not valid".to_string(),
        };
        assert_eq!(err.to_string(), "API key not valid");
    }

    #[test]
    fn not_found_detection() {
        let by_status = ChatError::RequestRejected {
            status: 404,
            message: "API Error: 404".to_string(),
        };
        let by_text = ChatError::RequestRejected {
            status: 400,
            message: "models/gemini-x is not found for API version v1beta".to_string(),
        };
        assert!(by_status.is_not_found());
        assert!(by_text.is_not_found());
        assert!(!ChatError::Transport("reset".into()).is_not_found());
    }
}
