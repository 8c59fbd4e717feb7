use serde::{Deserialize, Serialize};

/// Ordered event stream of one chat execution. The sequence is
/// `user_message`, zero or more `token`s, `ai_message_complete`, then exactly
/// one terminal event: `complete` on success or `error` on any failure after
/// the stream opened. A consumer concatenates `token` fragments in arrival
/// order to obtain the final assistant text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    UserMessage { content: String },
    Token { content: String },
    AiMessageComplete { content: String },
    Complete,
    Error { message: String },
}

impl ChatEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Complete | ChatEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ChatEvent::Token {
            content: "Hel".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&event).expect("serialize"),
            r#"{"type":"token","content":"Hel"}"#
        );

        assert_eq!(
            serde_json::to_string(&ChatEvent::Complete).expect("serialize"),
            r#"{"type":"complete"}"#
        );

        let error = ChatEvent::Error {
            message: "boom".to_string(),
        };
        assert_eq!(
            serde_json::to_string(&error).expect("serialize"),
            r#"{"type":"error","message":"boom"}"#
        );
    }

    #[test]
    fn terminal_classification() {
        assert!(ChatEvent::Complete.is_terminal());
        assert!(ChatEvent::Error {
            message: String::new()
        }
        .is_terminal());
        assert!(!ChatEvent::UserMessage {
            content: String::new()
        }
        .is_terminal());
        assert!(!ChatEvent::Token {
            content: String::new()
        }
        .is_terminal());
    }
}
