//! Incoming chat input.

use serde::{Deserialize, Serialize};

use crate::block::MessageType;
use crate::command::SystemCommand;
use crate::ids::{MessageId, UserId};

/// A text message or inline callback from one user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputMessage {
    pub message_type: MessageType,
    /// Text typed, or callback data of the pressed inline button.
    pub query: String,
    pub chat_id: i64,
    pub user_id: UserId,
    /// Message the inline keyboard is attached to; `None` for text input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
}

impl InputMessage {
    pub fn text(user_id: UserId, chat_id: i64, query: impl Into<String>) -> Self {
        Self {
            message_type: MessageType::Text,
            query: query.into(),
            chat_id,
            user_id,
            message_id: None,
        }
    }

    pub fn inline(
        user_id: UserId,
        chat_id: i64,
        message_id: MessageId,
        query: impl Into<String>,
    ) -> Self {
        Self {
            message_type: MessageType::Inline,
            query: query.into(),
            chat_id,
            user_id,
            message_id: Some(message_id),
        }
    }

    /// Same input with a different query.
    pub fn with_query(&self, query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..self.clone()
        }
    }

    /// Same input rewritten into a refresh request.
    pub fn to_refresh(&self) -> Self {
        self.with_query(SystemCommand::Refresh.id())
    }

    pub fn is_refresh(&self) -> bool {
        self.query == SystemCommand::Refresh.id()
    }

    /// The inline message id, or `NONE` for text input.
    pub fn message_id_or_none(&self) -> MessageId {
        self.message_id.unwrap_or(MessageId::NONE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_rewrite_keeps_origin() {
        let input = InputMessage::inline(UserId::new(5), 77, MessageId::new(900), "NEXT");
        let refresh = input.to_refresh();
        assert!(refresh.is_refresh());
        assert_eq!(refresh.message_type, MessageType::Inline);
        assert_eq!(refresh.message_id, Some(MessageId::new(900)));
        assert_eq!(refresh.chat_id, 77);
        assert!(!input.is_refresh());
    }

    #[test]
    fn test_text_has_no_message() {
        let input = InputMessage::text(UserId::new(5), 77, "/start");
        assert_eq!(input.message_id_or_none(), MessageId::NONE);
    }
}
