use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Conversation, MediaAttachment, Message, PresenceStatus, ReceiptKind};

/// Frames sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the connection. Must be the first frame; the server
    /// closes the socket if it does not arrive within the handshake window.
    #[serde(rename = "identify")]
    Identify { token: String },

    #[serde(rename = "conversation:join")]
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: Uuid },

    #[serde(rename = "message:send")]
    #[serde(rename_all = "camelCase")]
    SendMessage {
        conversation_id: Uuid,
        content: Option<String>,
        #[serde(default)]
        media: Vec<MediaAttachment>,
        reply_to_message_id: Option<i64>,
        #[serde(default)]
        is_encrypted: bool,
    },

    #[serde(rename = "typing:start")]
    #[serde(rename_all = "camelCase")]
    TypingStart { conversation_id: Uuid },

    #[serde(rename = "typing:stop")]
    #[serde(rename_all = "camelCase")]
    TypingStop { conversation_id: Uuid },

    #[serde(rename = "reaction:add")]
    #[serde(rename_all = "camelCase")]
    ReactionAdd { message_id: i64, emoji: String },

    #[serde(rename = "reaction:remove")]
    #[serde(rename_all = "camelCase")]
    ReactionRemove { message_id: i64, emoji: String },
}

/// Frames sent FROM server TO clients over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication.
    #[serde(rename = "ready")]
    #[serde(rename_all = "camelCase")]
    Ready { user_id: Uuid },

    #[serde(rename = "message:new")]
    MessageNew(Message),

    #[serde(rename = "message:updated")]
    MessageUpdated(Message),

    #[serde(rename = "message:deleted")]
    #[serde(rename_all = "camelCase")]
    MessageDeleted {
        message_id: i64,
        conversation_id: Uuid,
    },

    #[serde(rename = "reaction:added")]
    #[serde(rename_all = "camelCase")]
    ReactionAdded {
        message_id: i64,
        conversation_id: Uuid,
        emoji: String,
        user_id: Uuid,
    },

    #[serde(rename = "reaction:removed")]
    #[serde(rename_all = "camelCase")]
    ReactionRemoved {
        message_id: i64,
        conversation_id: Uuid,
        emoji: String,
        user_id: Uuid,
    },

    #[serde(rename = "delivery:receipt")]
    #[serde(rename_all = "camelCase")]
    DeliveryReceipt {
        conversation_id: Uuid,
        message_ids: Vec<i64>,
        user_id: Uuid,
    },

    #[serde(rename = "read:receipt")]
    #[serde(rename_all = "camelCase")]
    ReadReceipt {
        conversation_id: Uuid,
        message_ids: Vec<i64>,
        user_id: Uuid,
    },

    #[serde(rename = "conversation:created")]
    ConversationCreated(Conversation),

    #[serde(rename = "conversation:updated")]
    ConversationUpdated(Conversation),

    #[serde(rename = "conversation:deleted")]
    #[serde(rename_all = "camelCase")]
    ConversationDeleted { conversation_id: Uuid },

    #[serde(rename = "presence:update")]
    #[serde(rename_all = "camelCase")]
    PresenceUpdate {
        user_id: Uuid,
        status: PresenceStatus,
        last_seen: DateTime<Utc>,
    },

    #[serde(rename = "typing:start")]
    #[serde(rename_all = "camelCase")]
    TypingStart {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    #[serde(rename = "typing:stop")]
    #[serde(rename_all = "camelCase")]
    TypingStop {
        conversation_id: Uuid,
        user_id: Uuid,
    },

    /// Delivered only to the session whose frame failed, never broadcast.
    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl GatewayEvent {
    /// Returns the conversation id when the event is gated by a join
    /// subscription. `None` means no join gate applies: presence, ready
    /// and errors are global, and conversation:created predates any join
    /// so the connection filters it by participant list instead.
    pub fn conversation_id(&self) -> Option<Uuid> {
        match self {
            Self::MessageNew(m) | Self::MessageUpdated(m) => Some(m.conversation_id),
            Self::MessageDeleted {
                conversation_id, ..
            }
            | Self::ReactionAdded {
                conversation_id, ..
            }
            | Self::ReactionRemoved {
                conversation_id, ..
            }
            | Self::DeliveryReceipt {
                conversation_id, ..
            }
            | Self::ReadReceipt {
                conversation_id, ..
            }
            | Self::ConversationUpdated(Conversation {
                id: conversation_id,
                ..
            })
            | Self::ConversationDeleted { conversation_id }
            | Self::TypingStart {
                conversation_id, ..
            }
            | Self::TypingStop {
                conversation_id, ..
            } => Some(*conversation_id),
            _ => None,
        }
    }

    pub fn receipt(
        kind: ReceiptKind,
        conversation_id: Uuid,
        message_ids: Vec<i64>,
        user_id: Uuid,
    ) -> Self {
        match kind {
            ReceiptKind::Delivered => Self::DeliveryReceipt {
                conversation_id,
                message_ids,
                user_id,
            },
            ReceiptKind::Read => Self::ReadReceipt {
                conversation_id,
                message_ids,
                user_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frames_use_canonical_event_names() {
        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"conversation:join","data":{"conversationId":"8f14e45f-ceea-4e7b-a2f0-89fe7863b1c1"}}"#,
        )
        .unwrap();
        assert!(matches!(cmd, GatewayCommand::JoinConversation { .. }));

        let cmd: GatewayCommand = serde_json::from_str(
            r#"{"type":"message:send","data":{"conversationId":"8f14e45f-ceea-4e7b-a2f0-89fe7863b1c1","content":"hi"}}"#,
        )
        .unwrap();
        match cmd {
            GatewayCommand::SendMessage {
                content,
                media,
                is_encrypted,
                ..
            } => {
                assert_eq!(content.as_deref(), Some("hi"));
                assert!(media.is_empty());
                assert!(!is_encrypted);
            }
            other => panic!("unexpected frame: {other:?}"),
        }
    }

    #[test]
    fn typing_event_serializes_with_colon_name() {
        let event = GatewayEvent::TypingStart {
            conversation_id: Uuid::nil(),
            user_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "typing:start");
        assert!(json["data"]["conversationId"].is_string());
    }

    #[test]
    fn conversation_scoping_covers_message_and_receipt_events() {
        let conv = Uuid::new_v4();
        let event = GatewayEvent::MessageDeleted {
            message_id: 7,
            conversation_id: conv,
        };
        assert_eq!(event.conversation_id(), Some(conv));

        let event = GatewayEvent::ReadReceipt {
            conversation_id: conv,
            message_ids: vec![1, 2],
            user_id: Uuid::new_v4(),
        };
        assert_eq!(event.conversation_id(), Some(conv));

        let event = GatewayEvent::Ready {
            user_id: Uuid::new_v4(),
        };
        assert_eq!(event.conversation_id(), None);
    }
}
