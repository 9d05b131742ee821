use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    #[serde(alias = "dm")]
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Moderator,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Moderator => "moderator",
        }
    }

    pub fn is_privileged(&self) -> bool {
        matches!(self, Self::Moderator)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub title: Option<String>,
    /// Participants in join order. Exactly two for direct conversations.
    pub participant_ids: Vec<Uuid>,
    pub pinned_by: Vec<Uuid>,
    pub archived_by: Vec<Uuid>,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for conversation creation. The participant-count
/// invariant for direct conversations is enforced here, at construction,
/// so no caller can hand the store an invalid shape.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub kind: ConversationKind,
    pub participant_ids: Vec<Uuid>,
    pub title: Option<String>,
}

impl NewConversation {
    pub fn new(
        kind: ConversationKind,
        mut participant_ids: Vec<Uuid>,
        title: Option<String>,
    ) -> Result<Self, ChatError> {
        // order-preserving dedup; join order is meaningful
        let mut seen: Vec<Uuid> = Vec::with_capacity(participant_ids.len());
        participant_ids.retain(|id| {
            if seen.contains(id) {
                false
            } else {
                seen.push(*id);
                true
            }
        });
        if participant_ids.is_empty() {
            return Err(ChatError::InvalidParticipants);
        }
        if kind == ConversationKind::Direct && participant_ids.len() != 2 {
            return Err(ChatError::InvalidParticipants);
        }
        Ok(Self {
            kind,
            participant_ids,
            title,
        })
    }

    /// Canonical key for a direct pair: sorted ids joined with ':'.
    /// Backed by a UNIQUE index so the same pair can never produce two
    /// direct conversations.
    pub fn direct_key(&self) -> Option<String> {
        if self.kind != ConversationKind::Direct {
            return None;
        }
        let mut pair = self.participant_ids.clone();
        pair.sort();
        Some(format!("{}:{}", pair[0], pair[1]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaAttachment {
    pub key: String,
    pub url: String,
    pub kind: MediaKind,
    pub size: u64,
}

/// One emoji's reactions on a message. Groups are emitted sorted by
/// emoji, user ids sorted within a group, so broadcast payloads are
/// byte-stable for identical state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    pub emoji: String,
    pub count: usize,
    pub user_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub media: Vec<MediaAttachment>,
    /// Self-referential message id; may dangle if the target was removed
    /// by a conversation cascade.
    pub reply_to_message_id: Option<i64>,
    pub reactions: Vec<ReactionGroup>,
    pub delivered_to: Vec<Uuid>,
    pub read_by: Vec<Uuid>,
    pub pinned: bool,
    pub encrypted: bool,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Validated input for message creation: content or at least one
/// attachment must be present.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: Option<String>,
    pub media: Vec<MediaAttachment>,
    pub reply_to_message_id: Option<i64>,
    pub encrypted: bool,
}

impl MessageDraft {
    pub fn new(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: Option<String>,
        media: Vec<MediaAttachment>,
        reply_to_message_id: Option<i64>,
        encrypted: bool,
    ) -> Result<Self, ChatError> {
        let content = content.filter(|c| !c.trim().is_empty());
        if content.is_none() && media.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        Ok(Self {
            conversation_id,
            sender_id,
            content,
            media,
            reply_to_message_id,
            encrypted,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptKind {
    Delivered,
    Read,
}

impl ReceiptKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_conversation_requires_two_distinct_participants() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(NewConversation::new(ConversationKind::Direct, vec![a, b], None).is_ok());
        assert!(matches!(
            NewConversation::new(ConversationKind::Direct, vec![a], None),
            Err(ChatError::InvalidParticipants)
        ));
        assert!(matches!(
            NewConversation::new(ConversationKind::Direct, vec![a, a], None),
            Err(ChatError::InvalidParticipants)
        ));
        assert!(matches!(
            NewConversation::new(ConversationKind::Direct, vec![a, b, Uuid::new_v4()], None),
            Err(ChatError::InvalidParticipants)
        ));
    }

    #[test]
    fn direct_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let ab = NewConversation::new(ConversationKind::Direct, vec![a, b], None).unwrap();
        let ba = NewConversation::new(ConversationKind::Direct, vec![b, a], None).unwrap();
        assert_eq!(ab.direct_key(), ba.direct_key());

        let group =
            NewConversation::new(ConversationKind::Group, vec![a, b], Some("team".into())).unwrap();
        assert_eq!(group.direct_key(), None);
    }

    #[test]
    fn draft_rejects_empty_and_whitespace_content() {
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(matches!(
            MessageDraft::new(conv, user, None, vec![], None, false),
            Err(ChatError::EmptyMessage)
        ));
        assert!(matches!(
            MessageDraft::new(conv, user, Some("   ".into()), vec![], None, false),
            Err(ChatError::EmptyMessage)
        ));

        let media = vec![MediaAttachment {
            key: "k".into(),
            url: "https://files.example/k".into(),
            kind: MediaKind::Image,
            size: 1024,
        }];
        assert!(MessageDraft::new(conv, user, None, media, None, false).is_ok());
        assert!(MessageDraft::new(conv, user, Some("hi".into()), vec![], None, false).is_ok());
    }
}
