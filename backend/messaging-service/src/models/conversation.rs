use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::message::{Message, MessageKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

/// Unordered pair of users identifying a direct conversation.
///
/// `DirectPair::new(a, b) == DirectPair::new(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DirectPair(Uuid, Uuid);

impl DirectPair {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Snapshot of the most recent message, kept on the conversation for listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LastMessage {
    pub message_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub kind: MessageKind,
    pub timestamp: DateTime<Utc>,
}

impl From<&Message> for LastMessage {
    fn from(message: &Message) -> Self {
        Self {
            message_id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
            kind: message.kind,
            timestamp: message.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    /// Deduplicated; for groups the creator comes first.
    pub participants: Vec<Uuid>,
    /// Unread counter per participant.
    #[serde(default)]
    pub unread: BTreeMap<Uuid, u32>,
    pub last_message: Option<LastMessage>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub group: Option<GroupInfo>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new_direct(id: Uuid, a: Uuid, b: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            kind: ConversationKind::Direct,
            participants: vec![a, b],
            unread: BTreeMap::new(),
            last_message: None,
            group: None,
            created_at,
        }
    }

    pub fn new_group(
        id: Uuid,
        participants: Vec<Uuid>,
        info: GroupInfo,
    ) -> Self {
        let created_at = info.created_at;
        Self {
            id,
            kind: ConversationKind::Group,
            participants,
            unread: BTreeMap::new(),
            last_message: None,
            group: Some(info),
            created_at,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == ConversationKind::Direct
    }

    pub fn has_participant(&self, user_id: Uuid) -> bool {
        self.participants.contains(&user_id)
    }

    /// For a direct conversation, the participant that is not `user_id`.
    pub fn counterpart(&self, user_id: Uuid) -> Option<Uuid> {
        if !self.is_direct() || !self.has_participant(user_id) {
            return None;
        }
        self.participants.iter().copied().find(|p| *p != user_id)
    }

    pub fn direct_pair(&self) -> Option<DirectPair> {
        match (self.kind, self.participants.as_slice()) {
            (ConversationKind::Direct, [a, b]) => Some(DirectPair::new(*a, *b)),
            _ => None,
        }
    }

    pub fn unread_for(&self, user_id: Uuid) -> u32 {
        self.unread.get(&user_id).copied().unwrap_or(0)
    }

    /// Aggregate over all participants.
    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.last_message.as_ref().map(|m| m.timestamp)
    }

    pub fn group_name(&self) -> Option<&str> {
        self.group.as_ref().map(|g| g.name.as_str())
    }
}

/// A conversation as presented to one requester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    /// Group name, or the counterpart's name for direct conversations.
    pub title: String,
    pub counterpart_online: Option<bool>,
    pub unread_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_pair_is_unordered() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(DirectPair::new(a, b), DirectPair::new(b, a));
    }

    #[test]
    fn test_counterpart() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = Conversation::new_direct(Uuid::new_v4(), a, b, Utc::now());

        assert_eq!(conv.counterpart(a), Some(b));
        assert_eq!(conv.counterpart(b), Some(a));
        assert_eq!(conv.counterpart(Uuid::new_v4()), None);
        assert_eq!(conv.direct_pair(), Some(DirectPair::new(b, a)));
    }

    #[test]
    fn test_unread_counters() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut conv = Conversation::new_direct(Uuid::new_v4(), a, b, Utc::now());
        conv.unread.insert(b, 3);

        assert_eq!(conv.unread_for(a), 0);
        assert_eq!(conv.unread_for(b), 3);
        assert_eq!(conv.total_unread(), 3);
    }
}
