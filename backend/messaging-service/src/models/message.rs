use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
        }
    }
}

/// Metadata of a stored attachment. `file_url` is the blob reference
/// returned by the attachment store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub file_size: u64,
    pub file_type: String,
    pub file_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    /// Text body, or the original file name for attachments.
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attachment: Option<Attachment>,
}

impl Message {
    /// Builds an unsaved text message. The id stays nil until the store
    /// assigns one.
    pub fn text(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            conversation_id,
            sender_id,
            content: content.into(),
            timestamp,
            read: true,
            kind: MessageKind::Text,
            attachment: None,
        }
    }

    pub fn file(
        conversation_id: Uuid,
        sender_id: Uuid,
        attachment: Attachment,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            conversation_id,
            sender_id,
            content: attachment.file_name.clone(),
            timestamp,
            read: true,
            kind: MessageKind::File,
            attachment: Some(attachment),
        }
    }
}
