use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ids::IdGenerator;
use crate::models::Message;
use crate::repository::MessageRepository;

/// Message store: append-only per conversation, with hard delete.
pub struct MessageService {
    messages: Arc<dyn MessageRepository>,
    ids: Arc<dyn IdGenerator>,
}

impl MessageService {
    pub fn new(messages: Arc<dyn MessageRepository>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { messages, ids }
    }

    /// Stores the message, assigning an id when it has none. Identical
    /// content is never treated as a duplicate.
    pub async fn append(&self, mut message: Message) -> AppResult<Message> {
        if message.id.is_nil() {
            message.id = self.ids.next_id();
        }
        self.messages.insert(message.clone()).await?;
        Ok(message)
    }

    /// Ascending by timestamp; equal timestamps keep insertion order.
    pub async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let mut messages = self.messages.list_by_conversation(conversation_id).await?;
        messages.sort_by_key(|m| m.timestamp);
        Ok(messages)
    }

    /// Hard delete. The owning conversation's `last_message` is left as is.
    pub async fn delete(&self, message_id: Uuid) -> AppResult<Message> {
        let removed = self
            .messages
            .remove(message_id)
            .await?
            .ok_or_else(|| AppError::not_found("message", message_id))?;
        tracing::info!(
            message_id = %message_id,
            conversation_id = %removed.conversation_id,
            "Deleted message"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIdGenerator;
    use crate::repository::InMemoryMessageRepository;
    use chrono::{Duration, TimeZone, Utc};

    fn service() -> MessageService {
        MessageService::new(
            Arc::new(InMemoryMessageRepository::new()),
            Arc::new(SequentialIdGenerator::new()),
        )
    }

    #[tokio::test]
    async fn test_append_assigns_id_only_when_missing() {
        let svc = service();
        let conversation_id = Uuid::new_v4();

        let stored = svc
            .append(Message::text(conversation_id, Uuid::new_v4(), "hi", Utc::now()))
            .await
            .unwrap();
        assert_eq!(stored.id, Uuid::from_u128(1));

        let mut preset = Message::text(conversation_id, Uuid::new_v4(), "hi", Utc::now());
        preset.id = Uuid::from_u128(99);
        assert_eq!(svc.append(preset).await.unwrap().id, Uuid::from_u128(99));

        assert_eq!(svc.list_by_conversation(conversation_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_listing_sorts_by_timestamp_then_insertion() {
        let svc = service();
        let conversation_id = Uuid::new_v4();
        let sender = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        for (content, offset) in [("late", 10), ("first-tie", 0), ("second-tie", 0), ("middle", 5)] {
            svc.append(Message::text(
                conversation_id,
                sender,
                content,
                t0 + Duration::seconds(offset),
            ))
            .await
            .unwrap();
        }

        let contents: Vec<_> = svc
            .list_by_conversation(conversation_id)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["first-tie", "second-tie", "middle", "late"]);
    }

    #[tokio::test]
    async fn test_delete_unknown_message() {
        let svc = service();
        let err = svc.delete(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
