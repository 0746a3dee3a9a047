use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use super::keyed_lock::KeyedLocks;
use crate::clock::Clock;
use crate::error::{AppError, AppResult};
use crate::ids::IdGenerator;
use crate::models::{Conversation, DirectPair, GroupInfo, LastMessage, Message};
use crate::repository::{ConversationRepository, UserDirectory};

/// Proof that the caller holds the write lock of one conversation.
pub struct ConversationLock {
    conversation_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl ConversationLock {
    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }
}

/// Conversation registry: creation, last-message bookkeeping and unread
/// counters. Read-modify-write on a conversation is serialized per id;
/// direct creation is serialized per unordered user pair.
pub struct ConversationService {
    conversations: Arc<dyn ConversationRepository>,
    directory: Arc<dyn UserDirectory>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    conversation_locks: KeyedLocks<Uuid>,
    pair_locks: KeyedLocks<DirectPair>,
}

impl ConversationService {
    pub fn new(
        conversations: Arc<dyn ConversationRepository>,
        directory: Arc<dyn UserDirectory>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            conversations,
            directory,
            ids,
            clock,
            conversation_locks: KeyedLocks::new(),
            pair_locks: KeyedLocks::new(),
        }
    }

    pub async fn get(&self, conversation_id: Uuid) -> AppResult<Conversation> {
        self.conversations
            .get(conversation_id)
            .await?
            .ok_or_else(|| AppError::not_found("conversation", conversation_id))
    }

    pub async fn list_for_participant(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        self.conversations.list_for_participant(user_id).await
    }

    pub async fn lock(&self, conversation_id: Uuid) -> ConversationLock {
        ConversationLock {
            conversation_id,
            _guard: self.conversation_locks.lock(conversation_id).await,
        }
    }

    /// Returns the existing direct conversation for the pair if there is one,
    /// otherwise creates it. Argument order does not matter.
    pub async fn create_direct(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Conversation> {
        if user_a.is_nil() || user_b.is_nil() {
            return Err(AppError::validation("both participants are required"));
        }
        if user_a == user_b {
            return Err(AppError::validation(
                "a direct conversation needs two different users",
            ));
        }
        self.directory.get_user(user_a).await?;
        self.directory.get_user(user_b).await?;

        let pair = DirectPair::new(user_a, user_b);
        let _guard = self.pair_locks.lock(pair).await;

        if let Some(existing) = self.conversations.find_direct(pair).await? {
            tracing::debug!(
                conversation_id = %existing.id,
                "Direct conversation already exists, returning it"
            );
            return Ok(existing);
        }

        let conversation =
            Conversation::new_direct(self.ids.next_id(), user_a, user_b, self.clock.now());
        self.conversations.insert(conversation.clone()).await?;

        tracing::info!(
            conversation_id = %conversation.id,
            user_a = %user_a,
            user_b = %user_b,
            "Created direct conversation"
        );
        Ok(conversation)
    }

    /// Participants are the creator followed by the members, deduplicated.
    pub async fn create_group(
        &self,
        creator: Uuid,
        name: &str,
        description: &str,
        member_ids: &[Uuid],
    ) -> AppResult<Conversation> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::validation("group name is required"));
        }
        if member_ids.is_empty() {
            return Err(AppError::validation("at least one member is required"));
        }

        let mut participants = vec![creator];
        for member in member_ids {
            if !participants.contains(member) {
                participants.push(*member);
            }
        }
        if participants.len() < 2 {
            return Err(AppError::validation(
                "a group needs at least one member besides the creator",
            ));
        }
        for participant in &participants {
            self.directory.get_user(*participant).await?;
        }

        let info = GroupInfo {
            name: name.to_string(),
            description: description.trim().to_string(),
            created_by: creator,
            created_at: self.clock.now(),
        };
        let conversation = Conversation::new_group(self.ids.next_id(), participants, info);
        self.conversations.insert(conversation.clone()).await?;

        tracing::info!(
            conversation_id = %conversation.id,
            created_by = %creator,
            participants = conversation.participants.len(),
            "Created group conversation"
        );
        Ok(conversation)
    }

    /// Points `last_message` at `message`. Recording the same message twice
    /// is a no-op.
    pub async fn record_last_message(
        &self,
        conversation_id: Uuid,
        message: &Message,
    ) -> AppResult<Conversation> {
        ensure_belongs(conversation_id, message)?;
        let lock = self.lock(conversation_id).await;
        self.modify(&lock, |conv| set_last_message(conv, message))
            .await
    }

    /// Adds one unread message for every participant except the sender.
    pub async fn increment_unread(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
    ) -> AppResult<Conversation> {
        let lock = self.lock(conversation_id).await;
        self.modify(&lock, |conv| {
            bump_unread(conv, sender_id);
            true
        })
        .await
    }

    pub async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let lock = self.lock(conversation_id).await;
        let conversation = self.get(lock.conversation_id()).await?;
        if !conversation.has_participant(user_id) {
            return Err(AppError::Forbidden);
        }
        self.modify(&lock, |conv| conv.unread.remove(&user_id).is_some())
            .await
    }

    /// Records a freshly appended message: last-message pointer plus unread
    /// counters. Idempotent per message id.
    pub async fn record_delivery(
        &self,
        lock: &ConversationLock,
        message: &Message,
    ) -> AppResult<Conversation> {
        ensure_belongs(lock.conversation_id(), message)?;
        self.modify(lock, |conv| {
            if !set_last_message(conv, message) {
                return false;
            }
            bump_unread(conv, message.sender_id);
            true
        })
        .await
    }

    async fn modify<F>(&self, lock: &ConversationLock, apply: F) -> AppResult<Conversation>
    where
        F: FnOnce(&mut Conversation) -> bool,
    {
        let mut conversation = self.get(lock.conversation_id()).await?;
        if apply(&mut conversation) {
            self.conversations.update(conversation.clone()).await?;
        }
        Ok(conversation)
    }
}

fn ensure_belongs(conversation_id: Uuid, message: &Message) -> AppResult<()> {
    if message.conversation_id != conversation_id {
        return Err(AppError::validation(format!(
            "message {} belongs to conversation {}",
            message.id, message.conversation_id
        )));
    }
    Ok(())
}

fn set_last_message(conversation: &mut Conversation, message: &Message) -> bool {
    let already = conversation
        .last_message
        .as_ref()
        .is_some_and(|last| last.message_id == message.id);
    if already {
        return false;
    }
    conversation.last_message = Some(LastMessage::from(message));
    true
}

fn bump_unread(conversation: &mut Conversation, sender_id: Uuid) {
    for participant in conversation.participants.clone() {
        if participant != sender_id {
            let count = conversation.unread.entry(participant).or_insert(0);
            *count = count.saturating_add(1);
        }
    }
}
