//! Request/response operations exposed to the UI and CLI layers.
//!
//! Send path: validate, store any attachment (outside every lock), then under
//! the conversation lock stamp, append and record the delivery, release the
//! lock, and start the notification fan-out.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::attachment_service::{AttachmentService, BlobStore, FileUpload, InMemoryBlobStore};
use super::conversation_service::ConversationService;
use super::message_service::MessageService;
use super::notification_dispatcher::{FanOutHandle, NotificationDispatcher};
use super::visibility::VisibilityFilter;
use crate::clock::{Clock, SystemClock};
use crate::error::{AppError, AppResult};
use crate::ids::{IdGenerator, UuidGenerator};
use crate::metrics;
use crate::models::{Conversation, ConversationSummary, Message, Role, User};
use crate::repository::{
    ConversationRepository, InMemoryConversationRepository, InMemoryMessageRepository,
    InMemoryNotificationRepository, MessageRepository, NotificationRepository, UserDirectory,
};

/// Everything the core depends on from the outside.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn UserDirectory>,
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub blobs: Arc<dyn BlobStore>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl Collaborators {
    /// In-memory repositories and blob store, wall clock, random ids.
    pub fn in_memory(directory: Arc<dyn UserDirectory>) -> Self {
        Self {
            directory,
            conversations: Arc::new(InMemoryConversationRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            notifications: Arc::new(InMemoryNotificationRepository::new()),
            blobs: Arc::new(InMemoryBlobStore::new()),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_notifications(mut self, notifications: Arc<dyn NotificationRepository>) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = blobs;
        self
    }
}

pub struct MessagingService {
    directory: Arc<dyn UserDirectory>,
    clock: Arc<dyn Clock>,
    conversations: ConversationService,
    messages: MessageService,
    visibility: VisibilityFilter,
    dispatcher: NotificationDispatcher,
    attachments: AttachmentService,
}

impl MessagingService {
    pub fn new(collaborators: Collaborators, attachment_store_timeout: Duration) -> Self {
        let Collaborators {
            directory,
            conversations,
            messages,
            notifications,
            blobs,
            clock,
            ids,
        } = collaborators;

        Self {
            conversations: ConversationService::new(
                conversations,
                directory.clone(),
                ids.clone(),
                clock.clone(),
            ),
            messages: MessageService::new(messages, ids.clone()),
            visibility: VisibilityFilter::new(directory.clone()),
            dispatcher: NotificationDispatcher::new(notifications, ids, clock.clone()),
            attachments: AttachmentService::new(blobs, attachment_store_timeout),
            directory,
            clock,
        }
    }

    pub fn conversations(&self) -> &ConversationService {
        &self.conversations
    }

    pub fn attachments(&self) -> &AttachmentService {
        &self.attachments
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<Message> {
        let (message, _fan_out) = self
            .send_message_tracked(conversation_id, sender_id, content)
            .await?;
        Ok(message)
    }

    /// Like [`send_message`](Self::send_message), also returning the
    /// in-flight notification fan-out.
    pub async fn send_message_tracked(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        content: &str,
    ) -> AppResult<(Message, FanOutHandle)> {
        let content = content.trim();
        if content.is_empty() {
            return Err(AppError::validation("message content is required"));
        }
        let (conversation, sender) = self.authorize_sender(conversation_id, sender_id).await?;
        let content = content.to_string();

        self.deliver(conversation, sender, move |timestamp| {
            Message::text(conversation_id, sender_id, content, timestamp)
        })
        .await
    }

    pub async fn send_file(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        file: &FileUpload,
    ) -> AppResult<Message> {
        let (message, _fan_out) = self
            .send_file_tracked(conversation_id, sender_id, file)
            .await?;
        Ok(message)
    }

    /// The blob is stored before anything is recorded; if storing fails or
    /// times out, no message exists afterwards.
    pub async fn send_file_tracked(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        file: &FileUpload,
    ) -> AppResult<(Message, FanOutHandle)> {
        self.attachments.validate(file)?;
        let (conversation, sender) = self.authorize_sender(conversation_id, sender_id).await?;
        let attachment = self.attachments.store(file).await?;

        self.deliver(conversation, sender, move |timestamp| {
            Message::file(conversation_id, sender_id, attachment, timestamp)
        })
        .await
    }

    /// Multi-file upload. Each file succeeds or fails on its own; an
    /// oversized file does not stop the rest.
    pub async fn send_files(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        files: &[FileUpload],
    ) -> Vec<AppResult<Message>> {
        self.send_files_tracked(conversation_id, sender_id, files)
            .await
            .into_iter()
            .map(|outcome| outcome.map(|(message, _fan_out)| message))
            .collect()
    }

    pub async fn send_files_tracked(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        files: &[FileUpload],
    ) -> Vec<AppResult<(Message, FanOutHandle)>> {
        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let outcome = self
                .send_file_tracked(conversation_id, sender_id, file)
                .await;
            if let Err(e) = &outcome {
                tracing::warn!(
                    error = %e,
                    file_name = %file.file_name,
                    conversation_id = %conversation_id,
                    "File upload rejected"
                );
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    pub async fn list_conversations(
        &self,
        user_id: Uuid,
        role: Role,
    ) -> AppResult<Vec<ConversationSummary>> {
        let candidates = self.conversations.list_for_participant(user_id).await?;
        self.visibility.apply(user_id, role, candidates).await
    }

    pub async fn list_messages(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        self.conversations.get(conversation_id).await?;
        self.messages.list_by_conversation(conversation_id).await
    }

    pub async fn create_direct_conversation(
        &self,
        user_a: Uuid,
        user_b: Uuid,
    ) -> AppResult<Conversation> {
        self.conversations.create_direct(user_a, user_b).await
    }

    pub async fn create_group_conversation(
        &self,
        creator: Uuid,
        name: &str,
        description: &str,
        member_ids: &[Uuid],
    ) -> AppResult<Conversation> {
        self.conversations
            .create_group(creator, name, description, member_ids)
            .await
    }

    /// Hard delete. A deleted newest message stays referenced as the
    /// conversation's `last_message`.
    pub async fn delete_message(&self, message_id: Uuid) -> AppResult<()> {
        self.messages.delete(message_id).await?;
        Ok(())
    }

    pub async fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        self.conversations
            .mark_conversation_read(conversation_id, user_id)
            .await
    }

    async fn authorize_sender(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
    ) -> AppResult<(Conversation, User)> {
        if conversation_id.is_nil() {
            return Err(AppError::validation("conversation id is required"));
        }
        let conversation = self.conversations.get(conversation_id).await?;
        if !conversation.has_participant(sender_id) {
            tracing::warn!(
                conversation_id = %conversation_id,
                sender_id = %sender_id,
                "Sender is not a participant"
            );
            return Err(AppError::Forbidden);
        }
        let sender = self.directory.get_user(sender_id).await?;
        Ok((conversation, sender))
    }

    async fn deliver<F>(
        &self,
        conversation: Conversation,
        sender: User,
        build: F,
    ) -> AppResult<(Message, FanOutHandle)>
    where
        F: FnOnce(DateTime<Utc>) -> Message,
    {
        let (message, updated) = {
            let lock = self.conversations.lock(conversation.id).await;
            let message = self.messages.append(build(self.clock.now())).await?;
            match self.conversations.record_delivery(&lock, &message).await {
                Ok(updated) => (message, updated),
                Err(e) => {
                    // Keep the store consistent with the registry.
                    if let Err(rollback) = self.messages.delete(message.id).await {
                        tracing::error!(error = %rollback, message_id = %message.id, "Rollback failed");
                    }
                    return Err(e);
                }
            }
        };

        let recipients: Vec<Uuid> = updated
            .participants
            .iter()
            .copied()
            .filter(|p| *p != sender.id)
            .collect();
        let fan_out = self.dispatcher.dispatch(&message, &sender.name, recipients);
        metrics::record_message_sent(message.kind, sender.role);

        tracing::info!(
            conversation_id = %message.conversation_id,
            message_id = %message.id,
            sender_id = %sender.id,
            kind = message.kind.as_str(),
            "Message sent"
        );
        Ok((message, fan_out))
    }
}
