//! Storage seams.
//!
//! The services only talk to these traits. `memory` provides the in-process
//! implementations used by the binary and the tests; a database-backed
//! implementation plugs in behind the same traits.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{Conversation, DirectPair, Message, Notification, User};

pub mod memory;

pub use memory::{
    InMemoryConversationRepository, InMemoryMessageRepository, InMemoryNotificationRepository,
    InMemoryUserDirectory,
};

/// Read-only view of the external user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns `NotFound` for unknown ids.
    async fn get_user(&self, id: Uuid) -> AppResult<User>;

    async fn list_users(&self) -> AppResult<Vec<User>>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>>;

    async fn find_direct(&self, pair: DirectPair) -> AppResult<Option<Conversation>>;

    async fn insert(&self, conversation: Conversation) -> AppResult<()>;

    /// Replaces the stored record. `NotFound` if it does not exist.
    async fn update(&self, conversation: Conversation) -> AppResult<()>;

    /// Conversations the user participates in, in creation order.
    async fn list_for_participant(&self, user_id: Uuid) -> AppResult<Vec<Conversation>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: Message) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>>;

    /// Messages of one conversation in insertion order.
    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>>;

    /// Hard delete. Returns the removed record, if any.
    async fn remove(&self, id: Uuid) -> AppResult<Option<Message>>;
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: Notification) -> AppResult<()>;

    async fn get(&self, id: Uuid) -> AppResult<Option<Notification>>;

    /// A recipient's notifications in delivery order.
    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>>;

    async fn update(&self, notification: Notification) -> AppResult<()>;

    async fn remove(&self, id: Uuid) -> AppResult<bool>;

    /// Removes every notification of the recipient, returning how many.
    async fn remove_for_user(&self, user_id: Uuid) -> AppResult<usize>;
}
