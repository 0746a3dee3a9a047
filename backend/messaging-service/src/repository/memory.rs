use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{ConversationRepository, MessageRepository, NotificationRepository, UserDirectory};
use crate::error::{AppError, AppResult};
use crate::models::{Conversation, DirectPair, Message, Notification, User};

#[derive(Default)]
pub struct InMemoryUserDirectory {
    inner: RwLock<UserTable>,
}

#[derive(Default)]
struct UserTable {
    by_id: HashMap<Uuid, User>,
    order: Vec<Uuid>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let mut table = UserTable::default();
        for user in users {
            table.upsert(user);
        }
        Self {
            inner: RwLock::new(table),
        }
    }

    /// Loads a JSON array of users, as found in the seed file.
    pub async fn from_json_file(path: &Path) -> AppResult<Self> {
        let raw = tokio::fs::read(path).await.map_err(|e| {
            AppError::Config(format!("read seed users {}: {e}", path.display()))
        })?;
        let users: Vec<User> = serde_json::from_slice(&raw).map_err(|e| {
            AppError::Config(format!("parse seed users {}: {e}", path.display()))
        })?;
        tracing::info!(count = users.len(), path = %path.display(), "Loaded seed users");
        Ok(Self::with_users(users))
    }
}

impl UserTable {
    fn upsert(&mut self, user: User) {
        if !self.by_id.contains_key(&user.id) {
            self.order.push(user.id);
        }
        self.by_id.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: Uuid) -> AppResult<User> {
        self.inner
            .read()
            .await
            .by_id
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::not_found("user", id))
    }

    async fn list_users(&self) -> AppResult<Vec<User>> {
        let guard = self.inner.read().await;
        Ok(guard
            .order
            .iter()
            .filter_map(|id| guard.by_id.get(id).cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    inner: RwLock<ConversationTable>,
}

#[derive(Default)]
struct ConversationTable {
    by_id: HashMap<Uuid, Conversation>,
    order: Vec<Uuid>,
    direct_index: HashMap<DirectPair, Uuid>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn get(&self, id: Uuid) -> AppResult<Option<Conversation>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn find_direct(&self, pair: DirectPair) -> AppResult<Option<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard
            .direct_index
            .get(&pair)
            .and_then(|id| guard.by_id.get(id))
            .cloned())
    }

    async fn insert(&self, conversation: Conversation) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if guard.by_id.contains_key(&conversation.id) {
            return Err(AppError::Internal(format!(
                "conversation {} already stored",
                conversation.id
            )));
        }
        if let Some(pair) = conversation.direct_pair() {
            guard.direct_index.insert(pair, conversation.id);
        }
        guard.order.push(conversation.id);
        guard.by_id.insert(conversation.id, conversation);
        Ok(())
    }

    async fn update(&self, conversation: Conversation) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        match guard.by_id.get_mut(&conversation.id) {
            Some(slot) => {
                *slot = conversation;
                Ok(())
            }
            None => Err(AppError::not_found("conversation", conversation.id)),
        }
    }

    async fn list_for_participant(&self, user_id: Uuid) -> AppResult<Vec<Conversation>> {
        let guard = self.inner.read().await;
        Ok(guard
            .order
            .iter()
            .filter_map(|id| guard.by_id.get(id))
            .filter(|c| c.has_participant(user_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    inner: RwLock<MessageTable>,
}

#[derive(Default)]
struct MessageTable {
    by_id: HashMap<Uuid, Message>,
    // conversation_id -> message ids in insertion order
    by_conversation: HashMap<Uuid, Vec<Uuid>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: Message) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        if guard.by_id.contains_key(&message.id) {
            return Err(AppError::Internal(format!(
                "message {} already stored",
                message.id
            )));
        }
        guard
            .by_conversation
            .entry(message.conversation_id)
            .or_default()
            .push(message.id);
        guard.by_id.insert(message.id, message);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Message>> {
        Ok(self.inner.read().await.by_id.get(&id).cloned())
    }

    async fn list_by_conversation(&self, conversation_id: Uuid) -> AppResult<Vec<Message>> {
        let guard = self.inner.read().await;
        Ok(guard
            .by_conversation
            .get(&conversation_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| guard.by_id.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn remove(&self, id: Uuid) -> AppResult<Option<Message>> {
        let mut guard = self.inner.write().await;
        let Some(removed) = guard.by_id.remove(&id) else {
            return Ok(None);
        };
        if let Some(ids) = guard.by_conversation.get_mut(&removed.conversation_id) {
            ids.retain(|m| *m != id);
        }
        Ok(Some(removed))
    }
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    inner: RwLock<NotificationTable>,
}

#[derive(Default)]
struct NotificationTable {
    // recipient -> notifications in delivery order
    by_user: HashMap<Uuid, Vec<Notification>>,
    owner: HashMap<Uuid, Uuid>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: Notification) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        guard.owner.insert(notification.id, notification.user_id);
        guard
            .by_user
            .entry(notification.user_id)
            .or_default()
            .push(notification);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> AppResult<Option<Notification>> {
        let guard = self.inner.read().await;
        Ok(guard
            .owner
            .get(&id)
            .and_then(|user| guard.by_user.get(user))
            .and_then(|list| list.iter().find(|n| n.id == id))
            .cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>> {
        Ok(self
            .inner
            .read()
            .await
            .by_user
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn update(&self, notification: Notification) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let slot = guard
            .by_user
            .get_mut(&notification.user_id)
            .and_then(|list| list.iter_mut().find(|n| n.id == notification.id))
            .ok_or_else(|| AppError::not_found("notification", notification.id))?;
        *slot = notification;
        Ok(())
    }

    async fn remove(&self, id: Uuid) -> AppResult<bool> {
        let mut guard = self.inner.write().await;
        let Some(user) = guard.owner.remove(&id) else {
            return Ok(false);
        };
        if let Some(list) = guard.by_user.get_mut(&user) {
            list.retain(|n| n.id != id);
        }
        Ok(true)
    }

    async fn remove_for_user(&self, user_id: Uuid) -> AppResult<usize> {
        let mut guard = self.inner.write().await;
        let removed = guard.by_user.remove(&user_id).unwrap_or_default();
        for notification in &removed {
            guard.owner.remove(&notification.id);
        }
        Ok(removed.len())
    }
}
