use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Notification;
use crate::repository::NotificationRepository;

/// A recipient's notification inbox. Every operation is scoped to the
/// owner; ids belonging to someone else behave as if they did not exist.
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    /// Newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>> {
        let mut list = self.notifications.list_for_user(user_id).await?;
        list.reverse();
        list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(list)
    }

    pub async fn unread_count(&self, user_id: Uuid) -> AppResult<usize> {
        Ok(self
            .notifications
            .list_for_user(user_id)
            .await?
            .iter()
            .filter(|n| !n.read)
            .count())
    }

    async fn owned(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<Notification> {
        match self.notifications.get(notification_id).await? {
            Some(n) if n.user_id == user_id => Ok(n),
            _ => Err(AppError::not_found("notification", notification_id)),
        }
    }

    pub async fn mark_read(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<Notification> {
        let mut notification = self.owned(user_id, notification_id).await?;
        if !notification.read {
            notification.read = true;
            self.notifications.update(notification.clone()).await?;
        }
        Ok(notification)
    }

    /// Returns how many notifications changed state.
    pub async fn mark_all_read(&self, user_id: Uuid) -> AppResult<usize> {
        let mut changed = 0;
        for mut notification in self.notifications.list_for_user(user_id).await? {
            if notification.read {
                continue;
            }
            notification.read = true;
            self.notifications.update(notification).await?;
            changed += 1;
        }
        Ok(changed)
    }

    pub async fn delete(&self, user_id: Uuid, notification_id: Uuid) -> AppResult<()> {
        self.owned(user_id, notification_id).await?;
        self.notifications.remove(notification_id).await?;
        Ok(())
    }

    /// "Clear all": removes every notification of the recipient.
    pub async fn clear_all(&self, user_id: Uuid) -> AppResult<usize> {
        let removed = self.notifications.remove_for_user(user_id).await?;
        tracing::debug!(user_id = %user_id, removed, "Cleared notifications");
        Ok(removed)
    }
}
