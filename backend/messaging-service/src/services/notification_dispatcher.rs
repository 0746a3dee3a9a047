//! Message notification fan-out.
//!
//! Every delivered message produces one independent notification per
//! recipient. Deliveries run concurrently on a spawned task so the send path
//! never waits on them, and a failed delivery is logged and counted without
//! affecting the other recipients or the sender.

use futures::future::join_all;
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::clock::Clock;
use crate::ids::IdGenerator;
use crate::metrics::{self, DeliveryOutcome};
use crate::models::{ActionData, Message, Notification, NotificationKind};
use crate::repository::NotificationRepository;

pub const NOTIFICATION_TITLE: &str = "New Message";

const PREVIEW_CHARS: usize = 50;

/// First 50 characters of `content`, with `…` appended when cut.
pub fn message_preview(content: &str) -> String {
    let mut chars = content.chars();
    let preview: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{preview}…")
    } else {
        preview
    }
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanOutReport {
    pub delivered: Vec<Uuid>,
    pub failed: Vec<Uuid>,
}

impl FanOutReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Handle to an in-flight fan-out. Dropping it does not cancel delivery.
pub struct FanOutHandle(oneshot::Receiver<FanOutReport>);

impl FanOutHandle {
    pub async fn wait(self) -> FanOutReport {
        match self.0.await {
            Ok(report) => report,
            Err(_) => {
                tracing::error!("Notification fan-out task ended without a report");
                FanOutReport::default()
            }
        }
    }
}

/// Fan-outs are owned by the dispatcher: dropping it aborts deliveries that
/// have not finished, so call [`drain`](Self::drain) before shutdown.
pub struct NotificationDispatcher {
    notifications: Arc<dyn NotificationRepository>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    in_flight: Mutex<JoinSet<()>>,
}

impl NotificationDispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            notifications,
            ids,
            clock,
            in_flight: Mutex::new(JoinSet::new()),
        }
    }

    /// One notification per recipient, each with its own id.
    pub fn build_notifications(
        &self,
        message: &Message,
        sender_name: &str,
        recipients: &[Uuid],
    ) -> Vec<Notification> {
        let body = format!("{sender_name}: {}", message_preview(&message.content));
        let timestamp = self.clock.now();

        recipients
            .iter()
            .map(|recipient| Notification {
                id: self.ids.next_id(),
                user_id: *recipient,
                kind: NotificationKind::Message,
                title: NOTIFICATION_TITLE.to_string(),
                message: body.clone(),
                read: false,
                action_data: ActionData {
                    conversation_id: message.conversation_id,
                },
                timestamp,
            })
            .collect()
    }

    /// Starts delivering to `recipients` and returns immediately.
    pub fn dispatch(&self, message: &Message, sender_name: &str, recipients: Vec<Uuid>) -> FanOutHandle {
        let notifications = self.build_notifications(message, sender_name, &recipients);
        let repo = self.notifications.clone();
        let message_id = message.id;
        let conversation_id = message.conversation_id;
        let (report_tx, report_rx) = oneshot::channel();

        let fan_out = async move {
            let deliveries = notifications.into_iter().map(|notification| {
                let repo = repo.clone();
                async move {
                    let recipient = notification.user_id;
                    let kind = notification.kind;
                    (recipient, kind, repo.insert(notification).await)
                }
            });

            let mut report = FanOutReport::default();
            for (recipient, kind, outcome) in join_all(deliveries).await {
                match outcome {
                    Ok(()) => {
                        metrics::record_notification_delivery(kind, DeliveryOutcome::Delivered);
                        report.delivered.push(recipient);
                    }
                    Err(e) => {
                        metrics::record_notification_delivery(kind, DeliveryOutcome::Failed);
                        tracing::warn!(
                            error = %e,
                            recipient_id = %recipient,
                            message_id = %message_id,
                            "Failed to deliver message notification"
                        );
                        report.failed.push(recipient);
                    }
                }
            }

            tracing::debug!(
                conversation_id = %conversation_id,
                message_id = %message_id,
                delivered = report.delivered.len(),
                failed = report.failed.len(),
                "Notification fan-out finished"
            );
            // The caller may have dropped its handle.
            let _ = report_tx.send(report);
        };

        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        // Reap finished fan-outs so the set only holds pending work.
        while let Some(Some(finished)) = in_flight.join_next().now_or_never() {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Notification fan-out task failed");
            }
        }
        in_flight.spawn(fan_out);
        FanOutHandle(report_rx)
    }

    /// Waits for every fan-out started so far. Returns how many finished.
    pub async fn drain(&self) -> usize {
        let mut pending = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *in_flight)
        };

        let mut finished = 0;
        while let Some(result) = pending.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Notification fan-out task failed");
            }
            finished += 1;
        }
        if finished > 0 {
            tracing::info!(finished, "Drained pending notification fan-outs");
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::error::{AppError, AppResult};
    use crate::ids::SequentialIdGenerator;
    use crate::repository::InMemoryNotificationRepository;
    use async_trait::async_trait;
    use chrono::Utc;

    /// Accepts everything except notifications for one recipient.
    struct RejectingRepository {
        inner: InMemoryNotificationRepository,
        reject: Uuid,
    }

    #[async_trait]
    impl NotificationRepository for RejectingRepository {
        async fn insert(&self, notification: Notification) -> AppResult<()> {
            if notification.user_id == self.reject {
                return Err(AppError::Storage("inbox unavailable".into()));
            }
            self.inner.insert(notification).await
        }

        async fn get(&self, id: Uuid) -> AppResult<Option<Notification>> {
            self.inner.get(id).await
        }

        async fn list_for_user(&self, user_id: Uuid) -> AppResult<Vec<Notification>> {
            self.inner.list_for_user(user_id).await
        }

        async fn update(&self, notification: Notification) -> AppResult<()> {
            self.inner.update(notification).await
        }

        async fn remove(&self, id: Uuid) -> AppResult<bool> {
            self.inner.remove(id).await
        }

        async fn remove_for_user(&self, user_id: Uuid) -> AppResult<usize> {
            self.inner.remove_for_user(user_id).await
        }
    }

    fn dispatcher(repo: Arc<dyn NotificationRepository>) -> NotificationDispatcher {
        NotificationDispatcher::new(
            repo,
            Arc::new(SequentialIdGenerator::new()),
            Arc::new(SystemClock),
        )
    }

    #[test]
    fn test_message_preview() {
        assert_eq!(message_preview("short"), "short");

        let exact = "a".repeat(50);
        assert_eq!(message_preview(&exact), exact);

        let long = "b".repeat(51);
        assert_eq!(message_preview(&long), format!("{}…", "b".repeat(50)));

        // Counts characters, not bytes.
        let wide = "é".repeat(60);
        assert_eq!(message_preview(&wide).chars().count(), 51);
    }

    #[test]
    fn test_build_notifications_are_independent() {
        let d = dispatcher(Arc::new(InMemoryNotificationRepository::new()));
        let message = Message::text(Uuid::new_v4(), Uuid::new_v4(), "kickoff at 10am", Utc::now());
        let recipients = [Uuid::new_v4(), Uuid::new_v4()];

        let built = d.build_notifications(&message, "Avery", &recipients);

        assert_eq!(built.len(), 2);
        assert_ne!(built[0].id, built[1].id);
        for (n, r) in built.iter().zip(recipients) {
            assert_eq!(n.user_id, r);
            assert_eq!(n.title, "New Message");
            assert_eq!(n.message, "Avery: kickoff at 10am");
            assert_eq!(n.action_data.conversation_id, message.conversation_id);
            assert!(!n.read);
        }
    }

    #[tokio::test]
    async fn test_failed_recipient_does_not_block_others() {
        let bad = Uuid::new_v4();
        let good = Uuid::new_v4();
        let repo = Arc::new(RejectingRepository {
            inner: InMemoryNotificationRepository::new(),
            reject: bad,
        });
        let d = dispatcher(repo.clone());
        let message = Message::text(Uuid::new_v4(), Uuid::new_v4(), "hello", Utc::now());
        let failed_before =
            metrics::notification_deliveries(NotificationKind::Message, DeliveryOutcome::Failed);

        let report = d.dispatch(&message, "Sam", vec![bad, good]).wait().await;

        assert_eq!(report.delivered, vec![good]);
        assert_eq!(report.failed, vec![bad]);
        assert!(!report.is_complete());
        assert_eq!(repo.list_for_user(good).await.unwrap().len(), 1);
        assert!(
            metrics::notification_deliveries(NotificationKind::Message, DeliveryOutcome::Failed)
                > failed_before
        );
    }

    #[tokio::test]
    async fn test_drain_waits_for_dropped_handles() {
        let repo = Arc::new(InMemoryNotificationRepository::new());
        let d = dispatcher(repo.clone());
        let recipients: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

        for i in 0..5 {
            let message = Message::text(Uuid::new_v4(), Uuid::new_v4(), format!("m{i}"), Utc::now());
            drop(d.dispatch(&message, "Sam", recipients.clone()));
        }
        d.drain().await;

        for recipient in &recipients {
            assert_eq!(repo.list_for_user(*recipient).await.unwrap().len(), 5);
        }
        assert_eq!(d.drain().await, 0);
    }
}
