//! Prometheus metrics for messaging-service, registered on the default
//! registry.

use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};

use crate::error::{AppError, AppResult};
use crate::models::{MessageKind, NotificationKind, Role};

static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_service_messages_sent_total",
            "Messages recorded by messaging-service",
        ),
        &["kind", "sender_role"],
    )
    .expect("failed to create messaging_service_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_service_messages_sent_total");
    counter
});

static NOTIFICATION_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "messaging_service_notification_deliveries_total",
            "Per-recipient notification deliveries by outcome",
        ),
        &["kind", "outcome"],
    )
    .expect("failed to create messaging_service_notification_deliveries_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register messaging_service_notification_deliveries_total");
    counter
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed,
}

impl DeliveryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Delivered => "delivered",
            DeliveryOutcome::Failed => "failed",
        }
    }
}

pub fn record_message_sent(kind: MessageKind, sender_role: Role) {
    MESSAGES_SENT_TOTAL
        .with_label_values(&[kind.as_str(), sender_role.as_str()])
        .inc();
}

pub fn record_notification_delivery(kind: NotificationKind, outcome: DeliveryOutcome) {
    NOTIFICATION_DELIVERIES_TOTAL
        .with_label_values(&[kind.as_str(), outcome.as_str()])
        .inc();
}

/// Current value of the delivery counter. Process-wide, so concurrent
/// callers only ever observe it growing.
pub fn notification_deliveries(kind: NotificationKind, outcome: DeliveryOutcome) -> u64 {
    NOTIFICATION_DELIVERIES_TOTAL
        .with_label_values(&[kind.as_str(), outcome.as_str()])
        .get()
}

/// Text exposition of every metric on the default registry.
pub fn render() -> AppResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| AppError::Internal(format!("encode metrics: {e}")))?;
    String::from_utf8(buffer).map_err(|e| AppError::Internal(format!("encode metrics: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_recorded_series() {
        record_message_sent(MessageKind::File, Role::Client);
        record_notification_delivery(NotificationKind::Message, DeliveryOutcome::Failed);

        let text = render().unwrap();
        assert!(text.contains("messaging_service_messages_sent_total"));
        assert!(text.contains(r#"kind="file",sender_role="client""#));
        assert!(text.contains(r#"kind="message",outcome="failed""#));
    }
}
