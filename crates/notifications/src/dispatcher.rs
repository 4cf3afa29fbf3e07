//! Background delivery of notifications.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use tokio::sync::Notify;

use crate::channel::{EmailSender, NoopEmailSender, NoopNotificationPort, NotificationPort};
use crate::event::{Notification, Recipient};

#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

/// Delivers notifications to the real-time and email channels.
///
/// `dispatch` returns immediately; each notification is delivered on its own
/// task. A failed channel is logged and counted, and never affects the
/// operation that produced the notification.
#[derive(Clone)]
pub struct NotificationDispatcher {
    port: Arc<dyn NotificationPort>,
    email: Arc<dyn EmailSender>,
    admin_room: Arc<str>,
    in_flight: Arc<InFlight>,
}

impl NotificationDispatcher {
    pub fn new(
        port: Arc<dyn NotificationPort>,
        email: Arc<dyn EmailSender>,
        admin_room: impl Into<String>,
    ) -> Self {
        Self {
            port,
            email,
            admin_room: Arc::from(admin_room.into()),
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Creates a dispatcher that discards everything.
    pub fn noop() -> Self {
        Self::new(
            Arc::new(NoopNotificationPort),
            Arc::new(NoopEmailSender),
            "admins",
        )
    }

    /// Returns the room name admins listen on.
    pub fn admin_room(&self) -> &str {
        &self.admin_room
    }

    /// Queues a notification for delivery and returns immediately.
    pub fn dispatch(&self, notification: Notification) {
        self.in_flight.count.fetch_add(1, Ordering::SeqCst);

        let port = Arc::clone(&self.port);
        let email = Arc::clone(&self.email);
        let admin_room = Arc::clone(&self.admin_room);
        let in_flight = Arc::clone(&self.in_flight);

        tokio::spawn(async move {
            deliver(port.as_ref(), email.as_ref(), &admin_room, notification).await;
            if in_flight.count.fetch_sub(1, Ordering::SeqCst) == 1 {
                in_flight.idle.notify_waiters();
            }
        });
    }

    /// Waits until every dispatched notification has been delivered or dropped.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("admin_room", &self.admin_room)
            .field("in_flight", &self.in_flight.count.load(Ordering::SeqCst))
            .finish()
    }
}

async fn deliver(
    port: &dyn NotificationPort,
    email: &dyn EmailSender,
    admin_room: &str,
    notification: Notification,
) {
    let event = notification.event.as_str();

    let rooms: Vec<String> = notification
        .recipients
        .iter()
        .map(|recipient| match recipient {
            Recipient::User(user_id) => user_id.to_string(),
            Recipient::Admins => admin_room.to_string(),
        })
        .collect();

    let results = join_all(
        rooms
            .iter()
            .map(|room| port.emit(room, event, &notification.payload)),
    )
    .await;

    for (room, result) in rooms.iter().zip(results) {
        match result {
            Ok(()) => metrics::counter!("notifications_sent_total", "channel" => "realtime")
                .increment(1),
            Err(e) => {
                tracing::warn!(event, room = %room, error = %e, "Real-time notification failed");
                metrics::counter!("notifications_failed_total", "channel" => "realtime")
                    .increment(1);
            }
        }
    }

    if let Some(message) = notification.email {
        match email
            .send(&message.template, &message.to, &message.data)
            .await
        {
            Ok(()) => {
                metrics::counter!("notifications_sent_total", "channel" => "email").increment(1)
            }
            Err(e) => {
                tracing::warn!(
                    event,
                    template = %message.template,
                    error = %e,
                    "Email notification failed"
                );
                metrics::counter!("notifications_failed_total", "channel" => "email")
                    .increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{NotificationEvent, RecordingEmailSender, RecordingNotificationPort};
    use common::UserId;

    fn recording() -> (
        NotificationDispatcher,
        RecordingNotificationPort,
        RecordingEmailSender,
    ) {
        let port = RecordingNotificationPort::new();
        let email = RecordingEmailSender::new();
        let dispatcher = NotificationDispatcher::new(
            Arc::new(port.clone()),
            Arc::new(email.clone()),
            "back-office",
        );
        (dispatcher, port, email)
    }

    #[tokio::test]
    async fn delivers_to_user_admin_room_and_email() {
        let (dispatcher, port, email) = recording();
        let user = UserId::new();

        dispatcher.dispatch(
            Notification::new(
                NotificationEvent::InvoiceCreated,
                serde_json::json!({ "invoice_number": "INV-1" }),
            )
            .to_user(user)
            .to_admins()
            .with_email("invoice_created", "owner@example.com"),
        );
        dispatcher.wait_idle().await;

        let rooms: Vec<String> = port.messages().await.into_iter().map(|m| m.room).collect();
        assert_eq!(rooms, vec![user.to_string(), "back-office".to_string()]);

        let sent = email.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].template, "invoice_created");
        assert_eq!(sent[0].data["invoice_number"], "INV-1");
    }

    #[tokio::test]
    async fn channel_failure_is_swallowed() {
        let (dispatcher, port, email) = recording();
        port.set_fail(true).await;

        dispatcher.dispatch(
            Notification::new(NotificationEvent::PaymentSettled, serde_json::json!({}))
                .to_admins()
                .with_email("payment_receipt", "owner@example.com"),
        );
        dispatcher.wait_idle().await;

        assert!(port.messages().await.is_empty());
        assert_eq!(email.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn wait_idle_returns_immediately_when_nothing_queued() {
        let dispatcher = NotificationDispatcher::noop();
        dispatcher.wait_idle().await;
        assert_eq!(dispatcher.admin_room(), "admins");
    }
}
