//! Delivery channel traits and their implementations.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};

use crate::{NotificationError, Result};

/// Real-time transport, addressed by room name.
#[async_trait]
pub trait NotificationPort: Send + Sync {
    /// Emits an event to everyone listening on `room`.
    async fn emit(&self, room: &str, event: &str, payload: &serde_json::Value) -> Result<()>;
}

/// Email transport. Template rendering happens on the other side.
#[async_trait]
pub trait EmailSender: Send + Sync {
    /// Sends the named template to `recipient` with `data` as its context.
    async fn send(&self, template: &str, recipient: &str, data: &serde_json::Value) -> Result<()>;
}

/// A message observed on the real-time channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeMessage {
    pub room: String,
    pub event: String,
    pub payload: serde_json::Value,
}

/// An email handed to a sender.
#[derive(Debug, Clone, PartialEq)]
pub struct SentEmail {
    pub template: String,
    pub recipient: String,
    pub data: serde_json::Value,
}

/// Port that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotificationPort;

#[async_trait]
impl NotificationPort for NoopNotificationPort {
    async fn emit(&self, _room: &str, _event: &str, _payload: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Sender that drops every email.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmailSender;

#[async_trait]
impl EmailSender for NoopEmailSender {
    async fn send(&self, _template: &str, _recipient: &str, _data: &serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Publishes real-time messages on an in-process broadcast channel.
///
/// A socket gateway subscribes and forwards each message to the sockets
/// joined to its room.
#[derive(Debug, Clone)]
pub struct BroadcastNotificationPort {
    sender: broadcast::Sender<RealtimeMessage>,
}

impl BroadcastNotificationPort {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Returns a receiver for every message emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RealtimeMessage> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastNotificationPort {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl NotificationPort for BroadcastNotificationPort {
    async fn emit(&self, room: &str, event: &str, payload: &serde_json::Value) -> Result<()> {
        let message = RealtimeMessage {
            room: room.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        };
        // No subscriber means nobody is connected, which is not a failure.
        if self.sender.send(message).is_err() {
            tracing::trace!(room, event, "No real-time subscribers");
        }
        Ok(())
    }
}

/// Email sender that only logs what it would send.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEmailSender;

#[async_trait]
impl EmailSender for LoggingEmailSender {
    async fn send(&self, template: &str, recipient: &str, _data: &serde_json::Value) -> Result<()> {
        tracing::info!(template, recipient, "Email queued");
        Ok(())
    }
}

#[derive(Debug)]
struct RecordingState<T> {
    items: Vec<T>,
    fail: bool,
}

impl<T> Default for RecordingState<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            fail: false,
        }
    }
}

/// Port that records every message, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotificationPort {
    state: Arc<RwLock<RecordingState<RealtimeMessage>>>,
}

impl RecordingNotificationPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent emit fail.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Returns every message recorded so far.
    pub async fn messages(&self) -> Vec<RealtimeMessage> {
        self.state.read().await.items.clone()
    }

    /// Returns the messages emitted with the given event name.
    pub async fn messages_for(&self, event: &str) -> Vec<RealtimeMessage> {
        self.state
            .read()
            .await
            .items
            .iter()
            .filter(|m| m.event == event)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationPort for RecordingNotificationPort {
    async fn emit(&self, room: &str, event: &str, payload: &serde_json::Value) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail {
            return Err(NotificationError::Realtime("socket gateway unreachable".to_string()));
        }
        state.items.push(RealtimeMessage {
            room: room.to_string(),
            event: event.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Email sender that records every email, for tests.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmailSender {
    state: Arc<RwLock<RecordingState<SentEmail>>>,
}

impl RecordingEmailSender {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent send fail.
    pub async fn set_fail(&self, fail: bool) {
        self.state.write().await.fail = fail;
    }

    /// Returns every email recorded so far.
    pub async fn sent(&self) -> Vec<SentEmail> {
        self.state.read().await.items.clone()
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send(&self, template: &str, recipient: &str, data: &serde_json::Value) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail {
            return Err(NotificationError::Email("SMTP relay refused connection".to_string()));
        }
        state.items.push(SentEmail {
            template: template.to_string(),
            recipient: recipient.to_string(),
            data: data.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_port_records_and_fails() {
        let port = RecordingNotificationPort::new();
        port.emit("admins", "order_created", &serde_json::json!({ "n": 1 }))
            .await
            .unwrap();
        assert_eq!(port.messages().await.len(), 1);
        assert_eq!(port.messages_for("order_created").await[0].room, "admins");

        port.set_fail(true).await;
        assert!(port.emit("admins", "order_created", &serde_json::json!({})).await.is_err());
        assert_eq!(port.messages().await.len(), 1);
    }

    #[tokio::test]
    async fn recording_ports_start_empty() {
        let port = RecordingNotificationPort::default();
        let sender = RecordingEmailSender::default();
        assert!(port.messages().await.is_empty());
        assert!(sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn broadcast_port_delivers_to_subscribers() {
        let port = BroadcastNotificationPort::new(8);
        let mut rx = port.subscribe();

        port.emit("user-1", "payment_settled", &serde_json::json!({ "ok": true }))
            .await
            .unwrap();

        let message = rx.recv().await.unwrap();
        assert_eq!(message.room, "user-1");
        assert_eq!(message.event, "payment_settled");
    }

    #[tokio::test]
    async fn broadcast_port_without_subscribers_is_ok() {
        let port = BroadcastNotificationPort::default();
        assert!(port.emit("admins", "x", &serde_json::json!(null)).await.is_ok());
    }

    #[tokio::test]
    async fn recording_email_sender_fails_on_demand() {
        let sender = RecordingEmailSender::new();
        sender.set_fail(true).await;
        assert!(sender.send("t", "a@b.c", &serde_json::json!({})).await.is_err());
        assert!(sender.sent().await.is_empty());
    }
}
