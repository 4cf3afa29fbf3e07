use common::UserId;
use serde::{Deserialize, Serialize};

/// Events the ledger publishes to users and back-office staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    OrderCreated,
    OrderStatusChanged,
    OrderDelivered,
    InvoiceCreated,
    InvoiceDeleted,
    PaymentSettled,
    PaymentFailed,
    ReceiptUploaded,
    DesignUploaded,
    DesignReviewed,
    ShippingCreated,
    BriefPosted,
    FeedbackSubmitted,
}

impl NotificationEvent {
    /// Returns the wire name used on the real-time channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEvent::OrderCreated => "order_created",
            NotificationEvent::OrderStatusChanged => "order_status_changed",
            NotificationEvent::OrderDelivered => "order_delivered",
            NotificationEvent::InvoiceCreated => "invoice_created",
            NotificationEvent::InvoiceDeleted => "invoice_deleted",
            NotificationEvent::PaymentSettled => "payment_settled",
            NotificationEvent::PaymentFailed => "payment_failed",
            NotificationEvent::ReceiptUploaded => "receipt_uploaded",
            NotificationEvent::DesignUploaded => "design_uploaded",
            NotificationEvent::DesignReviewed => "design_reviewed",
            NotificationEvent::ShippingCreated => "shipping_created",
            NotificationEvent::BriefPosted => "brief_posted",
            NotificationEvent::FeedbackSubmitted => "feedback_submitted",
        }
    }
}

impl std::fmt::Display for NotificationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Who receives a real-time notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// A single user's private room.
    User(UserId),
    /// The shared room every admin listens on.
    Admins,
}

/// An email to send alongside the real-time message.
#[derive(Debug, Clone, PartialEq)]
pub struct EmailMessage {
    pub template: String,
    pub to: String,
    pub data: serde_json::Value,
}

/// A structured event ready for delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub event: NotificationEvent,
    pub recipients: Vec<Recipient>,
    pub payload: serde_json::Value,
    pub email: Option<EmailMessage>,
}

impl Notification {
    pub fn new(event: NotificationEvent, payload: serde_json::Value) -> Self {
        Self {
            event,
            recipients: Vec::new(),
            payload,
            email: None,
        }
    }

    /// Adds a single user as a recipient.
    pub fn to_user(mut self, user_id: UserId) -> Self {
        self.recipients.push(Recipient::User(user_id));
        self
    }

    /// Adds the admin room as a recipient.
    pub fn to_admins(mut self) -> Self {
        self.recipients.push(Recipient::Admins);
        self
    }

    /// Attaches an email rendered from `template` with the notification payload.
    pub fn with_email(mut self, template: impl Into<String>, to: impl Into<String>) -> Self {
        self.email = Some(EmailMessage {
            template: template.into(),
            to: to.into(),
            data: self.payload.clone(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_recipients_and_email() {
        let user = UserId::new();
        let notification = Notification::new(
            NotificationEvent::PaymentSettled,
            serde_json::json!({ "amount": "300.00" }),
        )
        .to_user(user)
        .to_admins()
        .with_email("payment_receipt", "jane@example.com");

        assert_eq!(
            notification.recipients,
            vec![Recipient::User(user), Recipient::Admins]
        );
        let email = notification.email.unwrap();
        assert_eq!(email.to, "jane@example.com");
        assert_eq!(email.data["amount"], "300.00");
    }

    #[test]
    fn event_wire_names() {
        assert_eq!(NotificationEvent::OrderStatusChanged.to_string(), "order_status_changed");
        let json = serde_json::to_string(&NotificationEvent::ReceiptUploaded).unwrap();
        assert_eq!(json, "\"receipt_uploaded\"");
    }
}
