//! Notification fan-out for the order ledger.
//!
//! Services hand a [`Notification`] to the [`NotificationDispatcher`], which
//! delivers it in the background to the real-time [`NotificationPort`] and,
//! when an email is attached, to the [`EmailSender`]. Delivery is best effort:
//! failures are logged and counted but never reach the caller.

pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod event;

pub use channel::{
    BroadcastNotificationPort, EmailSender, LoggingEmailSender, NoopEmailSender,
    NoopNotificationPort, NotificationPort, RecordingEmailSender, RecordingNotificationPort,
    RealtimeMessage, SentEmail,
};
pub use dispatcher::NotificationDispatcher;
pub use error::{NotificationError, Result};
pub use event::{EmailMessage, Notification, NotificationEvent, Recipient};
