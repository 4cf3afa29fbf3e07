//! Notification error types.

use thiserror::Error;

/// Errors raised by notification channels.
///
/// These never leave the dispatcher; they exist so channels can report
/// what went wrong for logging.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// The real-time transport rejected or dropped the message.
    #[error("Real-time delivery failed: {0}")]
    Realtime(String),

    /// The email sender failed.
    #[error("Email delivery failed: {0}")]
    Email(String),
}

/// Result type for notification operations.
pub type Result<T> = std::result::Result<T, NotificationError>;
