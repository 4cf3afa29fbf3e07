//! Identifiers, roles and error classification shared across the workspace.

mod types;

pub use types::{
    Actor, BriefId, DesignId, ErrorKind, InvoiceId, OrderId, ShippingId, TransactionId,
    UnknownRole, UserId, UserRole,
};
