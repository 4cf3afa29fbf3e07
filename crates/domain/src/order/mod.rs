//! Order document, status machine and lifecycle service.

mod aggregate;
mod service;
mod state;

pub use aggregate::{Order, OrderItem};
pub use service::{NewOrder, OrderFilter, OrderService};
pub use state::{OrderStatus, PaymentStatus, RequiredPaymentType};

pub(crate) use service::ensure_access;
