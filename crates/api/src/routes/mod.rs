//! HTTP handlers, one module per resource.

pub mod designs;
pub mod fulfilment;
pub mod health;
pub mod invoices;
pub mod metrics;
pub mod orders;
pub mod payments;
