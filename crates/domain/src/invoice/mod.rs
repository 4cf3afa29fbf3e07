//! Invoice document and invoice operations.

mod aggregate;
mod service;

pub use aggregate::{Invoice, InvoiceItem, InvoiceStatus, InvoiceType};
pub use service::{InvoiceService, NewInvoice};
